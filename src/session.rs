//! Trading session schedule
//!
//! Converts UTC timestamps to exchange-local time (DST-aware via chrono-tz)
//! and answers the three questions the strategy cycle needs: which session a
//! timestamp belongs to, whether enough of the session has elapsed to build a
//! profile, and whether it is time to flatten.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSchedule {
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
    /// Market open, local time
    pub open: NaiveTime,
    /// Profiles are not built before this local time
    pub profile_ready: NaiveTime,
    /// Open positions are flattened at this local time; `None` never flattens
    pub square_off: Option<NaiveTime>,
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(tz.name())
}

impl Default for SessionSchedule {
    /// NSE cash session: open 09:15 IST, profile ready at 10:00, square off at 15:20
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            profile_ready: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            square_off: NaiveTime::from_hms_opt(15, 20, 0),
        }
    }
}

impl SessionSchedule {
    /// Parse a schedule from a time zone name (e.g. "Asia/Kolkata") and
    /// HH:MM local times.
    pub fn parse(timezone: &str, open: &str, profile_ready: &str, square_off: &str) -> Result<Self, ConfigError> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| ConfigError::TimeZone(timezone.to_string()))?;
        let open = parse_hhmm("open", open)?;
        let profile_ready = parse_hhmm("profile_ready", profile_ready)?;
        let square_off = parse_hhmm("square_off", square_off)?;
        Ok(Self {
            timezone,
            open,
            profile_ready,
            square_off: Some(square_off),
        })
    }

    /// A schedule that never gates anything: UTC, open and ready at midnight,
    /// positions are only flattened by a session rollover
    pub fn always_open() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            open: NaiveTime::MIN,
            profile_ready: NaiveTime::MIN,
            square_off: None,
        }
    }

    /// Local calendar date of the session `now` falls in
    pub fn session_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn is_profile_ready(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.profile_ready
    }

    pub fn is_square_off(&self, now: DateTime<Utc>) -> bool {
        self.square_off.is_some_and(|at| self.local_time(now) >= at)
    }

    /// Session open on the session date of `now`
    pub fn open_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.local_to_utc(self.session_date(now), self.open)
    }

    /// UTC instant of a local wall-clock time on `date`. `None` when the
    /// local time does not exist or is ambiguous (DST transitions).
    pub fn local_to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        let local = now.with_timezone(&self.timezone);
        NaiveTime::from_hms_opt(local.hour(), local.minute(), local.second()).unwrap_or(NaiveTime::MIN)
    }
}

fn parse_hhmm(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::OutOfRange {
        field,
        expected: "a HH:MM time",
        value: f64::NAN,
    })
}
