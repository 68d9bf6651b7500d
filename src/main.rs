use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};

use vp_breakout::runner::{run_strategy, RunSummary, RunnerOptions};
use vp_breakout::streams::{run_demo_stream, run_replay_stream, DemoFeed};
use vp_breakout::{ProfilePeriod, SessionSchedule, StrategyConfig, StrategyCycle};

#[derive(Parser, Debug)]
#[command(author, version, about = "Volume profile breakout strategy")]
struct Cli {
    #[command(flatten)]
    strategy: StrategyArgs,

    #[command(flatten)]
    session: SessionArgs,

    /// Seconds of data time between strategy cycles
    #[arg(long, env = "MONITORING_INTERVAL", default_value = "10")]
    cycle_interval: i64,

    /// Minutes of data time between status lines
    #[arg(long, default_value = "30")]
    status_interval: i64,

    /// Append closed trades to this CSV file
    #[arg(long, global = true)]
    trade_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay ticks from a CSV (or .csv.zst) file
    Replay {
        /// CSV with columns instrument,price,volume,timestamp
        path: PathBuf,

        /// Volume column is cumulative since session open
        #[arg(long)]
        cumulative_volume: bool,
    },
    /// Run against a synthetic random-walk feed
    Demo {
        /// Instruments to simulate (comma-separated)
        #[arg(short, long, default_value = "RELIANCE,INFY,TCS")]
        instruments: String,

        /// Total ticks to generate
        #[arg(short, long, default_value = "60000")]
        ticks: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Session date to simulate (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args, Debug)]
struct StrategyArgs {
    #[arg(long, env = "PORTFOLIO_VALUE", default_value = "100000")]
    portfolio_value: f64,

    /// Percent of portfolio risked per trade
    #[arg(long, env = "RISK_PER_TRADE", default_value = "1.0")]
    risk_per_trade: f64,

    #[arg(long, env = "MAX_POSITIONS", default_value = "5")]
    max_positions: usize,

    #[arg(long, env = "PRICE_BUCKETS", default_value = "50")]
    price_buckets: usize,

    #[arg(long, env = "VALUE_AREA_PCT", default_value = "70")]
    value_area_pct: f64,

    #[arg(long, env = "HIGH_VOLUME_THRESHOLD", default_value = "1.5")]
    high_volume_threshold: f64,

    #[arg(long, env = "LOW_VOLUME_THRESHOLD", default_value = "0.5")]
    low_volume_threshold: f64,

    #[arg(long, env = "MIN_PROFILE_TICKS", default_value = "10")]
    min_ticks: usize,

    /// Build rolling profiles over this many minutes instead of the whole session
    #[arg(long, env = "PROFILE_ROLLING_MINUTES")]
    rolling_minutes: Option<u32>,

    #[arg(long, env = "MIN_BREAKOUT_DISTANCE", default_value = "0.3")]
    min_breakout_distance: f64,

    #[arg(long, env = "MIN_VOLUME_RATIO", default_value = "1.5")]
    min_volume_ratio: f64,

    #[arg(long, env = "VOLUME_MA_PERIOD", default_value = "20")]
    volume_ma_period: usize,

    #[arg(long, env = "MIN_POC_DISTANCE", default_value = "1.0")]
    min_poc_distance: f64,

    #[arg(long, env = "MIN_CONFIDENCE", default_value = "0.65")]
    min_confidence: f64,

    #[arg(long, env = "REQUIRE_VOLUME_CONFIRMATION", default_value = "true", action = clap::ArgAction::Set)]
    require_volume_confirmation: bool,

    #[arg(long, env = "AVOID_LOW_VOLUME_NODES", default_value = "true", action = clap::ArgAction::Set)]
    avoid_low_volume_nodes: bool,

    #[arg(long, env = "NODE_PROXIMITY_PCT", default_value = "0.5")]
    node_proximity_pct: f64,

    #[arg(long, env = "USE_POC_AS_STOP", default_value = "true", action = clap::ArgAction::Set)]
    use_poc_as_stop: bool,

    #[arg(long, env = "STOP_LOSS_PCT", default_value = "1.5")]
    stop_loss_pct: f64,

    #[arg(long, env = "TARGET_MULTIPLIER", default_value = "2.0")]
    target_multiplier: f64,

    #[arg(long, env = "TRAILING_STOP_PCT", default_value = "0.5")]
    trailing_stop_pct: f64,

    #[arg(long, env = "ENABLE_TRAILING_STOPS", default_value = "true", action = clap::ArgAction::Set)]
    enable_trailing_stops: bool,

    #[arg(long, env = "COMMISSION_PER_TRADE", default_value = "0")]
    commission: f64,

    #[arg(long, env = "MAX_DAILY_LOSS_PCT", default_value = "2.0")]
    max_daily_loss_pct: f64,
}

impl StrategyArgs {
    fn to_config(&self) -> StrategyConfig {
        StrategyConfig {
            price_buckets: self.price_buckets,
            value_area_pct: self.value_area_pct,
            high_volume_threshold: self.high_volume_threshold,
            low_volume_threshold: self.low_volume_threshold,
            min_ticks: self.min_ticks,
            profile_period: match self.rolling_minutes {
                Some(minutes) => ProfilePeriod::Rolling { minutes },
                None => ProfilePeriod::Session,
            },
            min_breakout_distance_pct: self.min_breakout_distance,
            min_volume_ratio: self.min_volume_ratio,
            volume_ma_period: self.volume_ma_period,
            min_poc_distance_pct: self.min_poc_distance,
            min_confidence: self.min_confidence,
            require_volume_confirmation: self.require_volume_confirmation,
            avoid_low_volume_nodes: self.avoid_low_volume_nodes,
            node_proximity_pct: self.node_proximity_pct,
            use_poc_as_stop: self.use_poc_as_stop,
            stop_loss_pct: self.stop_loss_pct,
            target_multiplier: self.target_multiplier,
            trailing_stop_pct: self.trailing_stop_pct,
            enable_trailing_stops: self.enable_trailing_stops,
            max_positions: self.max_positions,
            portfolio_value: self.portfolio_value,
            risk_per_trade_pct: self.risk_per_trade,
            commission_per_trade: self.commission,
            max_daily_loss_pct: self.max_daily_loss_pct,
        }
    }
}

#[derive(Args, Debug)]
struct SessionArgs {
    #[arg(long, env = "MARKET_TIMEZONE", default_value = "Asia/Kolkata")]
    timezone: String,

    #[arg(long, env = "MARKET_OPEN", default_value = "09:15")]
    market_open: String,

    /// Local time after which profiles are built
    #[arg(long, env = "VP_READY_TIME", default_value = "10:00")]
    profile_ready: String,

    #[arg(long, env = "SQUARE_OFF_TIME", default_value = "15:20")]
    square_off: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("vp_breakout=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = cli.strategy.to_config();
    config.validate().context("Invalid strategy configuration")?;
    let schedule = SessionSchedule::parse(
        &cli.session.timezone,
        &cli.session.market_open,
        &cli.session.profile_ready,
        &cli.session.square_off,
    )
    .context("Invalid session schedule")?;

    if let Command::Config = cli.command {
        let effective = serde_json::json!({ "strategy": config, "session": schedule });
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    info!("Starting volume profile breakout strategy");
    info!(
        "Portfolio: {:.0} | Risk/trade: {:.2}% | Max positions: {} | Profile: {} x{} buckets",
        config.portfolio_value, config.risk_per_trade_pct, config.max_positions, config.profile_period, config.price_buckets
    );

    let options = RunnerOptions {
        cycle_interval: chrono::Duration::seconds(cli.cycle_interval.max(1)),
        status_interval: chrono::Duration::minutes(cli.status_interval.max(1)),
        trade_log: cli.trade_log.clone(),
    };

    let (tx, rx) = mpsc::channel(10_000);
    let feed = match cli.command {
        Command::Replay { path, cumulative_volume } => tokio::spawn(async move {
            run_replay_stream(&path, cumulative_volume, tx).await
        }),
        Command::Demo {
            instruments,
            ticks,
            seed,
            date,
        } => {
            let instruments: Vec<String> = instruments.split(',').map(|s| s.trim().to_string()).collect();
            let date = date.unwrap_or_else(|| schedule.session_date(Utc::now()));
            let start = schedule
                .local_to_utc(date, schedule.open)
                .context("Session open does not exist on that date")?;
            info!("Demo: {} ticks across {:?} from {}", ticks, instruments, start);
            let feed = DemoFeed::new(&instruments, ticks, seed, start)?;
            tokio::spawn(async move { run_demo_stream(feed, tx).await })
        }
        Command::Config => return Ok(()),
    };

    let strategy = StrategyCycle::new(config, schedule)?;
    let summary = run_strategy(strategy, rx, options).await?;

    match feed.await {
        Ok(Ok(sent)) => info!("Feed finished after {} ticks", sent),
        Ok(Err(e)) => error!("Feed error: {:#}", e),
        Err(e) => error!("Feed task failed: {}", e),
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let m = &summary.metrics;
    println!();
    println!("=== RUN SUMMARY ===");
    println!(
        "Ticks: {} ingested, {} rejected | Cycles: {} | Decisions: {}",
        summary.ticks_ingested, summary.ticks_rejected, summary.cycles, summary.decisions
    );
    println!(
        "Trades: {} ({} long / {} short) | Win rate: {:.1}% (long {:.1}%, short {:.1}%)",
        m.total_trades, m.long_trades, m.short_trades, m.win_rate, m.long_win_rate, m.short_win_rate
    );
    println!(
        "Net P&L: {:+.2} | Profit factor: {:.2} | Avg win: {:.2} | Avg loss: {:.2} | Max DD: {:.2}",
        m.total_pnl, m.profit_factor, m.avg_win, m.avg_loss, m.max_drawdown
    );
    println!(
        "Avg hold: {:.1} min | Avg POC distance at entry: {:.2}%",
        m.avg_holding_minutes, m.avg_poc_distance_pct
    );

    for trade in &summary.trades {
        println!(
            "  {} {} {} x{} {:.2} -> {:.2} | {} | {:+.2}",
            trade.entry_time.format("%Y-%m-%d %H:%M:%S"),
            trade.instrument,
            trade.direction,
            trade.quantity,
            trade.entry_price,
            trade.exit_price,
            trade.exit_reason,
            trade.net_pnl
        );
    }
}
