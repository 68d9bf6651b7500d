mod demo;
mod normalize;
mod replay;

pub use demo::{run_demo_stream, DemoFeed};
pub use normalize::VolumeNormalizer;
pub use replay::{load_ticks, parse_ticks, run_replay_stream};
