// HwScope agent - CPU, GPU and GPU process status feed

pub mod aggregator;
pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sampler;
pub mod sinks;

pub use aggregator::StatusAggregator;
pub use error::{AgentError, Result};
pub use sampler::{LoopState, RunningLoop, SamplingLoop, StopHandle};

/// Initialize logging. `RUST_LOG` overrides the given level.
pub fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
