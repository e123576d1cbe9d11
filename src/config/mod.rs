mod args;
#[allow(clippy::module_inception)]
mod config;

pub use args::{Cli, MAX_TOP_ENTRIES};
pub use config::{EngineConfig, STATSD_ENV};
