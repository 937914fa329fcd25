//! Tracing subscriber setup.
//!
//! Log lines go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` wins over the `[logging].filter` value from the config file.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    // A second init (e.g. from tests sharing a process) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
