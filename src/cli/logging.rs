//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Pick the filter directive: `RUST_LOG` wins, then `--debug`, then the configured level
fn filter(level: &str, debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if debug { "debug" } else { level };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber, writing to stderr
pub fn init_logging(level: &str, debug: bool) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level, debug))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
