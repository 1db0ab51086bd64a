//! Logging initialization

use std::io::IsTerminal;

/// Initialize logging for a CLI run.
///
/// Everything goes to stderr so stdout stays reserved for the deploy
/// summary. `RUST_LOG` wins when set; otherwise the verbosity flag selects
/// between info and debug.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}
