//! Log output setup
//!
//! Logs go to stderr so the container's stdout stays untouched.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `--verbose` forces DEBUG; otherwise `RUST_LOG` applies, falling back to INFO.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
