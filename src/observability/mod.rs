//! Logging setup.
//!
//! All log output goes to stderr: stdout belongs to the line protocol.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter, with `RUST_LOG` as
/// the conventional fallback.
pub const LOG_ENV: &str = "ENGRAM_LOG";

/// Initializes the global tracing subscriber.
///
/// `json` selects machine-readable output for supervised deployments.
/// Calling twice is harmless; the second call is ignored.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
