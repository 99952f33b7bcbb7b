//! Logging initialization
//!
//! Sets up a `tracing-subscriber` registry with an `EnvFilter` and one of
//! three output formats. The library only emits events; installing the
//! subscriber is left to the binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output formats understood by [`init_logging`]
pub const LOG_FORMATS: &[&str] = &["plain", "json", "pretty"];

/// Build the filter for `level`, falling back to `info` on a bad directive
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging with the given level directive and format
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging(level: &str, format: &str) {
    let env_filter = env_filter(level);

    let result = match format {
        "json" => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        "pretty" => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        _ => {
            let fmt_layer = fmt::layer().with_target(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}
