//! Logging initialization for the broker.
//!
//! All broker crates log through `tracing` macros with structured fields
//! (`uuid`, `username`, `method`, `error`). This module installs the single
//! subscriber at process start: an `EnvFilter` (where `RUST_LOG` wins over the
//! configured level) and a fmt layer on stderr. Set `HIVEBUZZ_LOG_FORMAT=json`
//! for JSONL output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system.
///
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Broker started");
/// ```
pub fn init_logging(level: &str) {
    let default_directive = parse_level(level).to_string().to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let json = std::env::var("HIVEBUZZ_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
