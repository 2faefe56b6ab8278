//! Structured logging initialization.
//!
//! Thin front-end over the tracing subscriber. The RUST_LOG environment
//! variable takes precedence over the level passed by the application.

use tracing_subscriber::EnvFilter;

/// Map the configured level name onto a tracing directive.
///
/// Accepts the usual aliases; anything unknown falls back to `info`.
pub fn parse_level(level: &str) -> &'static str {
    match level {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Initialize the logging subsystem.
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init(level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(parse_level(level))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
