/// Tracing subscriber setup shared by the binaries
use tracing_subscriber::EnvFilter;

/// Map a configured `log_level` to a filter directive
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        "none" => "off",
        _ => "info",
    }
}

/// Install a stderr fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `log_level` from configuration applies.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    // A second init (e.g. from tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
