// Path: crates/telemetry/src/init.rs
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initializes the global `tracing` subscriber.
///
/// Logs go to stderr as structured JSON by default; setting
/// `ORC_LOG_FORMAT=text` selects a human-readable format instead. The filter
/// is taken from `RUST_LOG`, falling back to `info` for every target.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    tracing_log::LogTracer::init()?;

    let text = std::env::var("ORC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("text"));
    if text {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        tracing::subscriber::set_global_default(registry.with(fmt_layer))?;
    } else {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339());
        tracing::subscriber::set_global_default(registry.with(fmt_layer))?;
    }
    Ok(())
}
