//! Tracing setup.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber and bridges `log` records into
/// it. Safe to call more than once; later calls are no-ops.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    let _ = tracing_log::LogTracer::init();
}
