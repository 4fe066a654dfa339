use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber from a filter spec (e.g. `Config::log_filter`
/// or `RUST_LOG`). Safe to call more than once; later calls are no-ops.
pub fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
