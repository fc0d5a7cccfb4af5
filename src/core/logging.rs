//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g.
/// `RUST_LOG=tilestream::streaming=debug` to watch eviction decisions.
///
/// # Example
/// ```
/// tilestream::core::logging::init();
/// log::info!("Streamer started");
/// ```
pub fn init() {
    // A second call (tests, embedding applications) keeps the first logger.
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    )
    .format_timestamp_millis()
    .try_init();
}
