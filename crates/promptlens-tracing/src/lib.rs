//! Logging setup shared by the promptlens binaries.

pub mod config;
pub mod spans;

pub use config::LoggingConfig;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subsystem: env-filter + fmt layer to stderr.
///
/// The filter comes from `config.log_level` (e.g. "info",
/// "promptlens=debug,info"); an unparseable filter falls back to "info"
/// rather than failing startup.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}
