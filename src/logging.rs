use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter, e.g. `assetgraph=debug`.
pub const LOG_ENV: &str = "ASSETGRAPH_LOG";

/// Installs a global subscriber printing log lines to stderr, with a progress
/// bar for every running generation. The filter is read from [`LOG_ENV`] and
/// defaults to `info`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> Result<(), TryInitError> {
    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init()
}
