//! Logging setup for the binary and for tests that want output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global subscriber: `RUST_LOG` filter (default `info`) and a
/// plain or JSON formatter. `log` records from the storage layer are
/// forwarded through `LogTracer`.
///
/// Returns an error if a subscriber or logger is already installed.
pub fn init_logging(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    if json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_target(true)),
        )?;
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(false)))?;
    }
    tracing_log::LogTracer::init()?;
    Ok(())
}
