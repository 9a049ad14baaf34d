//! Tracing initialisation.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Installs the global tracing subscriber.
///
/// An empty `filter` falls back to `info`.
///
/// # Errors
///
/// Returns [`Error::Telemetry`] if the filter does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<()> {
    let directive = if filter.trim().is_empty() { "info" } else { filter };
    let env_filter =
        EnvFilter::try_new(directive).map_err(|e| Error::Telemetry(e.to_string()))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Telemetry(e.to_string()))
}
