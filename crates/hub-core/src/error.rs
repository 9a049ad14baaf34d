//! Error handling for hub configuration.

use thiserror::Error;

/// Result type alias using the hub core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or checking configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// The environment variable name.
        key: String,
        /// The rejected raw value.
        value: String,
    },

    /// The tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}
