//! Error types shared across the biorig crates.

use thiserror::Error;

/// Errors produced when validating or parsing biorig data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operator-set control parameters failed validation.
    ///
    /// The previous valid parameter snapshot stays in effect when this is
    /// returned from a refresh.
    #[error("Invalid control parameters: {0}")]
    InvalidParameters(String),

    /// An MQTT topic does not name a known sensor channel.
    #[error("Unknown sensor topic: {0}")]
    UnknownTopic(String),

    /// A sensor payload could not be interpreted as a number.
    #[error("Invalid sensor payload: {0}")]
    InvalidPayload(String),
}

/// Result type alias using the shared biorig error type.
pub type Result<T> = std::result::Result<T, Error>;
