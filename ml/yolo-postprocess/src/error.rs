//! Error types for yolo-postprocess crate.

use thiserror::Error;

/// Errors that can occur while configuring suppression.
///
/// An empty detection list is not an error.
#[derive(Debug, Error)]
pub enum PostprocessError {
    /// A threshold is non-finite or outside `[0, 1]`.
    #[error("invalid {name}: {value} (expected a finite value in [0, 1])")]
    InvalidThreshold {
        /// Which threshold.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl PostprocessError {
    /// Creates an invalid threshold error.
    #[must_use]
    pub const fn invalid_threshold(name: &'static str, value: f32) -> Self {
        Self::InvalidThreshold { name, value }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

impl From<std::io::Error> for PostprocessError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PostprocessError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result type for postprocessing operations.
pub type Result<T> = std::result::Result<T, PostprocessError>;
