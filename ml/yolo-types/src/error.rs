//! Error types for yolo-types crate.

use thiserror::Error;

/// Errors that can occur when building detection types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A raw row lacks the five box/objectness fields.
    #[error("raw detection row has {len} values, expected at least 5")]
    RowTooShort {
        /// Number of values given.
        len: usize,
    },
}

impl TypesError {
    /// Creates a row-too-short error.
    #[must_use]
    pub const fn row_too_short(len: usize) -> Self {
        Self::RowTooShort { len }
    }
}

/// Result type for yolo-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;
