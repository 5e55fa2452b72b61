//! Error types for yolo-models crate.

use thiserror::Error;

/// Errors that can occur while building, loading or running a network.
///
/// Every variant is fatal to the call that produced it: they describe a
/// corrupt or incompatible input artifact, never a transient condition.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The architecture description could not be parsed or is inconsistent.
    #[error("malformed config at line {line}: {reason}")]
    MalformedConfig {
        /// 1-based line of the offending block or entry.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// A block names a layer type the engine does not implement.
    #[error("unknown layer type `{kind}` at layer {index}")]
    UnknownLayerType {
        /// Layer index (metadata block excluded).
        index: usize,
        /// The block name as written.
        kind: String,
    },

    /// A route/shortcut reference points outside the already-built layers.
    #[error("layer {index} references {reference}, which resolves to {resolved}")]
    DanglingReference {
        /// Layer holding the reference.
        index: usize,
        /// Raw reference as written.
        reference: isize,
        /// Resolved absolute index.
        resolved: isize,
    },

    /// Operand shapes of a layer disagree.
    #[error("shape mismatch at layer {layer}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Layer index.
        layer: usize,
        /// Expected shape.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// The weight stream ended before every expected value was read.
    #[error("weight file truncated in {section}: needed {expected} values")]
    TruncatedWeightFile {
        /// Header or layer section being read.
        section: String,
        /// Number of values the section needed.
        expected: usize,
    },

    /// The weight stream carries bytes past the last convolution.
    #[error("weight file has {bytes} trailing bytes after the last layer")]
    TrailingWeightData {
        /// Number of unread bytes.
        bytes: u64,
    },

    /// The weight header declares an unsupported format version.
    #[error("unsupported weight file version {major}.{minor}.{revision}")]
    VersionMismatch {
        /// Major version.
        major: i32,
        /// Minor version.
        minor: i32,
        /// Revision.
        revision: i32,
    },

    /// Failed to load checkpoint.
    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to save checkpoint.
    #[error("failed to save checkpoint to {path}: {reason}")]
    SaveCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Checkpoint file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Unsupported checkpoint format.
    #[error("unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Tensor data could not be converted.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Creates a malformed config error.
    #[must_use]
    pub fn malformed_config(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedConfig {
            line,
            reason: reason.into(),
        }
    }

    /// Creates an unknown layer type error.
    #[must_use]
    pub fn unknown_layer_type(index: usize, kind: impl Into<String>) -> Self {
        Self::UnknownLayerType {
            index,
            kind: kind.into(),
        }
    }

    /// Creates a dangling reference error.
    #[must_use]
    pub const fn dangling_reference(index: usize, reference: isize, resolved: isize) -> Self {
        Self::DanglingReference {
            index,
            reference,
            resolved,
        }
    }

    /// Creates a shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(
        layer: usize,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            layer,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a truncated weight file error.
    #[must_use]
    pub fn truncated_weight_file(section: impl Into<String>, expected: usize) -> Self {
        Self::TruncatedWeightFile {
            section: section.into(),
            expected,
        }
    }

    /// Creates a trailing weight data error.
    #[must_use]
    pub const fn trailing_weight_data(bytes: u64) -> Self {
        Self::TrailingWeightData { bytes }
    }

    /// Creates a version mismatch error.
    #[must_use]
    pub const fn version_mismatch(major: i32, minor: i32, revision: i32) -> Self {
        Self::VersionMismatch {
            major,
            minor,
            revision,
        }
    }

    /// Creates a load checkpoint error.
    #[must_use]
    pub fn load_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a save checkpoint error.
    #[must_use]
    pub fn save_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SaveCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a checkpoint not found error.
    #[must_use]
    pub fn checkpoint_not_found(path: impl Into<String>) -> Self {
        Self::CheckpointNotFound(path.into())
    }

    /// Creates an unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io(reason.into())
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for yolo-models operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_malformed_config() {
        let err = ModelError::malformed_config(12, "missing `=`");
        assert!(err.to_string().contains("line 12"));
        assert!(err.to_string().contains("missing `=`"));
    }

    #[test]
    fn error_unknown_layer_type() {
        let err = ModelError::unknown_layer_type(4, "maxpool");
        assert!(err.to_string().contains("maxpool"));
        assert!(err.to_string().contains("layer 4"));
    }

    #[test]
    fn error_dangling_reference() {
        let err = ModelError::dangling_reference(2, -5, -3);
        assert!(err.to_string().contains("-5"));
        assert!(err.to_string().contains("-3"));
    }

    #[test]
    fn error_shape_mismatch() {
        let err = ModelError::shape_mismatch(7, "[1, 64, 52, 52]", "[1, 32, 52, 52]");
        assert!(err.to_string().contains("layer 7"));
        assert!(err.to_string().contains("[1, 32, 52, 52]"));
    }

    #[test]
    fn error_truncated_weight_file() {
        let err = ModelError::truncated_weight_file("layer 3 weights", 864);
        assert!(err.to_string().contains("layer 3 weights"));
        assert!(err.to_string().contains("864"));
    }

    #[test]
    fn error_trailing_weight_data() {
        let err = ModelError::trailing_weight_data(16);
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn error_version_mismatch() {
        let err = ModelError::version_mismatch(7, 1, 0);
        assert!(err.to_string().contains("7.1.0"));
    }

    #[test]
    fn error_checkpoint_variants() {
        let err = ModelError::load_checkpoint("model.bin", "file corrupted");
        assert!(err.to_string().contains("model.bin"));
        let err = ModelError::save_checkpoint("out.json", "disk full");
        assert!(err.to_string().contains("disk full"));
        let err = ModelError::checkpoint_not_found("/missing.weights");
        assert!(err.to_string().contains("/missing.weights"));
        let err = ModelError::unsupported_format("xml");
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: ModelError = io_err.into();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
