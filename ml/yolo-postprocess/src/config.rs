//! Suppression thresholds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PostprocessError, Result};

/// Thresholds for the confidence filter and per-class suppression.
///
/// # Example
///
/// ```
/// use yolo_postprocess::SuppressionConfig;
///
/// let config = SuppressionConfig::default().with_iou_threshold(0.45);
/// assert_eq!(config.confidence_threshold, 0.5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Rows with objectness at or below this are discarded.
    pub confidence_threshold: f32,

    /// Boxes overlapping an accepted box of the same class by more than
    /// this `IoU` are rejected.
    pub iou_threshold: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.4,
        }
    }
}

impl SuppressionConfig {
    /// Creates a config with both thresholds.
    #[must_use]
    pub const fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
        }
    }

    /// Sets the confidence threshold.
    #[must_use]
    pub const fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Sets the `IoU` threshold.
    #[must_use]
    pub const fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Checks both thresholds are finite and in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PostprocessError::InvalidThreshold`] naming the first bad
    /// threshold.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PostprocessError::invalid_threshold(name, value));
            }
        }
        Ok(())
    }

    /// Returns `true` if [`validate`](Self::validate) passes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Parses and validates a JSON config. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PostprocessError::InvalidConfig`] for malformed JSON and
    /// [`PostprocessError::InvalidThreshold`] for out-of-range values.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file, see [`from_json`](Self::from_json).
    ///
    /// # Errors
    ///
    /// Returns [`PostprocessError::Io`] if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = SuppressionConfig::default();
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.iou_threshold, 0.4);
        assert!(config.is_valid());
    }

    #[test]
    fn config_builders() {
        let config = SuppressionConfig::new(0.1, 0.2)
            .with_confidence_threshold(0.3)
            .with_iou_threshold(0.7);
        assert_eq!(config, SuppressionConfig::new(0.3, 0.7));
    }

    #[test]
    fn config_validate_bounds() {
        assert!(SuppressionConfig::new(0.0, 1.0).is_valid());
        assert!(!SuppressionConfig::new(-0.1, 0.4).is_valid());
        assert!(!SuppressionConfig::new(0.5, 1.01).is_valid());
        assert!(!SuppressionConfig::new(f32::NAN, 0.4).is_valid());

        let err = SuppressionConfig::new(0.5, f32::INFINITY).validate().unwrap_err();
        assert!(matches!(
            err,
            PostprocessError::InvalidThreshold {
                name: "iou_threshold",
                ..
            }
        ));
    }

    #[test]
    fn config_from_json_partial() {
        let config = SuppressionConfig::from_json(r#"{ "iou_threshold": 0.6 }"#).unwrap();
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.iou_threshold, 0.6);
    }

    #[test]
    fn config_from_json_rejects_out_of_range() {
        let err = SuppressionConfig::from_json(r#"{ "confidence_threshold": 2.0 }"#).unwrap_err();
        assert!(matches!(err, PostprocessError::InvalidThreshold { .. }));
        let err = SuppressionConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, PostprocessError::InvalidConfig(_)));
    }

    #[test]
    fn config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suppression.json");
        let json = serde_json::to_string(&SuppressionConfig::new(0.25, 0.45)).unwrap();
        std::fs::write(&path, json).unwrap();

        let config = SuppressionConfig::from_file(&path).unwrap();
        assert_eq!(config, SuppressionConfig::new(0.25, 0.45));
    }
}
