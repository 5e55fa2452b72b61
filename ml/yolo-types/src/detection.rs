//! Raw head rows and final detections.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;
use crate::error::{Result, TypesError};

/// Number of leading box/objectness fields in a raw row.
pub const BOX_FIELDS: usize = 5;

/// One decoded row emitted per anchor, per grid cell, per scale.
///
/// Layout on the wire is `(cx, cy, w, h, objectness, class_score_1..N)`, all
/// in input-image pixel units / probabilities after decoding.
///
/// # Example
///
/// ```
/// use yolo_types::RawDetection;
///
/// let row = RawDetection::from_slice(&[208.0, 208.0, 10.0, 13.0, 0.9, 0.1, 0.8])?;
/// assert_eq!(row.num_classes(), 2);
/// assert_eq!(row.best_class(), Some((1, 0.8)));
/// # Ok::<(), yolo_types::TypesError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Box center x.
    pub cx: f32,
    /// Box center y.
    pub cy: f32,
    /// Box width.
    pub w: f32,
    /// Box height.
    pub h: f32,
    /// Probability that this anchor contains any object.
    pub objectness: f32,
    /// Per-class probabilities.
    pub class_scores: Vec<f32>,
}

impl RawDetection {
    /// Creates a raw row from its fields.
    #[must_use]
    pub const fn new(
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        objectness: f32,
        class_scores: Vec<f32>,
    ) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            objectness,
            class_scores,
        }
    }

    /// Reads a row from a flat slice of `5 + classes` values.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::RowTooShort`] when fewer than five values are
    /// given.
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        match values {
            [cx, cy, w, h, objectness, scores @ ..] => Ok(Self {
                cx: *cx,
                cy: *cy,
                w: *w,
                h: *h,
                objectness: *objectness,
                class_scores: scores.to_vec(),
            }),
            _ => Err(TypesError::row_too_short(values.len())),
        }
    }

    /// Number of class-score fields.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.class_scores.len()
    }

    /// Row width on the wire (`5 + classes`).
    #[must_use]
    pub fn width(&self) -> usize {
        BOX_FIELDS + self.class_scores.len()
    }

    /// Returns the box in corner form.
    #[must_use]
    pub fn corners(&self) -> BoundingBox {
        BoundingBox::from_center(self.cx, self.cy, self.w, self.h)
    }

    /// Returns `(class_id, score)` of the highest class score.
    ///
    /// The first index wins ties. Returns `None` for rows without classes.
    #[must_use]
    pub fn best_class(&self) -> Option<(usize, f32)> {
        self.class_scores
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (id, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((id, score)),
            })
    }
}

/// A final detection after suppression.
///
/// Row form is `(x1, y1, x2, y2, objectness, class_confidence, class_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in corner form.
    pub bbox: BoundingBox,
    /// Objectness probability of the originating row.
    pub objectness: f32,
    /// Highest class probability of the originating row.
    pub class_confidence: f32,
    /// Index of the highest-scoring class.
    pub class_id: usize,
}

impl Detection {
    /// Creates a detection.
    #[must_use]
    pub const fn new(
        bbox: BoundingBox,
        objectness: f32,
        class_confidence: f32,
        class_id: usize,
    ) -> Self {
        Self {
            bbox,
            objectness,
            class_confidence,
            class_id,
        }
    }

    /// Collapses a raw row: corner conversion plus arg-max over class scores.
    ///
    /// Returns `None` for rows that carry no class scores.
    #[must_use]
    pub fn from_raw(row: &RawDetection) -> Option<Self> {
        let (class_id, class_confidence) = row.best_class()?;
        Some(Self::new(
            row.corners(),
            row.objectness,
            class_confidence,
            class_id,
        ))
    }

    /// Returns the seven-field row form.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_row(&self) -> [f32; 7] {
        [
            self.bbox.x1,
            self.bbox.y1,
            self.bbox.x2,
            self.bbox.y2,
            self.objectness,
            self.class_confidence,
            self.class_id as f32,
        ]
    }
}
