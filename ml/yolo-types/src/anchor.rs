//! Anchor box priors.

use serde::{Deserialize, Serialize};

/// A `(width, height)` prior in input-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Prior width.
    pub width: f32,
    /// Prior height.
    pub height: f32,
}

impl Anchor {
    /// Creates an anchor.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Builds anchors from a flat `w0, h0, w1, h1, ...` list.
    ///
    /// Returns `None` for odd-length input.
    ///
    /// # Example
    ///
    /// ```
    /// use yolo_types::Anchor;
    ///
    /// let pool = Anchor::from_flat(&[10.0, 13.0, 16.0, 30.0]).unwrap_or_default();
    /// assert_eq!(pool, vec![Anchor::new(10.0, 13.0), Anchor::new(16.0, 30.0)]);
    /// ```
    #[must_use]
    pub fn from_flat(values: &[f32]) -> Option<Vec<Self>> {
        if values.len() % 2 != 0 {
            return None;
        }
        Some(
            values
                .chunks_exact(2)
                .map(|pair| Self::new(pair[0], pair[1]))
                .collect(),
        )
    }
}
