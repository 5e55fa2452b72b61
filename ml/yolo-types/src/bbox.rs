//! Corner-form bounding boxes in input-image pixel units.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in corner form `(x1, y1, x2, y2)`.
///
/// Coordinates are in pixels of the network input image. Decoded boxes may
/// extend past the image edges; nothing here clamps them.
///
/// # Example
///
/// ```
/// use yolo_types::BoundingBox;
///
/// let bbox = BoundingBox::from_center(208.0, 208.0, 10.0, 14.0);
///
/// assert!((bbox.x1 - 203.0).abs() < 1e-6);
/// assert!((bbox.y2 - 215.0).abs() < 1e-6);
/// assert!((bbox.area() - 140.0).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BoundingBox {
    /// Creates a box from its corners.
    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Creates a box from a center point and a width/height.
    #[must_use]
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let half_w = w / 2.0;
        let half_h = h / 2.0;
        Self {
            x1: cx - half_w,
            y1: cy - half_h,
            x2: cx + half_w,
            y2: cy + half_h,
        }
    }

    /// Returns the box as an array `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Returns the box width, zero for inverted boxes.
    #[must_use]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Returns the box height, zero for inverted boxes.
    #[must_use]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Returns the box area.
    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns the center point `(cx, cy)`.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (
            f32::midpoint(self.x1, self.x2),
            f32::midpoint(self.y1, self.y2),
        )
    }

    /// Computes the intersection-over-union (`IoU`) with another box.
    ///
    /// Returns a value in `[0, 1]`. Two degenerate boxes (zero union) have an
    /// `IoU` of zero.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter_area = inter_w * inter_h;

        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Returns `true` when all four coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bbox_from_center() {
        let bbox = BoundingBox::from_center(10.0, 20.0, 4.0, 6.0);
        assert_relative_eq!(bbox.x1, 8.0);
        assert_relative_eq!(bbox.y1, 17.0);
        assert_relative_eq!(bbox.x2, 12.0);
        assert_relative_eq!(bbox.y2, 23.0);

        let (cx, cy) = bbox.center();
        assert_relative_eq!(cx, 10.0);
        assert_relative_eq!(cy, 20.0);
    }

    #[test]
    fn bbox_dimensions() {
        let bbox = BoundingBox::new(0.0, 0.0, 4.0, 3.0);
        assert_relative_eq!(bbox.width(), 4.0);
        assert_relative_eq!(bbox.height(), 3.0);
        assert_relative_eq!(bbox.area(), 12.0);

        let inverted = BoundingBox::new(4.0, 3.0, 0.0, 0.0);
        assert_relative_eq!(inverted.area(), 0.0);
    }

    #[test]
    fn bbox_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);

        // Intersection 25, union 175.
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 1e-6);
        assert_relative_eq!(a.iou(&a), 1.0);

        let far = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_relative_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn bbox_iou_is_symmetric() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 8.0);
        let b = BoundingBox::new(3.0, 1.0, 12.0, 9.0);
        assert_relative_eq!(a.iou(&b), b.iou(&a));
    }

    #[test]
    fn bbox_degenerate_iou_is_zero() {
        let point = BoundingBox::new(1.0, 1.0, 1.0, 1.0);
        assert_relative_eq!(point.iou(&point), 0.0);
    }

    #[test]
    fn bbox_finite() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_finite());
        assert!(!BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(!BoundingBox::new(0.0, 0.0, f32::INFINITY, 1.0).is_finite());
    }

    #[test]
    fn bbox_serialization() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&bbox).unwrap();
        let parsed: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bbox);
    }
}
