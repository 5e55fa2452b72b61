//! Property-based tests for confidence filtering and suppression.
//!
//! Run with: cargo test -p yolo-postprocess -- proptest

use proptest::prelude::*;
use yolo_postprocess::{SuppressionConfig, non_max_suppression, postprocess};
use yolo_types::{BoundingBox, Detection, RawDetection};

// =============================================================================
// Strategies
// =============================================================================

/// A detection with a non-degenerate box in a 150px square and up to 4 classes.
fn arb_detection() -> impl Strategy<Value = Detection> {
    (
        0.0..100.0f32,
        0.0..100.0f32,
        1.0..50.0f32,
        1.0..50.0f32,
        0.0..1.0f32,
        0..4usize,
    )
        .prop_map(|(x, y, w, h, confidence, class_id)| {
            Detection::new(BoundingBox::new(x, y, x + w, y + h), 0.9, confidence, class_id)
        })
}

/// A decoded row with three class scores.
fn arb_row() -> impl Strategy<Value = RawDetection> {
    (
        prop::array::uniform2(0.0..416.0f32),
        prop::array::uniform2(1.0..100.0f32),
        0.0..1.0f32,
        prop::collection::vec(0.0..1.0f32, 3),
    )
        .prop_map(|([cx, cy], [w, h], objectness, scores)| {
            RawDetection::new(cx, cy, w, h, objectness, scores)
        })
}

// =============================================================================
// Property Tests: Suppression
// =============================================================================

proptest! {
    /// Suppressing the output again removes nothing and keeps the order.
    #[test]
    fn nms_is_idempotent(
        detections in prop::collection::vec(arb_detection(), 0..40),
        iou in 0.0..1.0f32,
    ) {
        let once = non_max_suppression(detections, iou);
        let twice = non_max_suppression(once.clone(), iou);
        prop_assert_eq!(once, twice);
    }

    /// No two survivors of one class overlap by more than the threshold.
    #[test]
    fn nms_survivors_respect_iou_bound(
        detections in prop::collection::vec(arb_detection(), 0..40),
        iou in 0.0..1.0f32,
    ) {
        let kept = non_max_suppression(detections, iou);
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                if a.class_id == b.class_id {
                    prop_assert!(a.bbox.iou(&b.bbox) <= iou);
                }
            }
        }
    }

    /// Every removed detection overlaps a kept, at least as confident box of its class.
    #[test]
    fn nms_rejections_are_explained(
        detections in prop::collection::vec(arb_detection(), 0..40),
        iou in 0.0..1.0f32,
    ) {
        let kept = non_max_suppression(detections.clone(), iou);
        for removed in detections.iter().filter(|d| !kept.contains(d)) {
            let explained = kept.iter().any(|k| {
                k.class_id == removed.class_id
                    && k.class_confidence >= removed.class_confidence
                    && k.bbox.iou(&removed.bbox) > iou
            });
            prop_assert!(explained, "unexplained rejection: {:?}", removed);
        }
    }

    /// Output is grouped by ascending class, each class in descending confidence.
    #[test]
    fn nms_output_order(detections in prop::collection::vec(arb_detection(), 0..40)) {
        let kept = non_max_suppression(detections, 0.5);
        for pair in kept.windows(2) {
            prop_assert!(pair[0].class_id <= pair[1].class_id);
            if pair[0].class_id == pair[1].class_id {
                prop_assert!(pair[0].class_confidence >= pair[1].class_confidence);
            }
        }
    }

    /// A threshold of 1 can never be exceeded, so nothing is removed.
    #[test]
    fn nms_threshold_one_keeps_all(detections in prop::collection::vec(arb_detection(), 0..40)) {
        let count = detections.len();
        prop_assert_eq!(non_max_suppression(detections, 1.0).len(), count);
    }
}

// =============================================================================
// Property Tests: Full postprocess
// =============================================================================

proptest! {
    /// Every detection passed the confidence filter and never outnumbers its input.
    #[test]
    fn postprocess_respects_confidence(
        rows in prop::collection::vec(arb_row(), 0..60),
        confidence in 0.0..1.0f32,
    ) {
        let config = SuppressionConfig::default().with_confidence_threshold(confidence);
        let detections = postprocess(&rows, &config).unwrap_or_default();

        let above = rows.iter().filter(|r| r.objectness > confidence).count();
        prop_assert!(detections.len() <= above);
        for detection in &detections {
            prop_assert!(detection.objectness > confidence);
            prop_assert!(detection.bbox.x1 <= detection.bbox.x2);
            prop_assert!(detection.bbox.y1 <= detection.bbox.y2);
        }
    }
}

// =============================================================================
// Concrete scenarios
// =============================================================================

fn pair_with_iou_0_6() -> Vec<RawDetection> {
    // 10x10 boxes whose centres are 2.5px apart: intersection 75, union 125
    vec![
        RawDetection::new(5.0, 5.0, 10.0, 10.0, 0.9, vec![0.95, 0.1]),
        RawDetection::new(7.5, 5.0, 10.0, 10.0, 0.9, vec![0.85, 0.1]),
    ]
}

#[test]
fn overlapping_pair_low_threshold_keeps_one() {
    let config = SuppressionConfig::new(0.5, 0.4);
    let detections = postprocess(&pair_with_iou_0_6(), &config).unwrap_or_default();
    assert_eq!(detections.len(), 1);
    assert!((detections[0].class_confidence - 0.95).abs() < 1e-6);
}

#[test]
fn overlapping_pair_high_threshold_keeps_both() {
    let config = SuppressionConfig::new(0.5, 0.7);
    let detections = postprocess(&pair_with_iou_0_6(), &config).unwrap_or_default();
    assert_eq!(detections.len(), 2);
}

#[test]
fn raising_confidence_drops_pair() {
    let config = SuppressionConfig::new(0.9, 0.7);
    let detections = postprocess(&pair_with_iou_0_6(), &config).unwrap_or_default();
    assert!(detections.is_empty());
}
