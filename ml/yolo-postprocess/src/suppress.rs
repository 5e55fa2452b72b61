//! Confidence filtering and per-class greedy suppression.

use std::collections::BTreeMap;

use tracing::{debug, info};
use yolo_types::{Detection, RawDetection};

use crate::config::SuppressionConfig;
use crate::error::Result;

/// Turns decoded rows into final detections.
///
/// 1. Drops rows with `objectness <= confidence_threshold` (and rows without
///    class scores).
/// 2. Converts the survivors to corner form and collapses their class
///    scores to `(class_confidence, class_id)`.
/// 3. Runs [`non_max_suppression`] per class.
///
/// An empty result means nothing was detected.
///
/// # Errors
///
/// Returns [`crate::PostprocessError::InvalidThreshold`] if `config` does
/// not validate.
///
/// # Example
///
/// ```
/// use yolo_postprocess::{SuppressionConfig, postprocess};
/// use yolo_types::RawDetection;
///
/// let rows = vec![
///     RawDetection::new(50.0, 50.0, 20.0, 20.0, 0.9, vec![0.2, 0.7]),
///     RawDetection::new(51.0, 50.0, 20.0, 20.0, 0.8, vec![0.1, 0.6]),
///     RawDetection::new(90.0, 90.0, 10.0, 10.0, 0.3, vec![0.9, 0.0]),
/// ];
/// let detections = postprocess(&rows, &SuppressionConfig::default())?;
///
/// assert_eq!(detections.len(), 1);
/// assert_eq!(detections[0].class_id, 1);
/// # Ok::<(), yolo_postprocess::PostprocessError>(())
/// ```
pub fn postprocess(rows: &[RawDetection], config: &SuppressionConfig) -> Result<Vec<Detection>> {
    config.validate()?;

    let candidates: Vec<Detection> = rows
        .iter()
        .filter(|row| row.objectness > config.confidence_threshold)
        .filter_map(Detection::from_raw)
        .collect();

    if candidates.is_empty() {
        debug!(rows = rows.len(), "no rows above confidence threshold");
        return Ok(Vec::new());
    }

    let candidate_count = candidates.len();
    let kept = non_max_suppression(candidates, config.iou_threshold);
    info!(
        rows = rows.len(),
        candidates = candidate_count,
        detections = kept.len(),
        "suppressed detections"
    );
    Ok(kept)
}

/// Runs [`postprocess`] for each image of a batch.
///
/// # Errors
///
/// Returns the config validation error.
pub fn postprocess_batch(
    batch: &[Vec<RawDetection>],
    config: &SuppressionConfig,
) -> Result<Vec<Vec<Detection>>> {
    batch.iter().map(|rows| postprocess(rows, config)).collect()
}

/// Greedy non-maximum suppression within each class.
///
/// Classes are visited in ascending id order. Inside a class, detections are
/// stably sorted by descending `class_confidence`; each one not yet rejected
/// is accepted and rejects every later box whose `IoU` with it exceeds
/// `iou_threshold`. The output lists each class's accepted detections in
/// that descending order.
#[must_use]
pub fn non_max_suppression(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut by_class: BTreeMap<usize, Vec<Detection>> = BTreeMap::new();
    for detection in detections {
        by_class.entry(detection.class_id).or_default().push(detection);
    }

    let mut kept = Vec::new();
    for (class_id, mut group) in by_class {
        group.sort_by(|a, b| b.class_confidence.total_cmp(&a.class_confidence));
        let before = kept.len();
        suppress_sorted(&group, iou_threshold, &mut kept);
        debug!(
            class_id,
            candidates = group.len(),
            kept = kept.len() - before,
            "suppressed class"
        );
    }
    kept
}

fn suppress_sorted(sorted: &[Detection], iou_threshold: f32, kept: &mut Vec<Detection>) {
    let mut rejected = vec![false; sorted.len()];
    for (i, accepted) in sorted.iter().enumerate() {
        if rejected[i] {
            continue;
        }
        kept.push(*accepted);
        for (j, other) in sorted.iter().enumerate().skip(i + 1) {
            if !rejected[j] && accepted.bbox.iou(&other.bbox) > iou_threshold {
                rejected[j] = true;
            }
        }
    }
}
