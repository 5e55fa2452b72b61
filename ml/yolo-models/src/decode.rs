//! Detection-head decoding.
//!
//! A head of shape `[batch, anchors * (5 + classes), grid_h, grid_w]` becomes
//! `[batch, grid_h * grid_w * anchors, 5 + classes]` rows in input pixels.
//! Rows are ordered by grid cell (row-major) with the anchor cycling fastest.

use burn::prelude::Backend;
use burn::tensor::activation::sigmoid;
use burn::tensor::{Tensor, TensorData};
use yolo_types::{Anchor, BOX_FIELDS};

use crate::error::{ModelError, Result};

/// Decodes one detection head.
///
/// `input_height` is the network input height; the head's stride is
/// `input_height / grid_h`.
///
/// # Errors
///
/// Returns [`ModelError::ShapeMismatch`] if the channel count is not a
/// multiple of `anchors.len()` with at least five values per anchor.
#[allow(clippy::cast_precision_loss)]
pub fn decode<B: Backend>(
    head: Tensor<B, 4>,
    anchors: &[Anchor],
    input_height: usize,
    layer: usize,
) -> Result<Tensor<B, 3>> {
    let [batch, channels, grid_h, grid_w] = head.dims();
    let num_anchors = anchors.len();
    if num_anchors == 0 || channels % num_anchors != 0 || channels / num_anchors < BOX_FIELDS {
        return Err(ModelError::shape_mismatch(
            layer,
            format!("a multiple of {num_anchors} anchors x at least {BOX_FIELDS} channels"),
            format!("{channels} channels"),
        ));
    }

    let width = channels / num_anchors;
    let cells = grid_h * grid_w;
    let rows = cells * num_anchors;
    let stride = input_height as f32 / grid_h as f32;
    let device = head.device();

    let rows_tensor = head
        .reshape([batch, num_anchors, width, cells])
        .permute([0, 3, 1, 2])
        .reshape([batch, rows, width]);

    let (offsets, priors) = grid_tables(grid_w, cells, anchors, stride);
    let offsets = Tensor::<B, 2>::from_data(TensorData::new(offsets, [rows, 2]), &device)
        .unsqueeze_dim::<3>(0)
        .repeat_dim(0, batch);
    let priors = Tensor::<B, 2>::from_data(TensorData::new(priors, [rows, 2]), &device)
        .unsqueeze_dim::<3>(0)
        .repeat_dim(0, batch);

    let xy = (sigmoid(rows_tensor.clone().narrow(2, 0, 2)) + offsets).mul_scalar(stride);
    let wh = (rows_tensor.clone().narrow(2, 2, 2).exp() * priors).mul_scalar(stride);
    let scores = sigmoid(rows_tensor.narrow(2, 4, width - 4));

    Ok(Tensor::cat(vec![xy, wh, scores], 2))
}

/// Per-row `(x, y)` cell offsets and stride-relative anchor sizes.
#[allow(clippy::cast_precision_loss)]
fn grid_tables(grid_w: usize, cells: usize, anchors: &[Anchor], stride: f32) -> (Vec<f32>, Vec<f32>) {
    let rows = cells * anchors.len();
    let mut offsets = Vec::with_capacity(rows * 2);
    let mut priors = Vec::with_capacity(rows * 2);
    for cell in 0..cells {
        let (x, y) = ((cell % grid_w) as f32, (cell / grid_w) as f32);
        for anchor in anchors {
            offsets.extend([x, y]);
            priors.extend([anchor.width / stride, anchor.height / stride]);
        }
    }
    (offsets, priors)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    #[test]
    fn grid_tables_are_cell_major() {
        let anchors = [Anchor::new(32.0, 64.0), Anchor::new(16.0, 16.0)];
        let (offsets, priors) = grid_tables(2, 4, &anchors, 16.0);
        // cell 3 is (x=1, y=1); both anchors repeat its offset
        assert_eq!(&offsets[12..16], &[1.0, 1.0, 1.0, 1.0]);
        // cell 1 is (x=1, y=0)
        assert_eq!(&offsets[4..6], &[1.0, 0.0]);
        assert_eq!(&priors[0..4], &[2.0, 4.0, 1.0, 1.0]);
    }

    #[test]
    fn decode_zero_head() {
        let device = Default::default();
        let anchors = [Anchor::new(10.0, 13.0), Anchor::new(16.0, 30.0)];
        let head = Tensor::<TestBackend, 4>::zeros([1, 2 * 7, 2, 2], &device);

        let out = decode(head, &anchors, 64, 0).unwrap();
        assert_eq!(out.dims(), [1, 8, 7]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        // row 3 = cell 1 (x=1, y=0), anchor 1; stride 32
        let row = &values[3 * 7..4 * 7];
        assert_relative_eq!(row[0], 1.5 * 32.0, epsilon = 1e-4);
        assert_relative_eq!(row[1], 0.5 * 32.0, epsilon = 1e-4);
        assert_relative_eq!(row[2], 16.0, epsilon = 1e-4);
        assert_relative_eq!(row[3], 30.0, epsilon = 1e-4);
        for score in &row[4..] {
            assert_relative_eq!(*score, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn decode_single_hot_cell() {
        // 13x13 grid, 3 anchors, 4 classes, stride 32
        let device = Default::default();
        let (grid, classes, width) = (13, 4, 9);
        let anchors = [
            Anchor::new(10.0, 13.0),
            Anchor::new(16.0, 30.0),
            Anchor::new(33.0, 23.0),
        ];
        let mut raw = vec![-10.0_f32; 3 * width * grid * grid];
        let at = |channel: usize| channel * grid * grid + 6 * grid + 6;
        raw[at(0)] = 0.0;
        raw[at(1)] = 0.0;
        raw[at(2)] = 0.0;
        raw[at(3)] = 0.0;
        raw[at(4)] = logit(0.9);
        raw[at(5 + 2)] = logit(0.8);
        let head = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(raw, [1, 3 * width, grid, grid]),
            &device,
        );

        let out = decode(head, &anchors, 416, 0).unwrap();
        assert_eq!(out.dims(), [1, grid * grid * 3, width]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        let index = (6 * grid + 6) * 3;
        let row = &values[index * width..(index + 1) * width];
        assert_relative_eq!(row[0], 6.5 * 32.0, epsilon = 1e-3);
        assert_relative_eq!(row[1], 6.5 * 32.0, epsilon = 1e-3);
        assert_relative_eq!(row[2], 10.0, epsilon = 1e-3);
        assert_relative_eq!(row[3], 13.0, epsilon = 1e-3);
        assert_relative_eq!(row[4], 0.9, epsilon = 1e-5);
        assert_relative_eq!(row[7], 0.8, epsilon = 1e-5);
        assert!(row[5] < 1e-4);
    }

    #[test]
    fn decode_rejects_bad_channels() {
        let device = Default::default();
        let head = Tensor::<TestBackend, 4>::zeros([1, 10, 2, 2], &device);
        let anchors = [Anchor::new(1.0, 1.0); 3];
        let err = decode(head, &anchors, 32, 4).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { layer: 4, .. }));
    }
}
