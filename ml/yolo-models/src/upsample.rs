//! Integer-factor bilinear upsampling on half-pixel centres.
//!
//! Output sample `o` along an axis reads source coordinate
//! `(o + 0.5) / scale - 0.5`, clamped to the edges. For an integer scale every
//! output is a fixed two-tap blend of a source sample and one neighbour, so
//! the resize is built from shifted copies of the input and interleaved.

use burn::prelude::Backend;
use burn::tensor::Tensor;

/// Upsamples `[b, c, h, w]` to `[b, c, h * scale, w * scale]`.
#[must_use]
pub fn upsample_bilinear<B: Backend>(x: Tensor<B, 4>, scale: usize) -> Tensor<B, 4> {
    if scale <= 1 {
        return x;
    }
    let x = upsample_axis(x, 3, scale);
    upsample_axis(x, 2, scale)
}

/// Signed distance from each output phase to its source sample.
#[allow(clippy::cast_precision_loss)]
fn phase_offsets(scale: usize) -> Vec<f32> {
    (0..scale)
        .map(|k| (k as f32 + 0.5) / scale as f32 - 0.5)
        .collect()
}

fn upsample_axis<B: Backend>(x: Tensor<B, 4>, axis: usize, scale: usize) -> Tensor<B, 4> {
    let dims = x.dims();
    let n = dims[axis];

    // neighbours with the edge sample repeated
    let (prev, next) = if n == 1 {
        (x.clone(), x.clone())
    } else {
        (
            Tensor::cat(
                vec![x.clone().narrow(axis, 0, 1), x.clone().narrow(axis, 0, n - 1)],
                axis,
            ),
            Tensor::cat(
                vec![x.clone().narrow(axis, 1, n - 1), x.clone().narrow(axis, n - 1, 1)],
                axis,
            ),
        )
    };

    let phases: Vec<Tensor<B, 4>> = phase_offsets(scale)
        .into_iter()
        .map(|d| {
            let neighbour = if d < 0.0 { prev.clone() } else { next.clone() };
            let t = d.abs();
            x.clone().mul_scalar(1.0 - t) + neighbour.mul_scalar(t)
        })
        .collect();

    let mut out = dims;
    out[axis] = n * scale;
    Tensor::stack::<5>(phases, axis + 1).reshape(out)
}
