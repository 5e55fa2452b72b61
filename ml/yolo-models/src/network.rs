//! Forward execution over a built graph.

use std::path::Path;

use burn::prelude::Backend;
use burn::tensor::Tensor;
use tracing::{debug, info};
use yolo_types::RawDetection;

use crate::checkpoint::load_checkpoint;
use crate::decode::decode;
use crate::error::{ModelError, Result};
use crate::graph::{DarknetGraph, LayerDescriptor};
use crate::params::DarknetParams;
use crate::upsample::upsample_bilinear;

/// Runs one forward pass.
///
/// Returns the decoded rows of every detection head, concatenated in head
/// order along dimension 1: `[batch, rows, 5 + classes]`. Non-finite values
/// are replaced with zero.
///
/// Every intermediate output is kept until the pass ends so that route and
/// shortcut layers can reach back to any earlier index.
///
/// # Errors
///
/// Returns [`ModelError::ShapeMismatch`] when the input does not match the
/// network or when shortcut/route operands disagree.
pub fn forward<B: Backend>(
    graph: &DarknetGraph,
    params: &DarknetParams<B>,
    input: Tensor<B, 4>,
) -> Result<Tensor<B, 3>> {
    let meta = graph.meta();
    let dims = input.dims();
    if dims[1] != meta.channels {
        return Err(ModelError::shape_mismatch(
            0,
            format!("{} input channels", meta.channels),
            format!("{dims:?}"),
        ));
    }

    let mut history: Vec<Tensor<B, 4>> = Vec::with_capacity(graph.len());
    let mut detections: Option<Tensor<B, 3>> = None;
    let mut blocks = params.blocks().iter();
    let mut x = input;

    for (index, layer) in graph.layers().iter().enumerate() {
        x = match layer {
            LayerDescriptor::Convolutional(conv) => {
                let block = blocks.next().ok_or_else(|| {
                    ModelError::shape_mismatch(index, "a convolution block", "none left")
                })?;
                block.forward(conv, x)
            }
            LayerDescriptor::Shortcut(shortcut) => {
                let residual = history[shortcut.source].clone();
                check_same_dims(index, &x, &residual)?;
                x + residual
            }
            LayerDescriptor::Upsample(upsample) => upsample_bilinear(x, upsample.scale),
            LayerDescriptor::Route(route) => {
                let parts: Vec<Tensor<B, 4>> =
                    route.sources.iter().map(|&s| history[s].clone()).collect();
                for part in &parts[1..] {
                    check_same_spatial(index, &parts[0], part)?;
                }
                Tensor::cat(parts, 1)
            }
            LayerDescriptor::Yolo(yolo) => {
                let rows = decode(x.clone(), &yolo.anchors, meta.height, index)?;
                debug!(index, rows = rows.dims()[1], "decoded detection head");
                detections = Some(match detections {
                    Some(acc) => Tensor::cat(vec![acc, rows], 1),
                    None => rows,
                });
                x
            }
        };
        history.push(x.clone());
    }

    let detections = detections.ok_or_else(|| {
        ModelError::malformed_config(0, "network produced no detection rows")
    })?;
    Ok(zero_non_finite(detections))
}

/// Replaces NaN and infinities with zero.
pub fn zero_non_finite<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let finite = x.clone().abs().lower_elem(f32::INFINITY);
    x.mask_fill(finite.bool_not(), 0.0)
}

fn check_same_dims<B: Backend>(layer: usize, a: &Tensor<B, 4>, b: &Tensor<B, 4>) -> Result<()> {
    if a.dims() == b.dims() {
        Ok(())
    } else {
        Err(ModelError::shape_mismatch(
            layer,
            format!("{:?}", a.dims()),
            format!("{:?}", b.dims()),
        ))
    }
}

fn check_same_spatial<B: Backend>(layer: usize, a: &Tensor<B, 4>, b: &Tensor<B, 4>) -> Result<()> {
    let [ab, _, ah, aw] = a.dims();
    let [bb, _, bh, bw] = b.dims();
    if (ab, ah, aw) == (bb, bh, bw) {
        Ok(())
    } else {
        Err(ModelError::shape_mismatch(
            layer,
            format!("{:?}", a.dims()),
            format!("{:?}", b.dims()),
        ))
    }
}

/// Splits a `[batch, rows, width]` output into host-side rows per image.
///
/// # Errors
///
/// Returns [`ModelError::Serialization`] if the tensor data cannot be read
/// back as `f32`.
pub fn to_raw_detections<B: Backend>(output: Tensor<B, 3>) -> Result<Vec<Vec<RawDetection>>> {
    let [batch, rows, width] = output.dims();
    let values = output
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ModelError::serialization(format!("{e:?}")))?;

    if batch == 0 || rows == 0 {
        return Ok(vec![Vec::new(); batch]);
    }
    values
        .chunks_exact(rows * width)
        .map(|image| {
            image
                .chunks_exact(width)
                .map(|row| {
                    RawDetection::from_slice(row).map_err(|e| ModelError::serialization(e.to_string()))
                })
                .collect()
        })
        .collect()
}

/// A built graph bundled with its parameters.
///
/// The model is immutable once constructed; passes share nothing mutable.
///
/// # Example
///
/// ```
/// use burn_ndarray::NdArray;
/// use burn::tensor::Tensor;
/// use yolo_models::{Darknet, DarknetGraph, DarknetParams};
///
/// let graph = DarknetGraph::parse(
///     "[net]\nheight=32\n[convolutional]\nfilters=6\nsize=1\n[yolo]\nanchors=8,8\n",
/// )?;
/// let device = Default::default();
/// let params = DarknetParams::<NdArray<f32>>::init(&graph, &device);
/// let model = Darknet::new(graph, params)?;
///
/// let input = Tensor::zeros(model.graph().meta().input_dims(1), &device);
/// let rows = model.infer(input)?;
/// assert_eq!(rows[0].len(), 32 * 32);
/// # Ok::<(), yolo_models::ModelError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Darknet<B: Backend> {
    graph: DarknetGraph,
    params: DarknetParams<B>,
}

impl<B: Backend> Darknet<B> {
    /// Bundles a graph with matching parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] if `params` does not fit `graph`.
    pub fn new(graph: DarknetGraph, params: DarknetParams<B>) -> Result<Self> {
        params.validate(&graph)?;
        Ok(Self { graph, params })
    }

    /// Builds the graph from `cfg` and loads parameters from `weights`.
    ///
    /// The weight format follows the file extension, see
    /// [`crate::CheckpointFormat`].
    ///
    /// # Errors
    ///
    /// Returns any build or load error.
    pub fn from_files(
        cfg: impl AsRef<Path>,
        weights: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<Self> {
        let graph = DarknetGraph::from_file(cfg)?;
        let params = load_checkpoint(&graph, weights.as_ref(), device)?;
        info!(
            weights = %weights.as_ref().display(),
            layers = graph.len(),
            "loaded darknet model"
        );
        Self::new(graph, params)
    }

    /// The network graph.
    #[must_use]
    pub const fn graph(&self) -> &DarknetGraph {
        &self.graph
    }

    /// The parameter store.
    #[must_use]
    pub const fn params(&self) -> &DarknetParams<B> {
        &self.params
    }

    /// Consumes the model.
    #[must_use]
    pub fn into_parts(self) -> (DarknetGraph, DarknetParams<B>) {
        (self.graph, self.params)
    }

    /// Raw forward pass, see [`forward`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] on incompatible input.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        forward(&self.graph, &self.params, input)
    }

    /// Forward pass returning decoded rows per batch image.
    ///
    /// # Errors
    ///
    /// Returns forward or read-back errors.
    pub fn infer(&self, input: Tensor<B, 4>) -> Result<Vec<Vec<RawDetection>>> {
        to_raw_detections(self.forward(input)?)
    }
}
