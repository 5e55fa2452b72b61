//! Darknet YOLO network construction, weight loading and execution on Burn.
//!
//! The pipeline, leaf first:
//!
//! - [`DarknetConfig`] parses the INI-like architecture description
//! - [`DarknetGraph`] resolves it into typed [`LayerDescriptor`]s with
//!   per-layer channel counts
//! - [`read_weights`] / [`load_weights`] populate a [`DarknetParams`] store
//!   from a versioned Darknet weight file
//! - [`forward`] executes the graph and [`decode`]s every detection head
//!   into `(cx, cy, w, h, objectness, class scores..)` rows
//!
//! [`Darknet`] bundles a graph with its parameters. Parameters can also be
//! converted to and from Burn recorder formats with [`save_checkpoint`] and
//! [`load_checkpoint`].
//!
//! # Backend Support
//!
//! Everything is generic over a Burn [`Backend`](burn::prelude::Backend);
//! `burn-ndarray` is the CPU choice used throughout the tests.
//!
//! # Example
//!
//! ```ignore
//! use burn_ndarray::NdArray;
//! use yolo_models::Darknet;
//!
//! let device = Default::default();
//! let model = Darknet::<NdArray<f32>>::from_files("yolov3.cfg", "yolov3.weights", &device)?;
//! let input = Tensor::zeros(model.graph().meta().input_dims(1), &device);
//! let rows = model.infer(input)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cfg;
mod checkpoint;
mod decode;
mod error;
mod graph;
mod network;
mod params;
mod upsample;
mod weights;

pub use cfg::{DarknetConfig, LayerSpec};
pub use graph::{
    Activation, ConvolutionalLayer, DarknetGraph, LEAKY_SLOPE, LayerDescriptor, NetworkMeta,
    RouteLayer, ShortcutLayer, UpsampleLayer, YoloLayer, resolve_reference,
};

pub use decode::decode;
pub use network::{Darknet, forward, to_raw_detections, zero_non_finite};
pub use params::{ConvBlock, DarknetParams, NORM_EPSILON, NormValues};
pub use upsample::upsample_bilinear;

pub use weights::{
    HEADER_WORDS, LoadedWeights, WeightHeader, load_weights, read_weights, save_weights,
    write_weights,
};

pub use checkpoint::{CheckpointFormat, load_checkpoint, save_checkpoint};

pub use error::{ModelError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        CheckpointFormat, Darknet, DarknetConfig, DarknetGraph, DarknetParams, LayerDescriptor,
        ModelError, NetworkMeta, load_checkpoint, load_weights, save_checkpoint,
    };
}
