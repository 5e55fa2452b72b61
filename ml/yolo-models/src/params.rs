//! Learned parameters of the convolutional layers.

use burn::module::{Module, Param, RunningState};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::Backend;
use burn::tensor::Tensor;

use crate::error::{ModelError, Result};
use crate::graph::{ConvolutionalLayer, DarknetGraph};

/// Epsilon of the inference-time normalization.
pub const NORM_EPSILON: f64 = 1e-5;

/// Batch-normalization statistics in the order a weight file stores them.
#[derive(Debug, Clone)]
pub struct NormValues<B: Backend> {
    /// Learnable shift.
    pub beta: Tensor<B, 1>,
    /// Learnable scale.
    pub gamma: Tensor<B, 1>,
    /// Running mean.
    pub mean: Tensor<B, 1>,
    /// Running variance.
    pub var: Tensor<B, 1>,
}

/// Convolution plus optional batch normalization for one layer.
///
/// Stride and padding live in the convolution; the activation comes from
/// the layer descriptor at forward time.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B>>,
}

impl<B: Backend> ConvBlock<B> {
    /// Creates a zero-initialised block shaped after `layer`.
    #[must_use]
    pub fn new(layer: &ConvolutionalLayer, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([layer.in_channels, layer.filters], [layer.size, layer.size])
            .with_stride([layer.stride, layer.stride])
            .with_padding(PaddingConfig2d::Explicit(layer.padding, layer.padding))
            .with_bias(!layer.batch_normalize)
            .with_initializer(Initializer::Zeros)
            .init(device);

        let norm = layer.batch_normalize.then(|| {
            BatchNormConfig::new(layer.filters)
                .with_epsilon(NORM_EPSILON)
                .init(device)
        });

        Self { conv, norm }
    }

    /// Convolution, normalization, activation.
    ///
    /// Normalization always uses the stored statistics and never updates
    /// them, whatever the backend.
    pub fn forward(&self, layer: &ConvolutionalLayer, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = match &self.norm {
            Some(norm) => normalize(norm, x),
            None => x,
        };
        layer.activation.apply(x)
    }

    /// Convolution weight, `[filters, in_channels, size, size]`.
    #[must_use]
    pub fn weight(&self) -> Tensor<B, 4> {
        self.conv.weight.val()
    }

    /// Convolution bias, absent when normalization follows.
    #[must_use]
    pub fn bias(&self) -> Option<Tensor<B, 1>> {
        self.conv.bias.as_ref().map(Param::val)
    }

    /// Normalization statistics, if this block normalizes.
    #[must_use]
    pub fn norm(&self) -> Option<NormValues<B>> {
        self.norm.as_ref().map(|bn| NormValues {
            beta: bn.beta.val(),
            gamma: bn.gamma.val(),
            mean: bn.running_mean.value(),
            var: bn.running_var.value(),
        })
    }

    pub(crate) fn set_weight(&mut self, weight: Tensor<B, 4>) {
        self.conv.weight = Param::from_tensor(weight);
    }

    pub(crate) fn set_bias(&mut self, bias: Tensor<B, 1>) {
        self.conv.bias = Some(Param::from_tensor(bias));
    }

    pub(crate) fn set_norm(&mut self, values: NormValues<B>) {
        if let Some(bn) = self.norm.as_mut() {
            bn.beta = Param::from_tensor(values.beta);
            bn.gamma = Param::from_tensor(values.gamma);
            bn.running_mean = RunningState::new(values.mean);
            bn.running_var = RunningState::new(values.var);
        }
    }

    fn check(&self, index: usize, layer: &ConvolutionalLayer) -> Result<()> {
        let actual = self.conv.weight.dims();
        let expected = layer.weight_shape();
        if actual != expected {
            return Err(ModelError::shape_mismatch(
                index,
                format!("weight {expected:?}"),
                format!("weight {actual:?}"),
            ));
        }
        if self.norm.is_some() != layer.batch_normalize
            || self.conv.bias.is_some() == layer.batch_normalize
        {
            return Err(ModelError::shape_mismatch(
                index,
                format!("batch_normalize={}", layer.batch_normalize),
                format!("batch_normalize={}", self.norm.is_some()),
            ));
        }
        Ok(())
    }
}

fn normalize<B: Backend>(norm: &BatchNorm<B>, x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [channels] = norm.gamma.val().dims();
    let shape = [1, channels, 1, 1];
    let mean = norm.running_mean.value().reshape(shape);
    let std = norm.running_var.value().add_scalar(NORM_EPSILON).sqrt().reshape(shape);
    let gamma = norm.gamma.val().reshape(shape);
    let beta = norm.beta.val().reshape(shape);
    (x - mean) / std * gamma + beta
}

/// Parameter store: one [`ConvBlock`] per convolutional layer, in order.
#[derive(Module, Debug)]
pub struct DarknetParams<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> DarknetParams<B> {
    /// Creates a zero-initialised store matching `graph`.
    #[must_use]
    pub fn init(graph: &DarknetGraph, device: &B::Device) -> Self {
        let blocks = graph
            .convolutional_layers()
            .map(|(_, layer)| ConvBlock::new(layer, device))
            .collect();
        Self { blocks }
    }

    /// Blocks in convolution order.
    #[must_use]
    pub fn blocks(&self) -> &[ConvBlock<B>] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [ConvBlock<B>] {
        &mut self.blocks
    }

    /// Checks that the store has the block count and shapes `graph` needs.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] at the first disagreeing layer.
    pub fn validate(&self, graph: &DarknetGraph) -> Result<()> {
        let expected = graph.num_convolutional();
        if self.blocks.len() != expected {
            return Err(ModelError::shape_mismatch(
                0,
                format!("{expected} convolution blocks"),
                format!("{} convolution blocks", self.blocks.len()),
            ));
        }
        graph
            .convolutional_layers()
            .zip(&self.blocks)
            .try_for_each(|((index, layer), block)| block.check(index, layer))
    }
}
