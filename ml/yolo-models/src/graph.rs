//! Graph builder: turns parsed blocks into typed layer descriptors.

use std::path::Path;

use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::activation::leaky_relu;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use yolo_types::{Anchor, BOX_FIELDS};

use crate::cfg::{DarknetConfig, LayerSpec};
use crate::error::{ModelError, Result};

/// Negative slope of the leaky activation.
pub const LEAKY_SLOPE: f64 = 0.1;

/// Global settings from the `[net]` block.
///
/// `anchors` is the pool shared by every detection head; the builder fills
/// it from the first `[yolo]` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMeta {
    /// Input height in pixels.
    pub height: usize,
    /// Input width in pixels.
    pub width: usize,
    /// Input channel count.
    pub channels: usize,
    /// Batch size the network was described with.
    pub batch: usize,
    /// Shared anchor pool.
    pub anchors: Vec<Anchor>,
}

impl NetworkMeta {
    /// Reads metadata from the first block.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedConfig`] if `height` is missing or any
    /// dimension is zero.
    pub fn from_spec(spec: &LayerSpec) -> Result<Self> {
        let height: usize = spec.required("height")?;
        let width = spec.optional("width")?.unwrap_or(height);
        let channels = spec.optional("channels")?.unwrap_or(3);
        let batch = spec.optional("batch")?.unwrap_or(1);

        if height == 0 || width == 0 || channels == 0 || batch == 0 {
            return Err(ModelError::malformed_config(
                spec.line(),
                "input dimensions must be non-zero",
            ));
        }

        Ok(Self {
            height,
            width,
            channels,
            batch,
            anchors: Vec::new(),
        })
    }

    /// Input shape `[batch, channels, height, width]` for `batch` images.
    #[must_use]
    pub const fn input_dims(&self, batch: usize) -> [usize; 4] {
        [batch, self.channels, self.height, self.width]
    }
}

/// Convolution activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Leaky rectifier with slope [`LEAKY_SLOPE`].
    Leaky,
    /// Identity.
    #[default]
    Linear,
}

impl Activation {
    /// Applies the activation.
    pub fn apply<B: Backend, const D: usize>(self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Leaky => leaky_relu(x, LEAKY_SLOPE),
            Self::Linear => x,
        }
    }

    fn from_spec(spec: &LayerSpec) -> Result<Self> {
        match spec.get("activation").unwrap_or("linear") {
            "leaky" => Ok(Self::Leaky),
            "linear" => Ok(Self::Linear),
            other => Err(ModelError::malformed_config(
                spec.line(),
                format!("unsupported activation `{other}`"),
            )),
        }
    }
}

/// Resolved parameters of a `[convolutional]` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionalLayer {
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub filters: usize,
    /// Square kernel size.
    pub size: usize,
    /// Stride in both directions.
    pub stride: usize,
    /// Zero padding on every side.
    pub padding: usize,
    /// Whether batch normalization follows (and replaces the conv bias).
    pub batch_normalize: bool,
    /// Activation after normalization.
    pub activation: Activation,
}

impl ConvolutionalLayer {
    /// Convolution weight shape `[filters, in_channels, size, size]`.
    #[must_use]
    pub const fn weight_shape(&self) -> [usize; 4] {
        [self.filters, self.in_channels, self.size, self.size]
    }

    /// Number of convolution weight values.
    #[must_use]
    pub const fn weight_count(&self) -> usize {
        self.filters * self.in_channels * self.size * self.size
    }

    /// Number of floats this layer reads from a weight file.
    #[must_use]
    pub const fn parameter_count(&self) -> usize {
        let shift = if self.batch_normalize {
            4 * self.filters
        } else {
            self.filters
        };
        shift + self.weight_count()
    }
}

/// Residual sum of the previous output and an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutLayer {
    /// Reference as written.
    pub from: isize,
    /// Resolved absolute source index.
    pub source: usize,
}

/// Bilinear spatial resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsampleLayer {
    /// Integer scale factor.
    pub scale: usize,
}

/// Channel concatenation of earlier outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLayer {
    /// Resolved absolute source indices, in listed order.
    pub sources: Vec<usize>,
}

/// Detection head marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoloLayer {
    /// Indices into the shared anchor pool.
    pub mask: Vec<usize>,
    /// The selected anchors, in mask order.
    pub anchors: Vec<Anchor>,
    /// Number of classes.
    pub classes: usize,
}

impl YoloLayer {
    /// Values per decoded row.
    #[must_use]
    pub const fn row_width(&self) -> usize {
        BOX_FIELDS + self.classes
    }
}

/// Executable form of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerDescriptor {
    /// `[convolutional]`
    Convolutional(ConvolutionalLayer),
    /// `[shortcut]`
    Shortcut(ShortcutLayer),
    /// `[upsample]`
    Upsample(UpsampleLayer),
    /// `[route]`
    Route(RouteLayer),
    /// `[yolo]`
    Yolo(YoloLayer),
}

impl LayerDescriptor {
    /// Block name of this layer.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Convolutional(_) => "convolutional",
            Self::Shortcut(_) => "shortcut",
            Self::Upsample(_) => "upsample",
            Self::Route(_) => "route",
            Self::Yolo(_) => "yolo",
        }
    }
}

/// Resolves a route/shortcut reference written at layer `index`.
///
/// Negative references are relative (`index + raw`), others absolute. The
/// result must name an already-built layer, i.e. lie in `0..index`.
///
/// # Errors
///
/// Returns [`ModelError::DanglingReference`] when the resolved index is out
/// of range.
///
/// # Example
///
/// ```
/// use yolo_models::resolve_reference;
///
/// assert_eq!(resolve_reference(10, -4).ok(), Some(6));
/// assert_eq!(resolve_reference(10, 3).ok(), Some(3));
/// assert!(resolve_reference(10, -11).is_err());
/// assert!(resolve_reference(10, 10).is_err());
/// ```
pub fn resolve_reference(index: usize, raw: isize) -> Result<usize> {
    let current = isize::try_from(index).unwrap_or(isize::MAX);
    let resolved = if raw < 0 {
        current.saturating_add(raw)
    } else {
        raw
    };
    usize::try_from(resolved)
        .ok()
        .filter(|&r| r < index)
        .ok_or_else(|| ModelError::dangling_reference(index, raw, resolved))
}

/// An immutable, fully resolved network graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DarknetGraph {
    meta: NetworkMeta,
    layers: Vec<LayerDescriptor>,
    channels: Vec<usize>,
}

impl DarknetGraph {
    /// Builds the graph from a parsed description.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`] found while resolving the blocks in
    /// order.
    pub fn build(config: &DarknetConfig) -> Result<Self> {
        let mut meta = NetworkMeta::from_spec(config.net())?;
        let mut layers = Vec::with_capacity(config.layers().len());
        let mut channels: Vec<usize> = Vec::with_capacity(config.layers().len());
        let mut prev = meta.channels;

        for (index, spec) in config.layers().iter().enumerate() {
            let (layer, out) = match spec.kind() {
                "convolutional" => {
                    let conv = build_convolutional(spec, prev)?;
                    (LayerDescriptor::Convolutional(conv), conv.filters)
                }
                "shortcut" => {
                    let shortcut = build_shortcut(spec, index, &channels)?;
                    (LayerDescriptor::Shortcut(shortcut), prev)
                }
                "upsample" => {
                    let scale = spec.optional("stride")?.unwrap_or(2);
                    if scale == 0 {
                        return Err(ModelError::malformed_config(
                            spec.line(),
                            "upsample stride must be positive",
                        ));
                    }
                    (LayerDescriptor::Upsample(UpsampleLayer { scale }), prev)
                }
                "route" => {
                    let route = build_route(spec, index)?;
                    let out = route.sources.iter().map(|&s| channels[s]).sum();
                    (LayerDescriptor::Route(route), out)
                }
                "yolo" => {
                    let yolo = build_yolo(spec, index, prev, &mut meta.anchors)?;
                    (LayerDescriptor::Yolo(yolo), prev)
                }
                other => return Err(ModelError::unknown_layer_type(index, other)),
            };

            debug!(index, kind = layer.kind(), channels = out, "built layer");
            layers.push(layer);
            channels.push(out);
            prev = out;
        }

        if !layers.iter().any(|l| matches!(l, LayerDescriptor::Yolo(_))) {
            return Err(ModelError::malformed_config(
                config.net().line(),
                "network has no [yolo] detection layer",
            ));
        }

        let graph = Self {
            meta,
            layers,
            channels,
        };
        info!(
            layers = graph.len(),
            convolutions = graph.num_convolutional(),
            parameters = graph.parameter_count(),
            "built darknet graph"
        );
        Ok(graph)
    }

    /// Parses and builds a graph from description text.
    ///
    /// # Errors
    ///
    /// Returns parse or build errors.
    pub fn parse(text: &str) -> Result<Self> {
        Self::build(&DarknetConfig::parse(text)?)
    }

    /// Reads, parses and builds a graph from a description file.
    ///
    /// # Errors
    ///
    /// Returns I/O, parse or build errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(&DarknetConfig::from_file(path)?)
    }

    /// Network metadata.
    #[must_use]
    pub const fn meta(&self) -> &NetworkMeta {
        &self.meta
    }

    /// Layer descriptors in execution order.
    #[must_use]
    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    /// Output channel count recorded for each layer.
    #[must_use]
    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false for a built graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Convolutional layers with their layer index, in order.
    pub fn convolutional_layers(&self) -> impl Iterator<Item = (usize, &ConvolutionalLayer)> {
        self.layers.iter().enumerate().filter_map(|(i, l)| match l {
            LayerDescriptor::Convolutional(conv) => Some((i, conv)),
            _ => None,
        })
    }

    /// Detection heads with their layer index, in order.
    pub fn yolo_layers(&self) -> impl Iterator<Item = (usize, &YoloLayer)> {
        self.layers.iter().enumerate().filter_map(|(i, l)| match l {
            LayerDescriptor::Yolo(yolo) => Some((i, yolo)),
            _ => None,
        })
    }

    /// Number of convolutional layers.
    #[must_use]
    pub fn num_convolutional(&self) -> usize {
        self.convolutional_layers().count()
    }

    /// Number of floats a matching weight file carries after its header.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.convolutional_layers()
            .map(|(_, conv)| conv.parameter_count())
            .sum()
    }
}

fn build_convolutional(spec: &LayerSpec, in_channels: usize) -> Result<ConvolutionalLayer> {
    let filters: usize = spec.required("filters")?;
    let size: usize = spec.required("size")?;
    let stride: usize = spec.optional("stride")?.unwrap_or(1);
    let pad: u8 = spec.optional("pad")?.unwrap_or(0);
    let batch_normalize: u8 = spec.optional("batch_normalize")?.unwrap_or(0);

    if filters == 0 || size == 0 || stride == 0 {
        return Err(ModelError::malformed_config(
            spec.line(),
            "filters, size and stride must be positive",
        ));
    }

    Ok(ConvolutionalLayer {
        in_channels,
        filters,
        size,
        stride,
        padding: if pad != 0 { size / 2 } else { 0 },
        batch_normalize: batch_normalize != 0,
        activation: Activation::from_spec(spec)?,
    })
}

fn build_shortcut(spec: &LayerSpec, index: usize, channels: &[usize]) -> Result<ShortcutLayer> {
    let from: isize = spec.required("from")?;
    let source = resolve_reference(index, from)?;
    let previous = index
        .checked_sub(1)
        .ok_or_else(|| ModelError::dangling_reference(index, -1, -1))?;

    if channels[previous] != channels[source] {
        return Err(ModelError::shape_mismatch(
            index,
            format!("{} channels from layer {previous}", channels[previous]),
            format!("{} channels from layer {source}", channels[source]),
        ));
    }

    Ok(ShortcutLayer { from, source })
}

fn build_route(spec: &LayerSpec, index: usize) -> Result<RouteLayer> {
    let raw: Vec<isize> = spec.list("layers")?.unwrap_or_default();
    if raw.is_empty() {
        return Err(ModelError::malformed_config(
            spec.line(),
            "[route] needs at least one entry in `layers`",
        ));
    }
    let sources = raw
        .into_iter()
        .map(|r| resolve_reference(index, r))
        .collect::<Result<Vec<_>>>()?;
    Ok(RouteLayer { sources })
}

fn build_yolo(
    spec: &LayerSpec,
    index: usize,
    in_channels: usize,
    pool: &mut Vec<Anchor>,
) -> Result<YoloLayer> {
    if let Some(flat) = spec.list::<f32>("anchors")? {
        let anchors = Anchor::from_flat(&flat).ok_or_else(|| {
            ModelError::malformed_config(spec.line(), "`anchors` must hold width,height pairs")
        })?;
        if pool.is_empty() {
            *pool = anchors;
        } else if *pool != anchors {
            return Err(ModelError::malformed_config(
                spec.line(),
                "detection heads declare different anchor pools",
            ));
        }
    }
    if pool.is_empty() {
        return Err(ModelError::malformed_config(
            spec.line(),
            "[yolo] needs `anchors`",
        ));
    }

    let mask: Vec<usize> = spec
        .list("mask")?
        .unwrap_or_else(|| (0..pool.len()).collect());
    if mask.is_empty() {
        return Err(ModelError::malformed_config(spec.line(), "`mask` is empty"));
    }
    let anchors = mask
        .iter()
        .map(|&m| {
            pool.get(m).copied().ok_or_else(|| {
                ModelError::malformed_config(
                    spec.line(),
                    format!("mask index {m} outside anchor pool of {}", pool.len()),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let per_anchor = in_channels / mask.len();
    let classes = match spec.optional::<usize>("classes")? {
        Some(classes) => classes,
        None if per_anchor >= BOX_FIELDS => per_anchor - BOX_FIELDS,
        None => 0,
    };
    let expected = mask.len() * (BOX_FIELDS + classes);
    if expected != in_channels {
        return Err(ModelError::shape_mismatch(
            index,
            format!("{expected} channels ({} anchors x {} values)", mask.len(), BOX_FIELDS + classes),
            format!("{in_channels} channels"),
        ));
    }

    Ok(YoloLayer {
        mask,
        anchors,
        classes,
    })
}
