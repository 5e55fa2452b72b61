//! Darknet binary weight files.
//!
//! Layout: five little-endian `i32` header words (major, minor, revision,
//! then the 64-bit "images seen" counter split low/high), followed by a flat
//! `f32` array. Each convolutional layer, in graph order, stores:
//!
//! - with batch normalization: `C` betas, `C` gammas, `C` running means,
//!   `C` running variances;
//! - without: `C` convolution biases;
//! - then `filters * in_channels * size * size` convolution weights.
//!
//! The file must end exactly after the last layer.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ModelError, Result};
use crate::graph::DarknetGraph;
use crate::params::{DarknetParams, NormValues};

/// Number of `i32` words in the header.
pub const HEADER_WORDS: usize = 5;

const WORD: usize = 4;

/// Weight file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightHeader {
    /// Major format version.
    pub major: i32,
    /// Minor format version.
    pub minor: i32,
    /// Revision.
    pub revision: i32,
    /// Images seen during training.
    pub seen: u64,
}

impl Default for WeightHeader {
    fn default() -> Self {
        Self {
            major: 0,
            minor: 2,
            revision: 0,
            seen: 0,
        }
    }
}

impl WeightHeader {
    /// Decodes the five header words.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
    pub const fn from_words(words: [i32; HEADER_WORDS]) -> Self {
        let low = words[3] as u32 as u64;
        let high = words[4] as u32 as u64;
        Self {
            major: words[0],
            minor: words[1],
            revision: words[2],
            seen: low | (high << 32),
        }
    }

    /// Encodes the header as five words.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn to_words(&self) -> [i32; HEADER_WORDS] {
        [
            self.major,
            self.minor,
            self.revision,
            self.seen as u32 as i32,
            (self.seen >> 32) as u32 as i32,
        ]
    }

    /// Major 0 or 1 with non-negative minor and revision.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        (self.major == 0 || self.major == 1) && self.minor >= 0 && self.revision >= 0
    }
}

/// Parameters read from a weight file, with its header.
#[derive(Debug, Clone)]
pub struct LoadedWeights<B: Backend> {
    /// File header.
    pub header: WeightHeader,
    /// Populated parameter store.
    pub params: DarknetParams<B>,
}

/// Reads a weight stream laid out for `graph`.
///
/// # Errors
///
/// - [`ModelError::TruncatedWeightFile`] if the stream ends early
/// - [`ModelError::VersionMismatch`] for an unsupported header
/// - [`ModelError::TrailingWeightData`] if bytes remain after the last layer
pub fn read_weights<B: Backend, R: Read>(
    mut reader: R,
    graph: &DarknetGraph,
    device: &B::Device,
) -> Result<LoadedWeights<B>> {
    let mut raw = [0_u8; HEADER_WORDS * WORD];
    reader
        .read_exact(&mut raw)
        .map_err(|e| truncated_or_io(e, "header", HEADER_WORDS))?;
    let mut words = [0_i32; HEADER_WORDS];
    for (word, bytes) in words.iter_mut().zip(raw.chunks_exact(WORD)) {
        *word = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    let header = WeightHeader::from_words(words);
    if !header.is_supported() {
        return Err(ModelError::version_mismatch(
            header.major,
            header.minor,
            header.revision,
        ));
    }
    debug!(?header, "read weight header");

    let mut params = DarknetParams::init(graph, device);
    for ((index, layer), block) in graph.convolutional_layers().zip(params.blocks_mut()) {
        let c = layer.filters;
        if layer.batch_normalize {
            let beta = read_vector(&mut reader, c, index, "beta", device)?;
            let gamma = read_vector(&mut reader, c, index, "gamma", device)?;
            let mean = read_vector(&mut reader, c, index, "running mean", device)?;
            let var = read_vector(&mut reader, c, index, "running variance", device)?;
            block.set_norm(NormValues {
                beta,
                gamma,
                mean,
                var,
            });
        } else {
            block.set_bias(read_vector(&mut reader, c, index, "bias", device)?);
        }

        let values = read_f32s(&mut reader, layer.weight_count(), index, "weights")?;
        block.set_weight(Tensor::from_data(
            TensorData::new(values, layer.weight_shape()),
            device,
        ));
    }

    let trailing = io::copy(&mut reader, &mut io::sink())?;
    if trailing > 0 {
        return Err(ModelError::trailing_weight_data(trailing));
    }

    info!(
        version = %format!("{}.{}.{}", header.major, header.minor, header.revision),
        seen = header.seen,
        values = graph.parameter_count(),
        "loaded darknet weights"
    );
    Ok(LoadedWeights { header, params })
}

/// Opens and reads a weight file, see [`read_weights`].
///
/// # Errors
///
/// Returns [`ModelError::Io`] if the file cannot be opened, otherwise the
/// errors of [`read_weights`].
pub fn load_weights<B: Backend>(
    path: impl AsRef<Path>,
    graph: &DarknetGraph,
    device: &B::Device,
) -> Result<LoadedWeights<B>> {
    let file = File::open(path.as_ref())?;
    read_weights(BufReader::new(file), graph, device)
}

/// Writes `params` in the weight file layout.
///
/// # Errors
///
/// Returns [`ModelError::ShapeMismatch`] if `params` does not fit `graph`,
/// [`ModelError::Serialization`] if tensor data cannot be read back and
/// [`ModelError::Io`] on write failure.
pub fn write_weights<B: Backend, W: Write>(
    mut writer: W,
    header: &WeightHeader,
    graph: &DarknetGraph,
    params: &DarknetParams<B>,
) -> Result<()> {
    params.validate(graph)?;

    for word in header.to_words() {
        writer.write_all(&word.to_le_bytes())?;
    }
    for block in params.blocks() {
        if let Some(norm) = block.norm() {
            write_tensor(&mut writer, norm.beta)?;
            write_tensor(&mut writer, norm.gamma)?;
            write_tensor(&mut writer, norm.mean)?;
            write_tensor(&mut writer, norm.var)?;
        } else if let Some(bias) = block.bias() {
            write_tensor(&mut writer, bias)?;
        }
        write_tensor(&mut writer, block.weight())?;
    }
    writer.flush()?;
    Ok(())
}

/// Creates (or truncates) `path` and writes `params` to it.
///
/// # Errors
///
/// See [`write_weights`].
pub fn save_weights<B: Backend>(
    path: impl AsRef<Path>,
    header: &WeightHeader,
    graph: &DarknetGraph,
    params: &DarknetParams<B>,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_weights(BufWriter::new(file), header, graph, params)
}

/// Reads `count` values; the buffer grows only as far as the stream goes.
fn read_f32s<R: Read>(reader: &mut R, count: usize, layer: usize, part: &str) -> Result<Vec<f32>> {
    let section = || format!("layer {layer} {part}");
    let expected = count * WORD;
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(u64::try_from(expected).unwrap_or(u64::MAX))
        .read_to_end(&mut bytes)
        .map_err(|e| truncated_or_io(e, &section(), count))?;
    if bytes.len() < expected {
        return Err(ModelError::truncated_weight_file(section(), count));
    }
    Ok(bytes
        .chunks_exact(WORD)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn read_vector<B: Backend, R: Read>(
    reader: &mut R,
    count: usize,
    layer: usize,
    part: &str,
    device: &B::Device,
) -> Result<Tensor<B, 1>> {
    let values = read_f32s(reader, count, layer, part)?;
    Ok(Tensor::from_data(TensorData::new(values, [count]), device))
}

fn write_tensor<B: Backend, const D: usize, W: Write>(
    writer: &mut W,
    tensor: Tensor<B, D>,
) -> Result<()> {
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ModelError::serialization(format!("{e:?}")))?;
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn truncated_or_io(err: io::Error, section: &str, expected: usize) -> ModelError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ModelError::truncated_weight_file(section, expected)
    } else {
        err.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use std::io::Cursor;

    type TestBackend = NdArray<f32>;

    const NET: &str = "
[net]
height=8

[convolutional]
batch_normalize=1
filters=2
size=3
pad=1
activation=leaky

[convolutional]
filters=6
size=1

[yolo]
anchors=2,2
";

    fn encode(header: [i32; HEADER_WORDS], values: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in header {
            bytes.extend(word.to_le_bytes());
        }
        for value in values {
            bytes.extend(value.to_le_bytes());
        }
        bytes
    }

    #[allow(clippy::cast_precision_loss)]
    fn sequence(count: usize) -> Vec<f32> {
        (0..count).map(|i| i as f32 * 0.25 - 3.0).collect()
    }

    fn values<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn header_words_split_seen() {
        let header = WeightHeader::from_words([0, 2, 0, -1, 1]);
        assert_eq!(header.seen, (1_u64 << 32) | u64::from(u32::MAX));
        assert_eq!(header.to_words(), [0, 2, 0, -1, 1]);
    }

    #[test]
    fn header_version_bounds() {
        assert!(WeightHeader::default().is_supported());
        assert!(WeightHeader::from_words([1, 0, 0, 0, 0]).is_supported());
        assert!(!WeightHeader::from_words([2, 0, 0, 0, 0]).is_supported());
        assert!(!WeightHeader::from_words([0, -1, 0, 0, 0]).is_supported());
    }

    #[test]
    fn read_assigns_sections_in_order() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let count = graph.parameter_count();
        assert_eq!(count, (8 + 54) + (6 + 12));

        let data = sequence(count);
        let bytes = encode([0, 2, 0, 100, 0], &data);
        let loaded =
            read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &Default::default())
                .unwrap();
        assert_eq!(loaded.header.seen, 100);

        let blocks = loaded.params.blocks();
        let norm = blocks[0].norm().unwrap();
        assert_eq!(values(norm.beta), &data[0..2]);
        assert_eq!(values(norm.gamma), &data[2..4]);
        assert_eq!(values(norm.mean), &data[4..6]);
        assert_eq!(values(norm.var), &data[6..8]);
        assert_eq!(values(blocks[0].weight()), &data[8..62]);
        assert_eq!(values(blocks[1].bias().unwrap()), &data[62..68]);
        assert_eq!(values(blocks[1].weight()), &data[68..80]);
    }

    #[test]
    fn write_reproduces_bytes() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let bytes = encode([1, 0, 3, 7, 0], &sequence(graph.parameter_count()));
        let loaded =
            read_weights::<TestBackend, _>(Cursor::new(bytes.clone()), &graph, &Default::default())
                .unwrap();

        let mut out = Vec::new();
        write_weights(&mut out, &loaded.header, &graph, &loaded.params).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn read_truncated_header() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let err = read_weights::<TestBackend, _>(
            Cursor::new(vec![0_u8; 7]),
            &graph,
            &Default::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::TruncatedWeightFile { expected: 5, .. }));
    }

    #[test]
    fn read_truncated_oversized_layer() {
        let text = "[net]\nheight=8\n[convolutional]\nfilters=1024\nsize=3\n\
                    [convolutional]\nfilters=6\nsize=1\n[yolo]\nanchors=2,2\n";
        let graph = DarknetGraph::parse(text).unwrap();
        // biases present, weights cut after four values
        let bytes = encode([0, 2, 0, 0, 0], &sequence(1024 + 4));
        let err =
            read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &Default::default())
                .unwrap_err();
        match err {
            ModelError::TruncatedWeightFile { section, expected } => {
                assert_eq!(section, "layer 0 weights");
                assert_eq!(expected, 1024 * 3 * 9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn read_truncated_mid_layer() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let bytes = encode([0, 2, 0, 0, 0], &sequence(20));
        let err =
            read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &Default::default())
                .unwrap_err();
        match err {
            ModelError::TruncatedWeightFile { section, expected } => {
                assert_eq!(section, "layer 0 weights");
                assert_eq!(expected, 54);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn read_rejects_trailing_bytes() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let bytes = encode([0, 2, 0, 0, 0], &sequence(graph.parameter_count() + 3));
        let err =
            read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &Default::default())
                .unwrap_err();
        assert!(matches!(err, ModelError::TrailingWeightData { bytes: 12 }));
    }

    #[test]
    fn read_rejects_version() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let bytes = encode([9, 0, 0, 0, 0], &sequence(graph.parameter_count()));
        let err =
            read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &Default::default())
                .unwrap_err();
        assert!(matches!(
            err,
            ModelError::VersionMismatch {
                major: 9,
                minor: 0,
                revision: 0
            }
        ));
    }

    #[test]
    fn save_and_load_file() {
        let graph = DarknetGraph::parse(NET).unwrap();
        let device = Default::default();
        let bytes = encode([0, 2, 0, 0, 0], &sequence(graph.parameter_count()));
        let loaded = read_weights::<TestBackend, _>(Cursor::new(bytes), &graph, &device).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.weights");
        save_weights(&path, &loaded.header, &graph, &loaded.params).unwrap();

        let reloaded = load_weights::<TestBackend>(&path, &graph, &device).unwrap();
        assert_eq!(reloaded.header, loaded.header);
        assert_eq!(
            values(reloaded.params.blocks()[1].weight()),
            values(loaded.params.blocks()[1].weight())
        );
    }
}
