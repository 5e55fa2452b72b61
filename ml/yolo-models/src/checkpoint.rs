//! Parameter persistence in Darknet or Burn-native formats.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{BinFileRecorder, FullPrecisionSettings, PrettyJsonFileRecorder, Recorder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModelError, Result};
use crate::graph::DarknetGraph;
use crate::params::DarknetParams;
use crate::weights::{WeightHeader, load_weights, save_weights};

/// Supported checkpoint file formats.
///
/// # Example
///
/// ```
/// use yolo_models::CheckpointFormat;
///
/// assert_eq!(CheckpointFormat::from_extension("weights"), Some(CheckpointFormat::Darknet));
/// assert_eq!(CheckpointFormat::from_extension("bin"), Some(CheckpointFormat::Binary));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckpointFormat {
    /// Darknet `.weights` layout, see [`crate::read_weights`].
    #[default]
    Darknet,

    /// Burn's `BinFileRecorder` at full precision.
    Binary,

    /// Burn's `PrettyJsonFileRecorder`, for inspection.
    Json,
}

impl CheckpointFormat {
    /// Determines format from file extension.
    ///
    /// - `.weights` -> Darknet
    /// - `.bin` -> Binary
    /// - `.json` -> Json
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "weights" => Some(Self::Darknet),
            "bin" => Some(Self::Binary),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Determines format from file path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Darknet => "weights",
            Self::Binary => "bin",
            Self::Json => "json",
        }
    }

    /// Returns the format name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Darknet => "darknet",
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Saves `params` to `path`, replacing its extension with the format's.
///
/// Darknet output carries a default header (version 0.2.0, nothing seen).
///
/// # Returns
///
/// The path actually written.
///
/// # Errors
///
/// Returns `ModelError::SaveCheckpoint` if a recorder fails, or the errors
/// of [`save_weights`] for the Darknet format.
pub fn save_checkpoint<B: Backend>(
    params: &DarknetParams<B>,
    graph: &DarknetGraph,
    path: impl AsRef<Path>,
    format: CheckpointFormat,
) -> Result<PathBuf> {
    let full_path = path.as_ref().with_extension(format.extension());
    let shown = full_path.display().to_string();

    match format {
        CheckpointFormat::Darknet => {
            save_weights(&full_path, &WeightHeader::default(), graph, params)?;
        }
        CheckpointFormat::Binary => {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            recorder
                .record(params.clone().into_record(), full_path.clone())
                .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?;
        }
        CheckpointFormat::Json => {
            let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
            recorder
                .record(params.clone().into_record(), full_path.clone())
                .map_err(|e| ModelError::save_checkpoint(&shown, e.to_string()))?;
        }
    }

    info!(path = %shown, %format, "saved checkpoint");
    Ok(full_path)
}

/// Loads parameters for `graph` from `path`, choosing the format by extension.
///
/// # Errors
///
/// Returns `ModelError::CheckpointNotFound` if the file doesn't exist,
/// `ModelError::UnsupportedFormat` if the extension is unknown,
/// `ModelError::LoadCheckpoint` if a recorder fails, and
/// `ModelError::ShapeMismatch` if the stored parameters do not fit `graph`.
pub fn load_checkpoint<B: Backend>(
    graph: &DarknetGraph,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<DarknetParams<B>> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    if !path.exists() {
        return Err(ModelError::checkpoint_not_found(shown));
    }

    let format =
        CheckpointFormat::from_path(path).ok_or_else(|| ModelError::unsupported_format(&shown))?;

    let params = match format {
        CheckpointFormat::Darknet => return Ok(load_weights(path, graph, device)?.params),
        CheckpointFormat::Binary => {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            DarknetParams::init(graph, device)
                .load_file(path, &recorder, device)
                .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string()))?
        }
        CheckpointFormat::Json => {
            let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
            DarknetParams::init(graph, device)
                .load_file(path, &recorder, device)
                .map_err(|e| ModelError::load_checkpoint(&shown, e.to_string()))?
        }
    };

    params.validate(graph)?;
    Ok(params)
}
