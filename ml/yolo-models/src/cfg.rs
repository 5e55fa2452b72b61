//! Darknet architecture description parser.
//!
//! The format is INI-like: a `[type]` header opens a block and the
//! `key = value` lines that follow belong to it. The first block is the
//! network metadata (`[net]`); every later block is one layer.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ModelError, Result};

/// One parsed block: a type tag plus its string options.
///
/// # Example
///
/// ```
/// use yolo_models::LayerSpec;
///
/// let spec = LayerSpec::new("convolutional", 1)
///     .with_option("filters", "32")
///     .with_option("size", "3");
///
/// assert_eq!(spec.kind(), "convolutional");
/// assert_eq!(spec.required::<usize>("filters").ok(), Some(32));
/// assert_eq!(spec.optional::<usize>("stride").ok(), Some(None));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    kind: String,
    line: usize,
    options: BTreeMap<String, String>,
}

impl LayerSpec {
    /// Creates an empty block of the given type, opened at `line`.
    #[must_use]
    pub fn new(kind: impl Into<String>, line: usize) -> Self {
        Self {
            kind: kind.into(),
            line,
            options: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) an option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an option; the last assignment of a key wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    /// The bracketed block type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 1-based line of the block header.
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Raw option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a required option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedConfig`] when the key is missing or its
    /// value does not parse.
    pub fn required<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)?.ok_or_else(|| {
            ModelError::malformed_config(
                self.line,
                format!("[{}] is missing required key `{key}`", self.kind),
            )
        })
    }

    /// Parses an option that may be absent.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedConfig`] when the value does not parse.
    pub fn optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| self.parse_value(key, raw))
            .transpose()
    }

    /// Parses a comma-separated list option that may be absent.
    ///
    /// Empty items (e.g. a trailing comma) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedConfig`] when any item does not parse.
    pub fn list<T>(&self, key: &str) -> Result<Option<Vec<T>>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| self.parse_value(key, item))
                    .collect::<Result<Vec<T>>>()
            })
            .transpose()
    }

    fn parse_value<T>(&self, key: &str, raw: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        raw.parse().map_err(|e: T::Err| {
            ModelError::malformed_config(
                self.line,
                format!("[{}] key `{key}` has invalid value `{raw}`: {e}", self.kind),
            )
        })
    }
}

/// A parsed architecture description: the metadata block plus the layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DarknetConfig {
    net: LayerSpec,
    layers: Vec<LayerSpec>,
}

impl DarknetConfig {
    /// Parses an architecture description from text.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MalformedConfig`] when an option appears before
    /// any header, an option line has no `=`, a header is not closed, or the
    /// text holds no block at all.
    pub fn parse(text: &str) -> Result<Self> {
        let mut blocks: Vec<LayerSpec> = Vec::new();

        for (number, raw_line) in text.lines().enumerate() {
            let line_no = number + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let kind = header.strip_suffix(']').ok_or_else(|| {
                    ModelError::malformed_config(line_no, format!("unterminated header `{line}`"))
                })?;
                blocks.push(LayerSpec::new(kind.trim(), line_no));
                continue;
            }

            let block = blocks.last_mut().ok_or_else(|| {
                ModelError::malformed_config(line_no, "option appears before any [block] header")
            })?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                ModelError::malformed_config(line_no, format!("expected `key=value`, got `{line}`"))
            })?;
            block.insert(key.trim(), value.trim());
        }

        let mut blocks = blocks.into_iter();
        let net = blocks
            .next()
            .ok_or_else(|| ModelError::malformed_config(0, "description contains no blocks"))?;
        let layers: Vec<LayerSpec> = blocks.collect();

        debug!(net = net.kind(), layers = layers.len(), "parsed architecture description");
        Ok(Self { net, layers })
    }

    /// Reads and parses an architecture description file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the file cannot be read, otherwise the
    /// errors of [`DarknetConfig::parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Assembles a description from already-built blocks.
    #[must_use]
    pub const fn from_parts(net: LayerSpec, layers: Vec<LayerSpec>) -> Self {
        Self { net, layers }
    }

    /// The metadata block.
    #[must_use]
    pub const fn net(&self) -> &LayerSpec {
        &self.net
    }

    /// The layer blocks, in order.
    #[must_use]
    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }
}

impl FromStr for DarknetConfig {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
