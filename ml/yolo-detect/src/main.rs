//! Darknet YOLO detection driver.
//!
//! Builds a network from a `.cfg` description, loads its weights, runs one
//! image through it and prints the surviving detections as JSON lines.
//!
//! # Usage
//!
//! - `yolo-detect --cfg yolov3.cfg --weights yolov3.weights --image dog.jpg`
//! - `yolo-detect --cfg yolov3.cfg --weights yolov3.weights --convert yolov3.bin`
//!
//! Logging goes to stderr; `RUST_LOG` selects the level (default `info`),
//! `-v` forces `debug`.

mod input;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use burn::tensor::Tensor;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yolo_models::{CheckpointFormat, Darknet, save_checkpoint};
use yolo_postprocess::{SuppressionConfig, postprocess};
use yolo_types::Detection;

type Backend = NdArray<f32>;

/// Darknet YOLO object detection
#[derive(Parser)]
#[command(name = "yolo-detect")]
#[command(about = "Run a Darknet YOLO network on an image", long_about = None)]
#[command(version)]
struct Cli {
    /// Architecture description (.cfg)
    #[arg(long)]
    cfg: PathBuf,

    /// Weights: Darknet .weights, or a converted .bin/.json checkpoint
    #[arg(long)]
    weights: PathBuf,

    /// Image to run on; an all-zero input is used when omitted
    #[arg(long)]
    image: Option<PathBuf>,

    /// Objectness threshold (overrides --config)
    #[arg(long)]
    confidence: Option<f32>,

    /// Suppression IoU threshold (overrides --config)
    #[arg(long)]
    iou: Option<f32>,

    /// JSON file with `confidence_threshold` / `iou_threshold`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the loaded parameters to this checkpoint and exit
    #[arg(long)]
    convert: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let device = NdArrayDevice::default();
    let model = Darknet::<Backend>::from_files(&cli.cfg, &cli.weights, &device)
        .with_context(|| format!("loading {}", cli.weights.display()))?;

    if let Some(out) = &cli.convert {
        return convert(&model, out);
    }

    let config = suppression_config(&cli)?;
    let meta = model.graph().meta();
    let input = match &cli.image {
        Some(path) => input::load_image::<Backend>(path, meta, &device)?,
        None => Tensor::zeros(meta.input_dims(1), &device),
    };

    let rows = model.infer(input)?;
    let detections = match rows.first() {
        Some(rows) => postprocess(rows, &config)?,
        None => Vec::new(),
    };
    if detections.is_empty() {
        info!("no detections");
    }
    print_detections(&detections)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn suppression_config(cli: &Cli) -> Result<SuppressionConfig> {
    let mut config = match &cli.config {
        Some(path) => SuppressionConfig::from_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => SuppressionConfig::default(),
    };
    if let Some(confidence) = cli.confidence {
        config = config.with_confidence_threshold(confidence);
    }
    if let Some(iou) = cli.iou {
        config = config.with_iou_threshold(iou);
    }
    config.validate()?;
    Ok(config)
}

fn convert(model: &Darknet<Backend>, out: &Path) -> Result<()> {
    let format = CheckpointFormat::from_path(out)
        .ok_or_else(|| anyhow!("cannot infer checkpoint format from {}", out.display()))?;
    let written = save_checkpoint(model.params(), model.graph(), out, format)?;
    info!(path = %written.display(), %format, "converted weights");
    Ok(())
}

fn print_detections(detections: &[Detection]) -> Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    for detection in detections {
        serde_json::to_writer(&mut out, detection)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
