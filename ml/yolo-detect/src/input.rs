//! Image loading into a network input tensor.

use std::path::Path;

use anyhow::{Context, Result, bail};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use yolo_models::NetworkMeta;

/// Loads an image, stretched to the network input size, as `[1, 3, H, W]`
/// RGB in `[0, 1]`.
pub fn load_image<B: Backend>(
    path: &Path,
    meta: &NetworkMeta,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    if meta.channels != 3 {
        bail!("image input needs a 3-channel network, got {}", meta.channels);
    }
    let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
    let width = u32::try_from(meta.width)?;
    let height = u32::try_from(meta.height)?;
    let rgb = resize(&img, width, height);
    Ok(Tensor::from_data(
        TensorData::new(to_chw(&rgb), [1, 3, meta.height, meta.width]),
        device,
    ))
}

fn resize(img: &DynamicImage, width: u32, height: u32) -> RgbImage {
    img.resize_exact(width, height, FilterType::Triangle).to_rgb8()
}

/// Planar `R..., G..., B...` values scaled to `[0, 1]`.
fn to_chw(rgb: &RgbImage) -> Vec<f32> {
    let plane = rgb.width() as usize * rgb.height() as usize;
    let mut values = vec![0.0_f32; plane * 3];
    for (i, pixel) in rgb.pixels().enumerate() {
        for (c, &channel) in pixel.0.iter().enumerate() {
            values[c * plane + i] = f32::from(channel) / 255.0;
        }
    }
    values
}
