//! Image preprocessing for classifier input
//!
//! Decode to RGB, resize to the classifier's square resolution with an antialiased
//! bilinear filter (`FilterType::Triangle`, the training-time policy), scale
//! to `[0, 1]`, normalize per channel and lay out as `[1, 3, H, W]`.

use crate::model_loader::candle_message;
use crate::spec::{ClassifierSpec, Normalization};
use candle_core::{Device, Tensor};
use fruitscan_core::{Error, Result};
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};

/// Resize filter used for every classifier
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Where the image bytes come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Decode a source into an RGB pixel grid
pub fn decode(source: &ImageSource) -> Result<RgbImage> {
    let image = match source {
        ImageSource::Path(path) => ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| Error::image_decode(format!("cannot read {}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| Error::image_decode(format!("cannot decode {}: {}", path.display(), e)))?,
        ImageSource::Bytes(bytes) => image::load_from_memory(bytes)
            .map_err(|e| Error::image_decode(format!("cannot decode image buffer: {}", e)))?,
    };

    Ok(image.to_rgb8())
}

/// Decode and convert a source into the tensor `spec` expects
pub fn prepare(source: &ImageSource, spec: &ClassifierSpec, device: &Device) -> Result<Tensor> {
    let rgb = decode(source)?;
    prepare_rgb(&rgb, spec, device)
}

/// Convert an already decoded image into the tensor `spec` expects
pub fn prepare_rgb(rgb: &RgbImage, spec: &ClassifierSpec, device: &Device) -> Result<Tensor> {
    let side = spec.resolution;
    let resized = if rgb.dimensions() == (side, side) {
        rgb.clone()
    } else {
        image::imageops::resize(rgb, side, side, RESIZE_FILTER)
    };

    let data = normalize_chw(&resized, &spec.normalization);
    Tensor::from_vec(data, spec.input_dims().to_vec(), device).map_err(|e| {
        Error::internal(format!("Failed to create input tensor: {}", candle_message(&e)))
    })
}

/// Planar CHW floats, `(x / 255 - mean[c]) / std[c]`
pub fn normalize_chw(image: &RgbImage, norm: &Normalization) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (i, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            let x = f32::from(pixel[c]) / 255.0;
            data[c * plane + i] = (x - norm.mean[c]) / norm.std[c];
        }
    }

    data
}
