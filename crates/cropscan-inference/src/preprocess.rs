//! Image decoding and tensor preprocessing.
//!
//! Uploaded images of any size and colour mode are converted to the fixed
//! NCHW layout the classification networks were trained on:
//! RGB, 380x380, scaled to [0, 1], then normalized per channel with the
//! ImageNet statistics.

use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::error::{InferenceError, InferenceResult};

/// Input resolution of the EfficientNet-B4 classifiers.
pub const IMAGE_SIZE: u32 = 380;

/// ImageNet normalization mean values (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std values (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    /// Square side length the image is resized to.
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

/// Normalized image batch of shape `[1, 3, H, W]`.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn new(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// All-zero input of the given square size, used to check a network's output length.
    pub fn zeros(image_size: u32) -> Self {
        let side = image_size as usize;
        Self::new(Array4::zeros((1, 3, side, side)))
    }

    /// Tensor shape as `[N, C, H, W]`.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn view(&self) -> &Array4<f32> {
        &self.data
    }

    /// Flatten into a contiguous row-major buffer.
    pub fn into_raw(self) -> (Vec<usize>, Vec<f32>) {
        let shape = self.data.shape().to_vec();
        let data = if self.data.is_standard_layout() {
            self.data.into_raw_vec()
        } else {
            self.data.iter().copied().collect()
        };
        (shape, data)
    }
}

/// Converts raw upload bytes into network input tensors.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode, resize and normalize an encoded image.
    pub fn preprocess(&self, bytes: &[u8]) -> InferenceResult<ImageTensor> {
        if bytes.is_empty() {
            return Err(InferenceError::invalid_image("empty upload"));
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| InferenceError::invalid_image(e.to_string()))?;

        // Drops alpha and expands grayscale/palette modes.
        let rgb = decoded.to_rgb8();

        let size = self.config.image_size;
        let resized = imageops::resize(&rgb, size, size, FilterType::Triangle);

        let mean = self.config.mean;
        let std = self.config.std;
        let side = size as usize;
        let data = Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        });

        Ok(ImageTensor::new(data))
    }
}
