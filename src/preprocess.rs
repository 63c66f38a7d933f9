use candle_core::{Device, Tensor};
use image::{ImageBuffer, Rgba, imageops};

use crate::error::DetectionError;
use crate::pixel_buffer::PixelBuffer;

/// Model input edge length; the packaged ViT consumes 224x224 RGB.
pub const IMAGE_SIZE: usize = 224;

// The packaged model's image processor normalizes every channel with
// mean=0.5, std=0.5.
const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// Scales a raw RGBA8 buffer to the model input size and drops alpha.
///
/// Fails with `UnusableImage` when the buffer cannot back an image of the
/// claimed dimensions.
pub fn scale_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DetectionError> {
    if width == 0 || height == 0 {
        return Err(DetectionError::unusable(format!(
            "image dimensions {}x{} contain no pixels",
            width, height
        )));
    }
    if rgba.len() != PixelBuffer::expected_len(width, height) {
        return Err(DetectionError::unusable(format!(
            "expected {} RGBA bytes for {}x{}, got {}",
            PixelBuffer::expected_len(width, height),
            width,
            height,
            rgba.len()
        )));
    }

    let img: ImageBuffer<Rgba<u8>, _> = ImageBuffer::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| DetectionError::unusable("RGBA buffer does not match its dimensions"))?;

    let resized = imageops::resize(
        &img,
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        imageops::FilterType::Triangle,
    );

    let mut rgb = Vec::with_capacity(IMAGE_SIZE * IMAGE_SIZE * 3);
    for pixel in resized.pixels() {
        rgb.push(pixel[0]);
        rgb.push(pixel[1]);
        rgb.push(pixel[2]);
    }

    Ok(rgb)
}

/// Builds the (1, 3, 224, 224) CHW input tensor from a scaled RGB buffer.
pub fn to_tensor(rgb: &[u8], device: &Device) -> candle_core::Result<Tensor> {
    debug_assert_eq!(rgb.len(), 3 * IMAGE_SIZE * IMAGE_SIZE);

    let mut data = vec![0f32; 3 * IMAGE_SIZE * IMAGE_SIZE];
    for i in 0..(IMAGE_SIZE * IMAGE_SIZE) {
        let r = rgb[i * 3] as f32 / 255.0;
        let g = rgb[i * 3 + 1] as f32 / 255.0;
        let b = rgb[i * 3 + 2] as f32 / 255.0;

        // CHW format with normalization
        data[i] = (r - MEAN) / STD;
        data[IMAGE_SIZE * IMAGE_SIZE + i] = (g - MEAN) / STD;
        data[2 * IMAGE_SIZE * IMAGE_SIZE + i] = (b - MEAN) / STD;
    }

    Tensor::from_vec(data, (1, 3, IMAGE_SIZE, IMAGE_SIZE), device)
}
