use image::RgbaImage;

/// Raw uncompressed RGBA8 frame, e.g. a camera or video frame.
///
/// Feeding one of these to the detector skips image-container decoding
/// entirely and goes straight to inference.
#[derive(Clone)]
pub struct PixelBuffer {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PixelBuffer {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
        }
    }

    pub fn from_image(image: &RgbaImage) -> Self {
        Self {
            rgba: image.as_raw().clone(),
            width: image.width(),
            height: image.height(),
        }
    }

    /// Bytes a well-formed RGBA8 buffer of these dimensions must hold.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_len() {
        assert_eq!(PixelBuffer::expected_len(2, 3), 24);
        assert_eq!(PixelBuffer::expected_len(0, 100), 0);
    }

    #[test]
    fn test_from_image_copies_dimensions() {
        let image = RgbaImage::from_pixel(4, 2, image::Rgba([1, 2, 3, 255]));
        let buffer = PixelBuffer::from_image(&image);
        assert_eq!(buffer.width, 4);
        assert_eq!(buffer.height, 2);
        assert_eq!(buffer.rgba.len(), PixelBuffer::expected_len(4, 2));
    }
}
