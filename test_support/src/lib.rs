//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures for all crates

use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder, Rgb, RgbImage};

/// Encode a solid-color JPEG of the given dimensions for use as a test frame
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, 80);
    encoder
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .expect("encode test jpeg");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_is_decodable() {
        let jpeg = test_jpeg(32, 24);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }
}
