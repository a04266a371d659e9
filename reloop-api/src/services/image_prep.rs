//! Photo normalization before classification
//!
//! Any decodable upload becomes a JPEG no larger than 1024×1024.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use std::io::Cursor;
use thiserror::Error;

use super::gemini::InlineImage;

pub const MAX_DIMENSION: u32 = 1024;
pub const JPEG_QUALITY: u8 = 85;
const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ImagePrepError {
    #[error("Empty image upload")]
    Empty,

    #[error("Unsupported or corrupt image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Normalized photo ready for upload
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub base64: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    pub fn inline(&self) -> InlineImage {
        InlineImage {
            base64: self.base64.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Scale (w, h) to fit within `max`×`max`, preserving aspect ratio
///
/// Never upscales; each side is at least 1.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }

    if width >= height {
        let scaled = (height as u64 * max as u64 + width as u64 / 2) / width as u64;
        (max, (scaled as u32).max(1))
    } else {
        let scaled = (width as u64 * max as u64 + height as u64 / 2) / height as u64;
        ((scaled as u32).max(1), max)
    }
}

/// Decode, downscale and re-encode as JPEG
pub fn normalize_photo(bytes: &[u8]) -> Result<PreparedImage, ImagePrepError> {
    if bytes.is_empty() {
        return Err(ImagePrepError::Empty);
    }

    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImagePrepError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| ImagePrepError::Decode(e.to_string()))?;

    let (width, height) = fit_within(decoded.width(), decoded.height(), MAX_DIMENSION);
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, image::imageops::FilterType::Triangle)
    };

    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ImagePrepError::Encode(e.to_string()))?;

    Ok(PreparedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(&encoded),
        mime_type: JPEG_MIME.to_string(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 128]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(800, 600, 1024), (800, 600));
        assert_eq!(fit_within(4000, 3000, 1024), (1024, 768));
        assert_eq!(fit_within(3000, 4000, 1024), (768, 1024));
        assert_eq!(fit_within(5000, 1, 1024), (1024, 1));
        assert_eq!(fit_within(1024, 1024, 1024), (1024, 1024));
    }

    #[test]
    fn test_normalize_large_png() {
        let prepared = normalize_photo(&png_bytes(2048, 1024)).unwrap();
        assert_eq!((prepared.width, prepared.height), (1024, 512));
        assert_eq!(prepared.mime_type, "image/jpeg");
        assert!(prepared.data_url().starts_with("data:image/jpeg;base64,"));

        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(&prepared.base64)
            .unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_small_image_keeps_size() {
        let prepared = normalize_photo(&png_bytes(40, 30)).unwrap();
        assert_eq!((prepared.width, prepared.height), (40, 30));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(normalize_photo(&[]), Err(ImagePrepError::Empty)));
        assert!(matches!(
            normalize_photo(b"definitely not an image"),
            Err(ImagePrepError::Decode(_))
        ));
    }
}
