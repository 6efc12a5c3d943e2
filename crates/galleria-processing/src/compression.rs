use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::error::ProcessingError;

/// Output format for generated derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, ProcessingError> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(ProcessingError::UnsupportedFormat(s.to_string())),
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn to_image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// Encodes decoded pictures into derivative bytes.
pub struct DerivativeEncoder;

impl DerivativeEncoder {
    /// `quality` is a ratio in `(0, 1]`; PNG ignores it.
    pub fn encode(
        img: &DynamicImage,
        format: OutputFormat,
        quality: f32,
    ) -> Result<Bytes, ProcessingError> {
        let quality = quality.clamp(0.01, 1.0);
        match format {
            OutputFormat::Jpeg => Self::encode_jpeg(img, quality),
            OutputFormat::Png => Self::encode_png(img),
            OutputFormat::WebP => Self::encode_webp(img, quality),
        }
    }

    fn encode_jpeg(img: &DynamicImage, quality: f32) -> Result<Bytes, ProcessingError> {
        // JPEG has no alpha channel
        let rgb_img = img.to_rgb8();
        let mut buffer = Vec::new();
        {
            let mut encoder =
                JpegEncoder::new_with_quality(&mut buffer, (quality * 100.0).round() as u8);
            encoder
                .encode_image(&rgb_img)
                .map_err(|e| ProcessingError::Encode {
                    format: "jpeg",
                    message: e.to_string(),
                })?;
        }
        Ok(Bytes::from(buffer))
    }

    fn encode_png(img: &DynamicImage) -> Result<Bytes, ProcessingError> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        img.write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| ProcessingError::Encode {
                format: "png",
                message: e.to_string(),
            })?;

        Ok(Bytes::from(buffer))
    }

    fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Bytes, ProcessingError> {
        let (width, height) = img.dimensions();

        // Convert to RGBA for WebP encoding
        let rgba_img = img.to_rgba8();

        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(quality * 100.0);

        Ok(Bytes::copy_from_slice(&webp_data))
    }
}
