//! Derivative generation.
//!
//! Each derivative is produced independently from the decoded source so the
//! ingestion fan-out can run them as separate units.

use bytes::Bytes;
use galleria_core::{DerivativeConfig, DerivativeKind};
use image::GenericImageView;

use crate::compression::{DerivativeEncoder, OutputFormat};
use crate::error::ProcessingError;
use crate::probe::SourceImage;

#[derive(Debug, Clone)]
pub struct DerivativeSettings {
    pub thumbnail_max_edge: u32,
    pub thumbnail_min_source_bytes: usize,
    pub thumbnail_format: OutputFormat,
    pub default_compress_threshold_bytes: usize,
    pub default_compression_ratio: f32,
    pub default_format: OutputFormat,
}

impl DerivativeSettings {
    pub fn from_config(config: &DerivativeConfig) -> Result<Self, ProcessingError> {
        Ok(Self {
            thumbnail_max_edge: config.thumbnail_max_edge,
            thumbnail_min_source_bytes: config.thumbnail_min_source_bytes,
            thumbnail_format: OutputFormat::parse(&config.thumbnail_format)?,
            default_compress_threshold_bytes: config.default_compress_threshold_bytes,
            default_compression_ratio: config.default_compression_ratio,
            default_format: OutputFormat::parse(&config.default_format)?,
        })
    }
}

impl Default for DerivativeSettings {
    fn default() -> Self {
        Self {
            thumbnail_max_edge: 256,
            thumbnail_min_source_bytes: 20 * 1024,
            thumbnail_format: OutputFormat::WebP,
            default_compress_threshold_bytes: 512 * 1024,
            default_compression_ratio: 0.8,
            default_format: OutputFormat::WebP,
        }
    }
}

/// Bytes ready to be written to object storage.
#[derive(Debug, Clone)]
pub struct EncodedDerivative {
    pub kind: DerivativeKind,
    pub bytes: Bytes,
    pub extension: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    /// The source bytes were reused unchanged.
    pub passthrough: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DerivativeGenerator {
    settings: DerivativeSettings,
}

impl DerivativeGenerator {
    pub fn new(settings: DerivativeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DerivativeSettings {
        &self.settings
    }

    pub fn generate(
        &self,
        kind: DerivativeKind,
        source: &SourceImage,
    ) -> Result<EncodedDerivative, ProcessingError> {
        let start = std::time::Instant::now();
        let derivative = match kind {
            DerivativeKind::Thumbnail => self.thumbnail(source)?,
            DerivativeKind::Default => self.default_variant(source)?,
            DerivativeKind::Original => Self::passthrough(DerivativeKind::Original, source),
        };

        tracing::debug!(
            kind = %kind,
            passthrough = derivative.passthrough,
            width = derivative.width,
            height = derivative.height,
            size_bytes = derivative.bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Generated derivative"
        );

        Ok(derivative)
    }

    /// Longest edge bounded by `thumbnail_max_edge`; small sources pass through.
    pub fn thumbnail(&self, source: &SourceImage) -> Result<EncodedDerivative, ProcessingError> {
        if source.size_bytes() < self.settings.thumbnail_min_source_bytes {
            return Ok(Self::passthrough(DerivativeKind::Thumbnail, source));
        }

        let max_edge = self.settings.thumbnail_max_edge;
        let (width, height) = source.image.dimensions();
        let resized = if width.max(height) > max_edge {
            source.image.thumbnail(max_edge, max_edge)
        } else {
            source.image.clone()
        };

        let format = self.settings.thumbnail_format;
        let bytes = DerivativeEncoder::encode(
            &resized,
            format,
            self.settings.default_compression_ratio,
        )?;
        let (width, height) = resized.dimensions();

        Ok(EncodedDerivative {
            kind: DerivativeKind::Thumbnail,
            bytes,
            extension: format.extension().to_string(),
            content_type: format.to_mime_type().to_string(),
            width,
            height,
            passthrough: false,
        })
    }

    /// Re-encoded only when the source exceeds the compression threshold.
    pub fn default_variant(
        &self,
        source: &SourceImage,
    ) -> Result<EncodedDerivative, ProcessingError> {
        if source.size_bytes() <= self.settings.default_compress_threshold_bytes {
            return Ok(Self::passthrough(DerivativeKind::Default, source));
        }

        let format = self.settings.default_format;
        let bytes = DerivativeEncoder::encode(
            &source.image,
            format,
            self.settings.default_compression_ratio,
        )?;

        Ok(EncodedDerivative {
            kind: DerivativeKind::Default,
            bytes,
            extension: format.extension().to_string(),
            content_type: format.to_mime_type().to_string(),
            width: source.probe.width,
            height: source.probe.height,
            passthrough: false,
        })
    }

    fn passthrough(kind: DerivativeKind, source: &SourceImage) -> EncodedDerivative {
        let (extension, content_type) = source_file_type(&source.probe.format);
        EncodedDerivative {
            kind,
            bytes: source.bytes.clone(),
            extension,
            content_type,
            width: source.probe.width,
            height: source.probe.height,
            passthrough: true,
        }
    }
}

fn source_file_type(format: &str) -> (String, String) {
    match OutputFormat::parse(format) {
        Ok(output) => (
            output.extension().to_string(),
            output.to_mime_type().to_string(),
        ),
        Err(_) => (format.to_string(), format!("image/{}", format)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::decode_image;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    /// Noisy PNG so the encoded size is comfortably above small thresholds.
    fn source(width: u32, height: u32) -> SourceImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503));
            Rgb([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        decode_image(Bytes::from(buffer)).unwrap()
    }

    #[test]
    fn test_thumbnail_bounds_longest_edge() {
        let generator = DerivativeGenerator::new(DerivativeSettings {
            thumbnail_min_source_bytes: 0,
            thumbnail_max_edge: 64,
            ..DerivativeSettings::default()
        });
        let thumb = generator
            .generate(DerivativeKind::Thumbnail, &source(400, 200))
            .unwrap();
        assert!(!thumb.passthrough);
        assert_eq!(thumb.width, 64);
        assert_eq!(thumb.height, 32);
        assert_eq!(thumb.extension, "webp");
        assert_eq!(thumb.content_type, "image/webp");
    }

    #[test]
    fn test_small_source_is_its_own_thumbnail() {
        let generator = DerivativeGenerator::new(DerivativeSettings {
            thumbnail_min_source_bytes: usize::MAX,
            ..DerivativeSettings::default()
        });
        let src = source(50, 50);
        let thumb = generator.generate(DerivativeKind::Thumbnail, &src).unwrap();
        assert!(thumb.passthrough);
        assert_eq!(thumb.bytes, src.bytes);
        assert_eq!(thumb.extension, "png");
    }

    #[test]
    fn test_default_compressed_only_above_threshold() {
        let src = source(120, 80);

        let compressing = DerivativeGenerator::new(DerivativeSettings {
            default_compress_threshold_bytes: 0,
            default_format: OutputFormat::Jpeg,
            ..DerivativeSettings::default()
        });
        let compressed = compressing.generate(DerivativeKind::Default, &src).unwrap();
        assert!(!compressed.passthrough);
        assert_eq!(compressed.content_type, "image/jpeg");
        assert_eq!((compressed.width, compressed.height), (120, 80));

        let keeping = DerivativeGenerator::new(DerivativeSettings {
            default_compress_threshold_bytes: usize::MAX,
            ..DerivativeSettings::default()
        });
        assert!(keeping.generate(DerivativeKind::Default, &src).unwrap().passthrough);
    }

    #[test]
    fn test_original_is_unmodified() {
        let src = source(30, 30);
        let original = DerivativeGenerator::default()
            .generate(DerivativeKind::Original, &src)
            .unwrap();
        assert_eq!(original.bytes, src.bytes);
        assert_eq!(original.content_type, "image/png");
    }

    #[test]
    fn test_settings_from_config_rejects_unknown_format() {
        let config = DerivativeConfig {
            thumbnail_format: "tiff".to_string(),
            ..DerivativeConfig::default()
        };
        assert!(DerivativeSettings::from_config(&config).is_err());
    }
}
