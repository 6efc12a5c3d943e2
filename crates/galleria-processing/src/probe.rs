//! Header probing and decoding of source bytes.

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

use crate::error::ProcessingError;

/// Dimensions and container format read from the image header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProbe {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// A decoded source picture together with its original bytes.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Bytes,
    pub image: DynamicImage,
    pub probe: ImageProbe,
}

impl SourceImage {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

pub fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Read format and dimensions without decoding pixel data.
pub fn probe_image(data: &[u8]) -> Result<ImageProbe, ProcessingError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ProcessingError::Decode("Unrecognized image format".to_string()))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;

    Ok(ImageProbe {
        width,
        height,
        format: format_name(format),
    })
}

/// Decode the full image. CPU-bound; run it off the async executor.
pub fn decode_image(data: Bytes) -> Result<SourceImage, ProcessingError> {
    let start = std::time::Instant::now();
    let reader = ImageReader::new(Cursor::new(data.as_ref()))
        .with_guessed_format()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ProcessingError::Decode("Unrecognized image format".to_string()))?;

    let image = reader
        .decode()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;
    let (width, height) = image.dimensions();

    tracing::debug!(
        width = width,
        height = height,
        format = ?format,
        size_bytes = data.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Decoded source image"
    );

    Ok(SourceImage {
        bytes: data,
        image,
        probe: ImageProbe {
            width,
            height,
            format: format_name(format),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, _| Rgb([(x % 255) as u8, 40, 90]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_probe_reads_header() {
        let probe = probe_image(&png_bytes(40, 30)).unwrap();
        assert_eq!(probe, ImageProbe { width: 40, height: 30, format: "png".to_string() });
    }

    #[test]
    fn test_decode_keeps_original_bytes() {
        let data = png_bytes(12, 8);
        let source = decode_image(Bytes::from(data.clone())).unwrap();
        assert_eq!(source.bytes.as_ref(), data.as_slice());
        assert_eq!((source.probe.width, source.probe.height), (12, 8));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(probe_image(b"definitely not an image"), Err(ProcessingError::Decode(_))));
    }
}
