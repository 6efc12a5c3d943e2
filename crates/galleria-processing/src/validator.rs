use galleria_core::IngestConfig;
use std::path::Path;

/// Reasons a submitted picture is refused before any processing.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Content type {content_type} does not match extension {extension}")]
    ContentTypeMismatch {
        content_type: String,
        extension: String,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Image dimensions {width}x{height} exceed the {max}px limit")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },

    #[error("Image has zero width or height")]
    EmptyImage,

    #[error("Empty file")]
    EmptyFile,
}

/// Picture upload validator
pub struct PictureValidator {
    max_file_size: usize,
    allowed_extensions: Vec<String>,
    allowed_content_types: Vec<String>,
    max_dimension: u32,
}

impl PictureValidator {
    pub fn new(
        max_file_size: usize,
        allowed_extensions: Vec<String>,
        allowed_content_types: Vec<String>,
        max_dimension: u32,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions,
            allowed_content_types,
            max_dimension,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.max_file_size_bytes,
            config.allowed_extensions.clone(),
            config.allowed_content_types.clone(),
            config.max_dimension,
        )
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    pub fn validate_file_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    pub fn validate_extension(&self, filename: &str) -> Result<String, ValidationError> {
        let extension = file_extension(filename)?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }

        Ok(extension)
    }

    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let normalized = normalize_content_type(content_type);

        if !self.allowed_content_types.iter().any(|ct| ct == &normalized) {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }

        Ok(())
    }

    /// Refuse uploads whose declared content type disagrees with the extension.
    pub fn validate_extension_content_type_match(
        &self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), ValidationError> {
        let normalized = normalize_content_type(content_type);
        let expected: &[&str] = match extension {
            "jpg" | "jpeg" => &["image/jpeg", "image/jpg"],
            "png" => &["image/png"],
            "gif" => &["image/gif"],
            "webp" => &["image/webp"],
            _ => return Ok(()),
        };

        if !expected.contains(&normalized.as_str()) {
            return Err(ValidationError::ContentTypeMismatch {
                content_type: content_type.to_string(),
                extension: extension.to_string(),
            });
        }

        Ok(())
    }

    pub fn validate_dimensions(&self, width: u32, height: u32) -> Result<(), ValidationError> {
        if width == 0 || height == 0 {
            return Err(ValidationError::EmptyImage);
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(ValidationError::DimensionsTooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }
        Ok(())
    }

    /// Everything that can be checked without looking inside the bytes.
    pub fn validate_submission(
        &self,
        filename: &str,
        content_type: &str,
        size: usize,
    ) -> Result<String, ValidationError> {
        self.validate_file_size(size)?;
        let extension = self.validate_extension(filename)?;
        self.validate_content_type(content_type)?;
        self.validate_extension_content_type_match(&extension, content_type)?;
        Ok(extension)
    }
}

fn file_extension(filename: &str) -> Result<String, ValidationError> {
    if filename.trim().is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::InvalidFilename(filename.to_string()));
    }
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| ValidationError::InvalidFilename(filename.to_string()))
}

/// Drop parameters such as `; charset=binary` and lowercase.
fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PictureValidator {
        PictureValidator::from_config(&IngestConfig::default())
    }

    #[test]
    fn test_validate_file_size() {
        let v = validator();
        assert!(matches!(v.validate_file_size(0), Err(ValidationError::EmptyFile)));
        assert!(v.validate_file_size(1024).is_ok());
        assert!(matches!(
            v.validate_file_size(v.max_file_size() + 1),
            Err(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_submission_checks_type_and_extension() {
        let v = validator();
        assert_eq!(
            v.validate_submission("Holiday.JPG", "image/jpeg", 10).unwrap(),
            "jpg"
        );
        assert!(matches!(
            v.validate_submission("notes.txt", "text/plain", 10),
            Err(ValidationError::InvalidExtension { .. })
        ));
        assert!(matches!(
            v.validate_submission("photo.png", "image/jpeg", 10),
            Err(ValidationError::ContentTypeMismatch { .. })
        ));
        assert!(matches!(
            v.validate_submission("photo", "image/png", 10),
            Err(ValidationError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_content_type_parameters_are_ignored() {
        let v = validator();
        assert!(v.validate_content_type("image/PNG; charset=binary").is_ok());
    }

    #[test]
    fn test_validate_dimensions() {
        let v = PictureValidator::new(1024, vec![], vec![], 4000);
        assert!(v.validate_dimensions(4000, 10).is_ok());
        assert!(matches!(
            v.validate_dimensions(4001, 10),
            Err(ValidationError::DimensionsTooLarge { .. })
        ));
        assert!(matches!(v.validate_dimensions(0, 10), Err(ValidationError::EmptyImage)));
    }
}
