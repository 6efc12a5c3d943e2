//! Galleria Processing Library
//!
//! CPU-bound picture work: validation, content hashing, derivative
//! generation and dominant color extraction. Nothing in this crate performs
//! I/O; callers run it on a worker pool and store the results.

pub mod color;
pub mod compression;
pub mod derivative;
pub mod error;
pub mod hash;
pub mod naming;
pub mod probe;
pub mod validator;

pub use color::{ColorExtractor, ColorExtractorConfig};
pub use compression::{DerivativeEncoder, OutputFormat};
pub use derivative::{DerivativeGenerator, DerivativeSettings, EncodedDerivative};
pub use error::ProcessingError;
pub use hash::content_hash;
pub use naming::DerivativeNamer;
pub use probe::{decode_image, probe_image, ImageProbe, SourceImage};
pub use validator::{PictureValidator, ValidationError};
