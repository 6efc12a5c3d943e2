pub mod picture;
pub mod query;
pub mod review;

pub use picture::{Derivative, DerivativeKind, DominantColor, PictureAsset};
pub use query::PictureQuery;
pub use review::{ModerationStatus, ReviewDecision, ReviewTask};
