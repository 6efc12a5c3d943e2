//! Picture repositories
//
// Repository trait and outcome types
pub mod picture;
//
// Backends
pub mod memory;
pub mod postgres;

pub use memory::InMemoryPictureRepository;
pub use picture::{PictureRepository, ReviewApplied};
pub use postgres::PgPictureRepository;
