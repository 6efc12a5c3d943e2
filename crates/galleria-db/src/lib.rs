//! Galleria asset store
//!
//! `PictureRepository` is the primary store for picture assets. The Postgres
//! implementation is used in deployments; the in-memory one backs tests and
//! single-process runs without `DATABASE_URL`.

pub mod db;

pub use db::{
    InMemoryPictureRepository, PgPictureRepository, PictureRepository, ReviewApplied,
};
