//! Galleria Cache Library
//!
//! Two-tier read-through cache: a small per-process LRU in front of a shared
//! distributed cache, with delayed double-delete invalidation. The shared tier
//! is a Postgres table when a database is configured.

pub mod distributed;
pub mod error;
pub mod key;
pub mod layer;
pub mod local;
pub mod postgres;

pub use distributed::{DistributedCache, MemoryDistributedCache};
pub use error::CacheError;
pub use key::{hashed_key, picture_list_key};
pub use layer::{CacheLayer, CacheSettings, InvalidationHandle, InvalidationReport};
pub use local::LocalTier;
pub use postgres::PgDistributedCache;
