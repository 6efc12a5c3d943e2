//! Galleria Infrastructure Library
//!
//! Shared runtime plumbing used by every Galleria service:
//! - Telemetry initialization
//! - Bounded worker pools
//! - Keyed registries and per-key locks

pub mod pool;
pub mod registry;
pub mod telemetry;

// Re-export commonly used types
pub use pool::{PoolError, RejectionPolicy, WorkerPool, WorkerPoolConfig};
pub use registry::{InMemoryRegistry, KeyedGuard, KeyedLocks, Registry};
pub use telemetry::init_telemetry;
