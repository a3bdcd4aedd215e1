//! Backend-agnostic engine for a wide-column time-series store with an inverted free-text index
//! over blob payloads and an optional per-source latest-value snapshot.
//!
//! [`backend`] defines the narrow storage interface a concrete store must implement.
//! [`time`] and [`indexer`] are pure, stateless helpers the engine composes.
//! [`engine::StorageEngine`] is the orchestrator callers actually talk to.

pub mod backend;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod model;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{Backend, Column, ColumnFamily, ColumnValue, GetOpts, Ttl};
pub use engine::{BlobRows, ShardCache, StorageEngine};
pub use error::{BackendError, EngineError};
pub use indexer::StringIndexer;
pub use model::{IndexEntry, TimestampedDatum};
