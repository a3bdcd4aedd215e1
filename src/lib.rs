//! Wide-column time-series storage with a free-text blob index, and a structured event log built
//! on top of it.
//!
//! [`tempora_core`] carries the backend-agnostic engine; this crate adds the [`logger`] facade and,
//! behind the `redb` feature, re-exports the embedded-database backend.

pub mod logger;

pub use tempora_core::{
    Backend, BackendError, BlobRows, Column, ColumnFamily, ColumnValue, EngineError, GetOpts, IndexEntry, ShardCache, StorageEngine,
    StringIndexer, TimestampedDatum, Ttl,
};

#[cfg(feature = "redb")]
pub use tempora_redb::RedbBackend;
