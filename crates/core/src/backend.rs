//! The narrow boundary the engine calls: a generic wide-column store.
//!
//! Column families are identified by name; row keys are strings; column names are
//! comparator-typed per family (a 64-bit integer for the hourly shard, an absolute UTC instant for
//! blob/index rows, plain ascii for the latest-snapshot row). `get` honors `col_start`/
//! `col_finish`/`col_count`/`reversed`; `multi_get` returns rows in the order their keys were
//! requested; a missing row surfaces as [`BackendError::NotFound`], distinct from any I/O failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// The four column families the engine writes to. `LatestData` backs the optional "latest
/// snapshot" sub-feature (§9 of the design notes) and need not be provisioned by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    HourlyTimestampedData,
    BlobData,
    BlobDataIndex,
    LatestData,
}

impl ColumnFamily {
    pub fn name(self) -> &'static str {
        match self {
            ColumnFamily::HourlyTimestampedData => "HourlyTimestampedData",
            ColumnFamily::BlobData => "BlobData",
            ColumnFamily::BlobDataIndex => "BlobDataIndex",
            ColumnFamily::LatestData => "LatestData",
        }
    }
}

/// A column name, typed per the owning column family's comparator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    /// Picoseconds-since-hour, used by `HourlyTimestampedData`.
    Hourly(i64),
    /// An absolute UTC instant, used by `BlobData` and `BlobDataIndex`.
    Time(DateTime<Utc>),
    /// A plain ascii column name, used by `LatestData`.
    Ascii(String),
}

impl Column {
    pub fn as_hourly(&self) -> Option<i64> {
        match self {
            Column::Hourly(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Column::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Column::Ascii(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// A single `(column, value)` pair carried through `insert` and returned by `get`/`multi_get`.
pub type ColumnValue = (Column, Vec<u8>);

/// Server-side expiration, applied uniformly across every write in a single call.
pub type Ttl = Duration;

/// Bounds for a single-row column slice read.
#[derive(Debug, Clone, Default)]
pub struct GetOpts {
    pub col_start: Option<Column>,
    pub col_finish: Option<Column>,
    pub col_count: Option<usize>,
    pub reversed: bool,
}

impl GetOpts {
    pub fn with_count(col_count: Option<usize>) -> Self {
        Self {
            col_count,
            ..Default::default()
        }
    }

    pub fn bounded(col_start: Column, col_finish: Column, col_count: Option<usize>) -> Self {
        Self {
            col_start: Some(col_start),
            col_finish: Some(col_finish),
            col_count,
            reversed: false,
        }
    }
}

/// A thin interface over a Cassandra-style wide-column store.
///
/// Implementations are expected to be cheap to clone (an `Arc`-backed handle) and safe to share
/// across threads; the engine itself introduces no additional synchronization beyond what a
/// concrete `Backend` requires.
pub trait Backend: Clone + Send + Sync {
    fn insert(
        &self,
        cf: ColumnFamily,
        row_key: &str,
        columns: Vec<ColumnValue>,
        ttl: Option<Ttl>,
    ) -> Result<(), BackendError>;

    /// `row_key -> {column: value}` batched into a single backend round-trip.
    fn batch_insert(
        &self,
        cf: ColumnFamily,
        rows: Vec<(String, Vec<ColumnValue>)>,
        ttl: Option<Ttl>,
    ) -> Result<(), BackendError>;

    /// Reads an ordered column slice of one row. Returns [`BackendError::NotFound`] when the row
    /// doesn't exist.
    fn get(&self, cf: ColumnFamily, row_key: &str, opts: GetOpts) -> Result<Vec<ColumnValue>, BackendError>;

    /// Reads multiple rows in one round-trip, in the order the keys were requested. Rows that
    /// don't exist are simply absent from the result (unlike `get`, a multi-row fetch doesn't
    /// fail just because some of its keys are missing).
    fn multi_get(
        &self,
        cf: ColumnFamily,
        row_keys: &[String],
        col_count: Option<usize>,
    ) -> Result<Vec<(String, Vec<ColumnValue>)>, BackendError>;

    fn remove(&self, cf: ColumnFamily, row_key: &str) -> Result<(), BackendError>;
}
