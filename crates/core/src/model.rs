//! Data-transfer records passed into the engine.

use chrono::{DateTime, Utc};

use crate::time;

/// A single piece of caller-supplied data: a numeric sample or a text/blob payload, identified by
/// `(source_id, data_name, timestamp)`. Immutable after construction; consumed by writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedDatum {
    pub source_id: String,
    pub data_name: String,
    pub timestamp: DateTime<Utc>,
    pub data_value: Vec<u8>,
    /// When set, used in place of `data_value` as the basis for the free-text index (for payloads
    /// that aren't themselves indexable text, e.g. a binary blob with a separate caption).
    pub str_for_index: Option<String>,
}

impl TimestampedDatum {
    pub fn new(
        source_id: impl Into<String>,
        data_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        data_value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            data_name: data_name.into(),
            timestamp,
            data_value: data_value.into(),
            str_for_index: None,
        }
    }

    pub fn with_str_for_index(mut self, s: impl Into<String>) -> Self {
        self.str_for_index = Some(s.into());
        self
    }

    pub fn hourly_row_key(&self) -> String {
        time::hourly_row_key(&self.source_id, &self.data_name, self.timestamp)
    }

    pub fn blob_row_key(&self) -> String {
        time::blob_row_key(&self.source_id, &self.data_name, self.timestamp)
    }

    /// The text an indexer should run over: `str_for_index` when present, else `data_value`
    /// interpreted as UTF-8 (lossily, matching a best-effort text indexer over arbitrary blobs).
    pub fn indexable_text(&self) -> std::borrow::Cow<'_, str> {
        match &self.str_for_index {
            Some(s) => std::borrow::Cow::Borrowed(s.as_str()),
            None => String::from_utf8_lossy(&self.data_value),
        }
    }
}

/// One row of the inverted index: `(source_id, data_name, normalized_substring)` → a timestamp
/// and the blob row key that timestamp maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub source_id: String,
    pub data_name: String,
    pub substring: String,
    pub timestamp: DateTime<Utc>,
    pub blob_row_key: String,
}

impl IndexEntry {
    pub fn row_key(&self) -> String {
        time::index_row_key(&self.source_id, &self.data_name, &self.substring)
    }
}
