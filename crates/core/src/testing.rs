//! Test-only scaffolding: an in-memory [`Backend`] and a handful of canned fake sources, so a test
//! doesn't have to hand-roll a `TimestampedDatum` for every scenario.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::backend::{Backend, Column, ColumnFamily, ColumnValue, GetOpts, Ttl};
use crate::error::BackendError;
use crate::model::TimestampedDatum;

type Row = BTreeMap<Column, Vec<u8>>;

/// A `Backend` over a `Mutex<HashMap>`, with no persistence and no TTL enforcement — good enough
/// to exercise the engine's orchestration without standing up a real store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: std::sync::Arc<Mutex<HashMap<ColumnFamily, HashMap<String, Row>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn insert(&self, cf: ColumnFamily, row_key: &str, columns: Vec<ColumnValue>, _ttl: Option<Ttl>) -> Result<(), BackendError> {
        let mut tables = self.tables.lock().expect("memory backend mutex poisoned");
        let row = tables.entry(cf).or_default().entry(row_key.to_owned()).or_default();
        for (col, value) in columns {
            row.insert(col, value);
        }
        Ok(())
    }

    fn batch_insert(&self, cf: ColumnFamily, rows: Vec<(String, Vec<ColumnValue>)>, ttl: Option<Ttl>) -> Result<(), BackendError> {
        for (row_key, columns) in rows {
            self.insert(cf, &row_key, columns, ttl)?;
        }
        Ok(())
    }

    fn get(&self, cf: ColumnFamily, row_key: &str, opts: GetOpts) -> Result<Vec<ColumnValue>, BackendError> {
        let tables = self.tables.lock().expect("memory backend mutex poisoned");
        let Some(row) = tables.get(&cf).and_then(|t| t.get(row_key)) else {
            return Err(BackendError::NotFound);
        };

        let mut cols: Vec<ColumnValue> = row
            .iter()
            .filter(|(col, _)| opts.col_start.as_ref().is_none_or(|s| *col >= s))
            .filter(|(col, _)| opts.col_finish.as_ref().is_none_or(|f| *col <= f))
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();

        if opts.reversed {
            cols.reverse();
        }
        if let Some(count) = opts.col_count {
            cols.truncate(count);
        }

        Ok(cols)
    }

    fn multi_get(&self, cf: ColumnFamily, row_keys: &[String], col_count: Option<usize>) -> Result<Vec<(String, Vec<ColumnValue>)>, BackendError> {
        let mut out = Vec::new();
        for row_key in row_keys {
            match self.get(cf, row_key, GetOpts::with_count(col_count)) {
                Ok(cols) => out.push((row_key.clone(), cols)),
                Err(BackendError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn remove(&self, cf: ColumnFamily, row_key: &str) -> Result<(), BackendError> {
        let mut tables = self.tables.lock().expect("memory backend mutex poisoned");
        if let Some(t) = tables.get_mut(&cf) {
            t.remove(row_key);
        }
        Ok(())
    }
}

/// A handful of canned sources for tests that need a realistic `(source_id, data_name)` without
/// inventing one inline every time.
#[derive(Clone, Copy)]
pub enum FakeSource {
    WeatherStation,
    TrafficSensor,
    StockTicker,
}

impl FakeSource {
    pub fn source_id(self) -> &'static str {
        match self {
            FakeSource::WeatherStation => "weather-station-7",
            FakeSource::TrafficSensor => "traffic-sensor-42",
            FakeSource::StockTicker => "stock-ticker-nyse",
        }
    }

    pub fn data_name(self) -> &'static str {
        match self {
            FakeSource::WeatherStation => "temperature_c",
            FakeSource::TrafficSensor => "vehicle_count",
            FakeSource::StockTicker => "last_price",
        }
    }
}

/// Builds a [`TimestampedDatum`] for `source` at `t`, with `value` as the payload.
pub fn fake_datum(source: FakeSource, t: DateTime<Utc>, value: impl Into<Vec<u8>>) -> TimestampedDatum {
    TimestampedDatum::new(source.source_id(), source.data_name(), t, value)
}

/// Builds an indexable [`TimestampedDatum`] whose payload is free text.
pub fn fake_text_datum(source: FakeSource, t: DateTime<Utc>, text: &str) -> TimestampedDatum {
    TimestampedDatum::new(source.source_id(), source.data_name(), t, text.as_bytes().to_vec())
}
