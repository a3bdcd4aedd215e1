//! Orchestrates inserts and reads across the three coordinated column families.
//!
//! The engine is stateless modulo a pair of informational counters, a jitter randomizer, and the
//! backend handle it holds; each public operation performs one or more backend calls and returns.
//! There is no background thread or scheduler owned by the engine (see the crate's concurrency
//! notes).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use itertools::Itertools;
use rand::{rngs::SmallRng, SeedableRng};
use tracing::{debug, trace};

use crate::backend::{Backend, Column, ColumnFamily, ColumnValue, GetOpts, Ttl};
use crate::error::{BackendError, EngineError};
use crate::indexer::StringIndexer;
use crate::model::{IndexEntry, TimestampedDatum};
use crate::time;

/// A timestamped shard read, already reconstructed to full timestamps.
pub type TimeSeriesRows = Vec<(DateTime<Utc>, Vec<u8>)>;

/// Eight hours, matching the original time-series cache's default TTL.
pub const DEFAULT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(8 * 60 * 60);

/// Optional collaborator for caching whole historical hourly shards. Never consulted for the
/// current UTC hour, so it can't serve a partial shard. Disabled unless wired in via
/// [`StorageEngine::with_cache`]; the main `get_range` read path does not use it (see module docs
/// on [`StorageEngine::cached_full_shard`]).
pub trait ShardCache: Send + Sync {
    fn get(&self, row_key: &str) -> Option<Vec<ColumnValue>>;
    fn add(&self, row_key: &str, value: Vec<ColumnValue>, ttl: std::time::Duration);
}

/// Either shape `get_blobs_by_free_text`/`get_blobs_multi_data` can answer with, selected by their
/// `to_tuples` argument.
#[derive(Debug, Clone)]
pub enum BlobRows {
    /// The first `(column, value)` of each resolved blob row, in index-scan order.
    Tuples(TimeSeriesRows),
    /// The raw `row_key -> columns` mapping, in index-scan order.
    Raw(Vec<(String, Vec<ColumnValue>)>),
}

impl BlobRows {
    pub fn into_tuples(self) -> TimeSeriesRows {
        match self {
            BlobRows::Tuples(t) => t,
            BlobRows::Raw(raw) => raw
                .into_iter()
                .filter_map(|(_, cols)| cols.into_iter().next())
                .filter_map(|(col, value)| col.as_time().map(|t| (t, value)))
                .collect(),
        }
    }
}

pub struct StorageEngine<B: Backend> {
    backend: B,
    indexer: StringIndexer,
    rng: Mutex<SmallRng>,
    cache: Option<Arc<dyn ShardCache>>,
    cache_hits: AtomicU64,
    daily_gets: AtomicU64,
}

impl<B: Backend> Clone for StorageEngine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            indexer: self.indexer.clone(),
            rng: Mutex::new(SmallRng::from_os_rng()),
            cache: self.cache.clone(),
            cache_hits: AtomicU64::new(self.cache_hits.load(Ordering::Relaxed)),
            daily_gets: AtomicU64::new(self.daily_gets.load(Ordering::Relaxed)),
        }
    }
}

impl<B: Backend> StorageEngine<B> {
    pub fn new(backend: B, index_depth: usize) -> Self {
        Self {
            backend,
            indexer: StringIndexer::new(index_depth),
            rng: Mutex::new(SmallRng::from_os_rng()),
            cache: None,
            cache_hits: AtomicU64::new(0),
            daily_gets: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ShardCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn daily_gets(&self) -> u64 {
        self.daily_gets.load(Ordering::Relaxed)
    }

    fn draw_jitter(&self) -> i64 {
        let mut rng = self.rng.lock().expect("jitter rng mutex poisoned");
        time::draw_jitter(&mut *rng)
    }

    //
    // Ingest — time series only.
    //

    pub fn insert_timestamped(&self, datum: &TimestampedDatum, ttl: Option<Ttl>) -> Result<(), EngineError> {
        let row_key = datum.hourly_row_key();
        let jitter = self.draw_jitter();
        let col = Column::Hourly(time::high_res_column(datum.timestamp, Some(jitter)));
        trace!(row_key = %row_key, "insert_timestamped");
        self.backend
            .insert(ColumnFamily::HourlyTimestampedData, &row_key, vec![(col, datum.data_value.clone())], ttl)?;
        Ok(())
    }

    pub fn batch_insert_timestamped(&self, data: &[TimestampedDatum], ttl: Option<Ttl>) -> Result<(), EngineError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut grouped: HashMap<String, Vec<ColumnValue>> = HashMap::new();
        for datum in data {
            let jitter = self.draw_jitter();
            let col = Column::Hourly(time::high_res_column(datum.timestamp, Some(jitter)));
            grouped
                .entry(datum.hourly_row_key())
                .or_default()
                .push((col, datum.data_value.clone()));
        }

        debug!(shards = grouped.len(), rows = data.len(), "batch_insert_timestamped");
        self.backend
            .batch_insert(ColumnFamily::HourlyTimestampedData, grouped.into_iter().collect(), ttl)?;
        Ok(())
    }

    //
    // Ingest — blob + inverted index.
    //

    pub fn insert_blob(&self, datum: &TimestampedDatum, ttl: Option<Ttl>) -> Result<String, EngineError> {
        let row_key = datum.blob_row_key();
        self.backend.insert(
            ColumnFamily::BlobData,
            &row_key,
            vec![(Column::Time(datum.timestamp), datum.data_value.clone())],
            ttl,
        )?;
        Ok(row_key)
    }

    pub fn batch_insert_indexes(&self, entries: &[IndexEntry], ttl: Option<Ttl>) -> Result<(), EngineError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut grouped: HashMap<String, Vec<ColumnValue>> = HashMap::new();
        for entry in entries {
            grouped
                .entry(entry.row_key())
                .or_default()
                .push((Column::Time(entry.timestamp), entry.blob_row_key.clone().into_bytes()));
        }

        self.backend
            .batch_insert(ColumnFamily::BlobDataIndex, grouped.into_iter().collect(), ttl)?;
        Ok(())
    }

    pub fn insert_indexable_blob_and_index(&self, datum: &TimestampedDatum, ttl: Option<Ttl>) -> Result<(), EngineError> {
        self.insert_timestamped(datum, ttl)?;
        let blob_row_key = self.insert_blob(datum, ttl)?;
        let entries = self.indexer.index_keys(datum, &blob_row_key);
        self.batch_insert_indexes(&entries, ttl)?;
        Ok(())
    }

    pub fn batch_insert_indexable_blobs_and_indexes(
        &self,
        data: Vec<Option<TimestampedDatum>>,
        ttl: Option<Ttl>,
    ) -> Result<(), EngineError> {
        let data: Vec<TimestampedDatum> = data.into_iter().flatten().collect();
        if data.is_empty() {
            return Ok(());
        }

        self.batch_insert_timestamped(&data, ttl)?;

        let blob_rows: Vec<(String, Vec<ColumnValue>)> = data
            .iter()
            .map(|d| (d.blob_row_key(), vec![(Column::Time(d.timestamp), d.data_value.clone())]))
            .collect();
        self.backend.batch_insert(ColumnFamily::BlobData, blob_rows, ttl)?;

        let mut entries = Vec::new();
        for d in &data {
            let blob_row_key = d.blob_row_key();
            entries.extend(self.indexer.index_keys(d, &blob_row_key));
        }
        self.batch_insert_indexes(&entries, ttl)?;

        Ok(())
    }

    //
    // Latest snapshot (auxiliary CF).
    //

    fn latest_row(&self, source_id: &str) -> Result<Vec<ColumnValue>, EngineError> {
        match self.backend.get(ColumnFamily::LatestData, source_id, GetOpts::default()) {
            Ok(cols) => Ok(cols),
            Err(BackendError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn latest_ts_column(data_name: &str) -> String {
        format!("{data_name}-ts")
    }

    pub fn insert_latest(&self, datum: &TimestampedDatum, verify_timestamp: bool) -> Result<(), EngineError> {
        let millis = time::unix_millis(datum.timestamp);

        if verify_timestamp {
            let existing = self.latest_row(&datum.source_id)?;
            let ts_col = Self::latest_ts_column(&datum.data_name);
            let stored_ts = existing.iter().find_map(|(col, value)| {
                (col.as_ascii() == Some(ts_col.as_str()))
                    .then(|| std::str::from_utf8(value).ok()?.parse::<i64>().ok())
                    .flatten()
            });

            if let Some(stored_ts) = stored_ts {
                if stored_ts >= millis {
                    trace!(source_id = %datum.source_id, "insert_latest suppressed, stored value is newer");
                    return Ok(());
                }
            }
        }

        let cols = vec![
            (Column::Ascii(datum.data_name.clone()), datum.data_value.clone()),
            (Column::Ascii(Self::latest_ts_column(&datum.data_name)), millis.to_string().into_bytes()),
        ];
        self.backend.insert(ColumnFamily::LatestData, &datum.source_id, cols, None)?;
        Ok(())
    }

    pub fn insert_latest_by_dict(&self, source_id: &str, values: &[(String, Vec<u8>)]) -> Result<(), EngineError> {
        let millis = time::unix_millis(Utc::now());
        let mut cols = Vec::with_capacity(values.len() * 2);
        for (data_name, value) in values {
            cols.push((Column::Ascii(data_name.clone()), value.clone()));
            cols.push((Column::Ascii(Self::latest_ts_column(data_name)), millis.to_string().into_bytes()));
        }
        self.backend.insert(ColumnFamily::LatestData, source_id, cols, None)?;
        Ok(())
    }

    pub fn load_latest(&self, source_id: &str, data_name: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>, EngineError> {
        let row = self.latest_row(source_id)?;
        let mut out = BTreeMap::new();
        for (col, value) in row {
            let Some(name) = col.as_ascii() else { continue };
            if name.ends_with("-ts") {
                continue;
            }
            if data_name.is_some_and(|filter| filter != name) {
                continue;
            }
            out.insert(name.to_owned(), value);
        }
        Ok(out)
    }

    pub fn multi_load_latest(&self, source_ids: &[String]) -> Result<BTreeMap<String, BTreeMap<String, Vec<u8>>>, EngineError> {
        let rows = self.backend.multi_get(ColumnFamily::LatestData, source_ids, None)?;
        let mut out = BTreeMap::new();
        for (source_id, cols) in rows {
            let mut values = BTreeMap::new();
            for (col, value) in cols {
                if let Some(name) = col.as_ascii() {
                    if !name.ends_with("-ts") {
                        values.insert(name.to_owned(), value);
                    }
                }
            }
            out.insert(source_id, values);
        }
        Ok(out)
    }

    pub fn remove_latest(&self, source_id: &str) -> Result<(), EngineError> {
        self.backend.remove(ColumnFamily::LatestData, source_id)?;
        Ok(())
    }

    //
    // Range read over time series.
    //

    fn get_hourly_shard(&self, row_key: &str, opts: GetOpts) -> Result<Vec<ColumnValue>, EngineError> {
        self.daily_gets.fetch_add(1, Ordering::Relaxed);
        match self.backend.get(ColumnFamily::HourlyTimestampedData, row_key, opts) {
            Ok(cols) => Ok(cols),
            Err(BackendError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads one shard's full, uncapped column set through an optional cache of historical
    /// (strictly-before-the-current-UTC-hour) shards. The main `get_range` path below does not go
    /// through this — it always asks the backend for an exact, bounded column slice, which is the
    /// behavior the picosecond-column (jittered-write) scheme requires. This is provided as a
    /// standalone collaborator for embedders who want to warm a read-through cache of whole
    /// historical shards ahead of time.
    pub fn cached_full_shard(
        &self,
        source_id: &str,
        data_name: &str,
        hour: DateTime<Utc>,
    ) -> Result<TimeSeriesRows, EngineError> {
        let row_key = time::hourly_row_key(source_id, data_name, hour);
        let is_historical = hour < time::floor_to_hour(Utc::now());

        if is_historical {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache.get(&row_key) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(reconstruct_columns(hour, cached));
                }
            }
        }

        let cols = self.get_hourly_shard(&row_key, GetOpts::default())?;

        if is_historical {
            if let Some(cache) = &self.cache {
                cache.add(&row_key, cols.clone(), DEFAULT_CACHE_TTL);
            }
        }

        Ok(reconstruct_columns(hour, cols))
    }

    pub fn get_range(
        &self,
        source_id: &str,
        data_name: &str,
        t_from: DateTime<Utc>,
        t_to: DateTime<Utc>,
        max_count: Option<usize>,
    ) -> Result<TimeSeriesRows, EngineError> {
        let curr = time::floor_to_hour(t_from);
        let last = time::floor_to_hour(t_to);

        let mut hours = Vec::new();
        let mut h = curr;
        while h <= last {
            hours.push(h);
            h += ChronoDuration::hours(1);
        }

        if hours.is_empty() {
            return Ok(Vec::new());
        }

        debug!(source_id, data_name, shards = hours.len(), "get_range");

        if hours.len() == 1 {
            let row_key = time::hourly_row_key(source_id, data_name, hours[0]);
            let opts = GetOpts::bounded(
                Column::Hourly(time::high_res_column(t_from, None)),
                Column::Hourly(time::high_res_column(t_to, None)),
                max_count,
            );
            let cols = self.get_hourly_shard(&row_key, opts)?;
            return Ok(reconstruct_columns(hours[0], cols));
        }

        let mut result = Vec::new();
        let mut budget: i64 = max_count.map(|c| c as i64).unwrap_or(i64::MAX);

        for (i, hour) in hours.iter().enumerate() {
            if budget <= 0 {
                break;
            }

            let row_key = time::hourly_row_key(source_id, data_name, *hour);
            let count = if budget == i64::MAX { None } else { Some(budget as usize) };

            let opts = if i == 0 {
                GetOpts::bounded(
                    Column::Hourly(time::high_res_column(t_from, None)),
                    Column::Hourly(time::high_res_column(hours[1] - ChronoDuration::microseconds(1), None)),
                    count,
                )
            } else if i == hours.len() - 1 {
                GetOpts::bounded(
                    Column::Hourly(time::high_res_column(*hour, None)),
                    Column::Hourly(time::high_res_column(t_to + ChronoDuration::microseconds(1), None)),
                    count,
                )
            } else {
                GetOpts::with_count(count)
            };

            let cols = self.get_hourly_shard(&row_key, opts)?;
            let n = cols.len();
            result.extend(reconstruct_columns(*hour, cols));
            budget -= n as i64;
        }

        Ok(result)
    }

    //
    // Inverted index queries.
    //

    pub fn index_row(
        &self,
        source_id: &str,
        data_name: &str,
        free_text: &str,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
        col_count: Option<usize>,
    ) -> Result<Vec<(DateTime<Utc>, String)>, EngineError> {
        let normalized = crate::indexer::normalize(free_text);
        let row_key = time::index_row_key(source_id, data_name, &normalized);

        let opts = GetOpts {
            col_start: t_from.map(Column::Time),
            col_finish: t_to.map(Column::Time),
            col_count,
            reversed: false,
        };

        match self.backend.get(ColumnFamily::BlobDataIndex, &row_key, opts) {
            Ok(cols) => Ok(cols
                .into_iter()
                .map(|(col, value)| {
                    let t = col.as_time().expect("index cf uses time-typed columns");
                    (t, String::from_utf8_lossy(&value).into_owned())
                })
                .collect()),
            Err(BackendError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_blobs(&self, index_rows: Vec<(DateTime<Utc>, String)>, to_tuples: bool) -> Result<BlobRows, EngineError> {
        let keys: Vec<String> = index_rows.into_iter().map(|(_, key)| key).unique().collect();
        let rows = self.backend.multi_get(ColumnFamily::BlobData, &keys, None)?;

        if to_tuples {
            let tuples = rows
                .into_iter()
                .filter_map(|(_, cols)| cols.into_iter().next())
                .filter_map(|(col, value)| col.as_time().map(|t| (t, value)))
                .collect();
            Ok(BlobRows::Tuples(tuples))
        } else {
            Ok(BlobRows::Raw(rows))
        }
    }

    pub fn get_blobs_by_free_text(
        &self,
        source_id: &str,
        data_name: &str,
        free_text: &str,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
        to_tuples: bool,
    ) -> Result<BlobRows, EngineError> {
        let index_rows = self.index_row(source_id, data_name, free_text, t_from, t_to, None)?;
        self.resolve_blobs(index_rows, to_tuples)
    }

    pub fn get_blobs_multi_data(
        &self,
        source_id: &str,
        data_names: &[String],
        free_text: &str,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
        to_tuples: bool,
    ) -> Result<BlobRows, EngineError> {
        let mut all_index_rows = Vec::new();
        for data_name in data_names {
            all_index_rows.extend(self.index_row(source_id, data_name, free_text, t_from, t_to, None)?);
        }
        self.resolve_blobs(all_index_rows, to_tuples)
    }
}

fn reconstruct_columns(hour_start: DateTime<Utc>, cols: Vec<ColumnValue>) -> Vec<(DateTime<Utc>, Vec<u8>)> {
    cols.into_iter()
        .map(|(col, value)| {
            let highres = col.as_hourly().expect("hourly cf uses hourly-typed columns");
            (time::reconstruct(hour_start, highres), value)
        })
        .collect()
}
