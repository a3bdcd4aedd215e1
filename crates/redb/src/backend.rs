use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase as _};
use tracing::warn;

use tempora_core::{Backend, BackendError, ColumnFamily, ColumnValue, GetOpts, Ttl};

use crate::error::RedbBackendError;
use crate::tables;

const DEFAULT_CACHE_SIZE_MB: usize = 64;

fn open_db(path: impl AsRef<Path>, cache_size_mb: Option<usize>) -> Result<Database, RedbBackendError> {
    let db = Database::builder()
        .set_repair_callback(|x| warn!(progress = x.progress() * 100f64, "store is repairing"))
        .set_cache_size(1024 * 1024 * cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB))
        .create(path)?;

    let wx = db.begin_write()?;
    tables::initialize(&wx)?;
    wx.commit()?;

    Ok(db)
}

/// A [`Backend`] over a single embedded redb database file, one table per column family.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    pub fn open(path: impl AsRef<Path>, cache_size_mb: Option<usize>) -> Result<Self, BackendError> {
        let db = open_db(path, cache_size_mb).map_err(BackendError::from)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Sweeps expired columns out of `cf`, deleting rows left empty. Returns the number of
    /// columns reclaimed.
    pub fn purge_expired(&self, cf: ColumnFamily) -> Result<usize, BackendError> {
        let wx = self.db.begin_write().map_err(RedbBackendError::from)?;
        let purged = tables::purge_expired(&wx, cf)?;
        wx.commit().map_err(RedbBackendError::from)?;
        Ok(purged)
    }
}

impl Backend for RedbBackend {
    fn insert(&self, cf: ColumnFamily, row_key: &str, columns: Vec<ColumnValue>, ttl: Option<Ttl>) -> Result<(), BackendError> {
        let wx = self.db.begin_write().map_err(RedbBackendError::from)?;
        tables::insert(&wx, cf, row_key, columns, ttl)?;
        wx.commit().map_err(RedbBackendError::from)?;
        Ok(())
    }

    fn batch_insert(&self, cf: ColumnFamily, rows: Vec<(String, Vec<ColumnValue>)>, ttl: Option<Ttl>) -> Result<(), BackendError> {
        let wx = self.db.begin_write().map_err(RedbBackendError::from)?;
        tables::batch_insert(&wx, cf, rows, ttl)?;
        wx.commit().map_err(RedbBackendError::from)?;
        Ok(())
    }

    fn get(&self, cf: ColumnFamily, row_key: &str, opts: GetOpts) -> Result<Vec<ColumnValue>, BackendError> {
        let rx = self.db.begin_read().map_err(RedbBackendError::from)?;
        match tables::get(&rx, cf, row_key, opts)? {
            Some(cols) => Ok(cols),
            None => Err(BackendError::NotFound),
        }
    }

    fn multi_get(&self, cf: ColumnFamily, row_keys: &[String], col_count: Option<usize>) -> Result<Vec<(String, Vec<ColumnValue>)>, BackendError> {
        let rx = self.db.begin_read().map_err(RedbBackendError::from)?;
        let rows = tables::multi_get(&rx, cf, row_keys, col_count)?;
        Ok(rows)
    }

    fn remove(&self, cf: ColumnFamily, row_key: &str) -> Result<(), BackendError> {
        let wx = self.db.begin_write().map_err(RedbBackendError::from)?;
        tables::remove(&wx, cf, row_key)?;
        wx.commit().map_err(RedbBackendError::from)?;
        Ok(())
    }
}
