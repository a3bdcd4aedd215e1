//! One redb table per column family. A row is stored as a single bincode-encoded blob: a
//! `BTreeMap` from [`Column`] (which already orders the way each family's comparator requires) to
//! `(value, expiry)`. Writes read-merge-write that blob so repeated inserts into the same hourly
//! shard accumulate columns rather than clobbering the row.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{ReadTransaction, ReadableTable as _, TableDefinition, WriteTransaction};

use tempora_core::{Column, ColumnFamily, ColumnValue, GetOpts, Ttl};

use crate::error::RedbBackendError as Error;

type RowRecord = BTreeMap<Column, (Vec<u8>, Option<i64>)>;

const HOURLY: TableDefinition<'static, &'static str, Vec<u8>> = TableDefinition::new("hourly_timestamped_data");
const BLOB: TableDefinition<'static, &'static str, Vec<u8>> = TableDefinition::new("blob_data");
const BLOB_INDEX: TableDefinition<'static, &'static str, Vec<u8>> = TableDefinition::new("blob_data_index");
const LATEST: TableDefinition<'static, &'static str, Vec<u8>> = TableDefinition::new("latest_data");

fn table_for(cf: ColumnFamily) -> TableDefinition<'static, &'static str, Vec<u8>> {
    match cf {
        ColumnFamily::HourlyTimestampedData => HOURLY,
        ColumnFamily::BlobData => BLOB,
        ColumnFamily::BlobDataIndex => BLOB_INDEX,
        ColumnFamily::LatestData => LATEST,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

fn decode_row(bytes: &[u8]) -> Result<RowRecord, Error> {
    Ok(bincode::deserialize(bytes)?)
}

fn encode_row(row: &RowRecord) -> Result<Vec<u8>, Error> {
    Ok(bincode::serialize(row)?)
}

pub fn initialize(wx: &WriteTransaction) -> Result<(), Error> {
    for cf in [
        ColumnFamily::HourlyTimestampedData,
        ColumnFamily::BlobData,
        ColumnFamily::BlobDataIndex,
        ColumnFamily::LatestData,
    ] {
        wx.open_table(table_for(cf))?;
    }
    Ok(())
}

fn merge_row(existing: Option<&[u8]>, columns: Vec<ColumnValue>, ttl: Option<Ttl>) -> Result<Vec<u8>, Error> {
    let mut row: RowRecord = match existing {
        Some(bytes) => decode_row(bytes)?,
        None => BTreeMap::new(),
    };

    let expiry = ttl.map(|d| now_millis() + d.as_millis() as i64);
    for (col, value) in columns {
        row.insert(col, (value, expiry));
    }

    encode_row(&row)
}

pub fn insert(wx: &WriteTransaction, cf: ColumnFamily, row_key: &str, columns: Vec<ColumnValue>, ttl: Option<Ttl>) -> Result<(), Error> {
    let mut table = wx.open_table(table_for(cf))?;
    let existing = table.get(row_key)?.map(|v| v.value());
    let merged = merge_row(existing.as_deref(), columns, ttl)?;
    table.insert(row_key, merged)?;
    Ok(())
}

pub fn batch_insert(
    wx: &WriteTransaction,
    cf: ColumnFamily,
    rows: Vec<(String, Vec<ColumnValue>)>,
    ttl: Option<Ttl>,
) -> Result<(), Error> {
    let mut table = wx.open_table(table_for(cf))?;
    for (row_key, columns) in rows {
        let existing = table.get(row_key.as_str())?.map(|v| v.value());
        let merged = merge_row(existing.as_deref(), columns, ttl)?;
        table.insert(row_key.as_str(), merged)?;
    }
    Ok(())
}

/// `None` means the row doesn't physically exist. `Some(vec![])` means it exists but every column
/// was filtered out by bounds, count, or expiry.
pub fn get(rx: &ReadTransaction, cf: ColumnFamily, row_key: &str, opts: GetOpts) -> Result<Option<Vec<ColumnValue>>, Error> {
    let table = rx.open_table(table_for(cf))?;
    let Some(raw) = table.get(row_key)? else {
        return Ok(None);
    };

    let row = decode_row(&raw.value())?;
    Ok(Some(select(row, opts)))
}

pub fn multi_get(
    rx: &ReadTransaction,
    cf: ColumnFamily,
    row_keys: &[String],
    col_count: Option<usize>,
) -> Result<Vec<(String, Vec<ColumnValue>)>, Error> {
    let table = rx.open_table(table_for(cf))?;
    let mut out = Vec::new();

    for row_key in row_keys {
        if let Some(raw) = table.get(row_key.as_str())? {
            let row = decode_row(&raw.value())?;
            let opts = GetOpts::with_count(col_count);
            out.push((row_key.clone(), select(row, opts)));
        }
    }

    Ok(out)
}

pub fn remove(wx: &WriteTransaction, cf: ColumnFamily, row_key: &str) -> Result<(), Error> {
    let mut table = wx.open_table(table_for(cf))?;
    table.remove(row_key)?;
    Ok(())
}

/// Drops expired columns and empty rows from `cf`. Lazily-expired entries are filtered out of
/// every read regardless; this reclaims the space they occupy.
pub fn purge_expired(wx: &WriteTransaction, cf: ColumnFamily) -> Result<usize, Error> {
    let now = now_millis();
    let mut purged = 0;
    let mut empties = Vec::new();

    {
        let mut table = wx.open_table(table_for(cf))?;
        let keys: Vec<String> = table.iter()?.filter_map(|e| e.ok()).map(|(k, _)| k.value().to_owned()).collect();

        for row_key in keys {
            let Some(bytes) = table.get(row_key.as_str())?.map(|g| g.value()) else {
                continue;
            };
            let mut row = decode_row(&bytes)?;
            let before = row.len();
            row.retain(|_, (_, expiry)| !is_expired(*expiry, now));
            purged += before - row.len();

            if row.is_empty() {
                empties.push(row_key);
            } else {
                table.insert(row_key.as_str(), encode_row(&row)?)?;
            }
        }
    }

    {
        let mut table = wx.open_table(table_for(cf))?;
        for row_key in empties {
            table.remove(row_key.as_str())?;
        }
    }

    Ok(purged)
}

fn is_expired(expiry: Option<i64>, now: i64) -> bool {
    expiry.is_some_and(|e| e <= now)
}

fn select(row: RowRecord, opts: GetOpts) -> Vec<ColumnValue> {
    let now = now_millis();

    let mut cols: Vec<ColumnValue> = row
        .into_iter()
        .filter(|(_, (_, expiry))| !is_expired(*expiry, now))
        .filter(|(col, _)| opts.col_start.as_ref().is_none_or(|s| col >= s))
        .filter(|(col, _)| opts.col_finish.as_ref().is_none_or(|f| col <= f))
        .map(|(col, (value, _))| (col, value))
        .collect();

    if opts.reversed {
        cols.reverse();
    }

    if let Some(count) = opts.col_count {
        cols.truncate(count);
    }

    cols
}
