//! CSV price cache.
//!
//! Layout: `{cache_dir}/prices_{key}.csv` with a `date` column followed by one
//! price column per asset label, plus a `prices_{key}.meta.json` sidecar.
//! The key comes from [`crate::fingerprint::cache_key`].
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (expected columns, parseable dates, rows > 0)
//! - Quarantine for corrupt files (`{filename}.quarantined`), reported as a miss
//! - Invalidation by deleting the files

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::{DataError, DataSource};
use crate::fingerprint::dataset_hash;
use crate::series::PriceTable;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Metadata sidecar for one cached table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub key: String,
    pub assets: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: chrono::NaiveDateTime,
}

/// File-backed cache of aligned price tables.
pub struct PriceCache {
    cache_dir: PathBuf,
}

impl PriceCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn data_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("prices_{key}.csv"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("prices_{key}.meta.json"))
    }

    /// Write a table under `key`, replacing any previous entry.
    pub fn write(
        &self,
        key: &str,
        table: &PriceTable,
        source: DataSource,
    ) -> Result<CacheMeta, DataError> {
        let (Some(&start_date), Some(&end_date)) = (table.dates().first(), table.dates().last())
        else {
            return Err(DataError::CacheError("no rows to cache".into()));
        };

        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = table_to_dataframe(table)?;
        let path = self.data_path(key);
        let tmp_path = path.with_extension("csv.tmp");
        write_csv(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            key: key.to_string(),
            assets: table.assets().to_vec(),
            start_date,
            end_date,
            row_count: table.len(),
            data_hash: dataset_hash(table),
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(key);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        fs::rename(&meta_tmp, &meta_path)
            .map_err(|e| DataError::CacheError(format!("meta rename: {e}")))?;

        debug!(key, rows = meta.row_count, path = %path.display(), "cached price table");
        Ok(meta)
    }

    /// Load the table cached under `key`.
    ///
    /// `Ok(None)` is a miss: no file, or a file that failed validation and has
    /// been quarantined. `expected_assets` must match the cached header.
    pub fn load(
        &self,
        key: &str,
        expected_assets: &[String],
    ) -> Result<Option<PriceTable>, DataError> {
        let path = self.data_path(key);
        if !path.exists() {
            return Ok(None);
        }

        match load_and_validate_csv(&path, expected_assets) {
            Ok(table) => Ok(Some(table)),
            Err(e) => {
                let quarantine = path.with_extension("csv.quarantined");
                warn!(
                    path = %path.display(),
                    error = %e,
                    "quarantining corrupt cache file"
                );
                fs::rename(&path, &quarantine)
                    .map_err(|e| DataError::CacheError(format!("quarantine failed: {e}")))?;
                let _ = fs::remove_file(self.meta_path(key));
                Ok(None)
            }
        }
    }

    pub fn get_meta(&self, key: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Remove the entry for `key`. Returns whether anything was deleted.
    pub fn invalidate(&self, key: &str) -> Result<bool, DataError> {
        let mut removed = false;
        for path in [self.data_path(key), self.meta_path(key)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DataError::CacheError(format!(
                        "failed to remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Ok(removed)
    }
}

// ── CSV I/O helpers ─────────────────────────────────────────────────

fn table_to_dataframe(table: &PriceTable) -> Result<DataFrame, DataError> {
    let dates: Vec<String> = table
        .dates()
        .iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect();
    let mut columns = Vec::with_capacity(table.assets().len() + 1);
    columns.push(Column::new("date".into(), dates));
    for label in table.assets() {
        let values = table
            .column(label)
            .ok_or_else(|| DataError::CacheError(format!("missing column '{label}'")))?;
        columns.push(Column::new(label.as_str().into(), values.to_vec()));
    }
    DataFrame::new(columns)
        .map_err(|e| DataError::CacheError(format!("dataframe creation: {e}")))
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let mut file =
        fs::File::create(path).map_err(|e| DataError::CacheError(format!("create file: {e}")))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| DataError::CacheError(format!("write csv: {e}")))
}

fn load_and_validate_csv(path: &Path, expected_assets: &[String]) -> Result<PriceTable, DataError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| DataError::CacheError(format!("read csv: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::CacheError("empty cache file".into()));
    }

    let header: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let mut expected = vec!["date".to_string()];
    expected.extend(expected_assets.iter().cloned());
    if header != expected {
        return Err(DataError::CacheError(format!(
            "header {header:?} does not match {expected:?}"
        )));
    }

    let date_col = df
        .column("date")
        .map_err(|e| DataError::CacheError(format!("date column: {e}")))?
        .cast(&DataType::String)
        .map_err(|e| DataError::CacheError(format!("date column type: {e}")))?;
    let date_ca = date_col
        .as_materialized_series()
        .str()
        .map_err(|e| DataError::CacheError(format!("date column type: {e}")))?;
    let dates = date_ca
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let raw = raw.ok_or_else(|| DataError::CacheError(format!("null date at row {i}")))?;
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map_err(|e| DataError::CacheError(format!("bad date '{raw}' at row {i}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns = Vec::with_capacity(expected_assets.len());
    for label in expected_assets {
        let col = df
            .column(label)
            .and_then(|c| c.cast(&DataType::Float64))
            .map_err(|e| DataError::CacheError(format!("column '{label}': {e}")))?;
        let ca = col
            .as_materialized_series()
            .f64()
            .map_err(|e| DataError::CacheError(format!("column '{label}' type: {e}")))?;
        let values = ca
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.filter(|x| x.is_finite()).ok_or_else(|| {
                    DataError::CacheError(format!("missing price for '{label}' at row {i}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        columns.push(values);
    }

    PriceTable::new(dates, expected_assets.to_vec(), columns)
        .map_err(|e| DataError::CacheError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> PriceTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        PriceTable::new(
            start.iter_days().take(3).collect(),
            vec!["Bitcoin".into(), "Gold".into()],
            vec![vec![42000.5, 43100.25, 41999.0], vec![2050.1, 2049.9, 2061.3]],
        )
        .unwrap()
    }

    fn labels() -> Vec<String> {
        vec!["Bitcoin".into(), "Gold".into()]
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        let table = sample_table();

        let meta = cache.write("abc", &table, DataSource::Synthetic).unwrap();
        assert_eq!(meta.row_count, 3);
        assert_eq!(meta.source, DataSource::Synthetic);

        let loaded = cache.load("abc", &labels()).unwrap().unwrap();
        assert_eq!(loaded.dates(), table.dates());
        for label in labels() {
            let (a, b) = (loaded.column(&label).unwrap(), table.column(&label).unwrap());
            for (x, y) in a.iter().zip(b) {
                assert!((x - y).abs() < 1e-9);
            }
        }
        assert!(!cache.data_path("abc").with_extension("csv.tmp").exists());
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        assert!(cache.load("nope", &labels()).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        cache.write("abc", &sample_table(), DataSource::Cache).unwrap();
        fs::write(cache.data_path("abc"), "date,Bitcoin,Gold\nnot-a-date,1,2\n").unwrap();

        assert!(cache.load("abc", &labels()).unwrap().is_none());
        assert!(!cache.data_path("abc").exists());
        assert!(cache.data_path("abc").with_extension("csv.quarantined").exists());
        assert!(cache.get_meta("abc").is_none());
    }

    #[test]
    fn header_mismatch_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        cache.write("abc", &sample_table(), DataSource::Cache).unwrap();
        let other = vec!["Gold".to_string(), "Bitcoin".to_string()];
        assert!(cache.load("abc", &other).unwrap().is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        cache.write("abc", &sample_table(), DataSource::Cache).unwrap();
        assert!(cache.get_meta("abc").is_some());
        assert!(cache.invalidate("abc").unwrap());
        assert!(!cache.invalidate("abc").unwrap());
        assert!(cache.load("abc", &labels()).unwrap().is_none());
    }
}
