use crate::{duckdb::DuckDB, error::DatasetUnavailable, table::Table};
use std::{env, path::PathBuf};

pub const DEFAULT_DATASET_PATH: &str = "sample_rows.csv";

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATASET_PATH),
        }
    }
}

impl DatasetConfig {
    /// `DATASET_PATH` overrides the default location.
    pub fn from_env() -> Self {
        match env::var("DATASET_PATH") {
            Ok(path) if !path.trim().is_empty() => Self {
                path: PathBuf::from(path.trim()),
            },
            _ => Self::default(),
        }
    }
}

/// Anything the search can pull a fresh table from.
pub trait TableSource: Send + Sync {
    fn load(&self) -> Result<Table, DatasetUnavailable>;
}

impl TableSource for Table {
    fn load(&self) -> Result<Table, DatasetUnavailable> {
        Ok(self.clone())
    }
}

/// The company register stored as a CSV file, re-read on every load.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    config: DatasetConfig,
}

impl CsvDataset {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }
}

impl TableSource for CsvDataset {
    fn load(&self) -> Result<Table, DatasetUnavailable> {
        let path = &self.config.path;
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "dataset file not found");
            return Err(DatasetUnavailable::NotFound(path.clone()));
        }

        let unreadable = |e: anyhow::Error| DatasetUnavailable::Unreadable {
            path: path.clone(),
            reason: format!("{:#}", e),
        };

        let db = DuckDB::new_in_memory().map_err(unreadable)?;
        let table = db.read_csv(path).map_err(unreadable)?;

        tracing::debug!(path = %path.display(), rows = table.len(), "dataset loaded");
        Ok(table)
    }
}
