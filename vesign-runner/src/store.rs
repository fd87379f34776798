//! CSV table store rooted at the output directory.
//!
//! Each table is one `{name}.csv` file. Writes go to a temp file that is
//! renamed into place, so a reader sees either the old table or the new
//! one. Dated tables are updated by replacing a `[start, end]` window:
//! rows outside the window survive, rows inside it are exactly the
//! incoming batch.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use vesign_core::domain::Dated;
use vesign_core::DatedTable;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> StoreError + '_ {
    move |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table_path(name).exists()
    }

    /// All rows of a table; a table that was never written is empty.
    pub fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.table_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path).map_err(csv_err(&path))?;
        reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(csv_err(&path))
    }

    /// Overwrite a table with `rows`.
    pub fn write_table<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        let path = self.table_path(name);
        let mut wtr = csv::Writer::from_writer(vec![]);
        for row in rows {
            wtr.serialize(row).map_err(csv_err(&path))?;
        }
        let bytes = wtr.into_inner().map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e.into_error(),
        })?;
        self.write_atomic(&path, &bytes)
    }

    /// Replace the rows dated within the span of `incoming`.
    ///
    /// An empty batch leaves the table untouched. Returns the table's new
    /// row count.
    pub fn replace_window<T>(&self, name: &str, incoming: Vec<T>) -> Result<usize, StoreError>
    where
        T: Dated + Serialize + DeserializeOwned,
    {
        let mut table = DatedTable::from_rows(self.read_table(name)?);
        table.replace_window(incoming);
        self.write_table(name, table.rows())?;
        Ok(table.len())
    }

    /// Replace the rows dated within `[start, end]` with `incoming`.
    pub fn replace_range<T>(
        &self,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
        incoming: Vec<T>,
    ) -> Result<usize, StoreError>
    where
        T: Dated + Serialize + DeserializeOwned,
    {
        let mut table = DatedTable::from_rows(self.read_table(name)?);
        table.replace_range(start, end, incoming);
        self.write_table(name, table.rows())?;
        Ok(table.len())
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&path, &json)
    }

    pub fn write_text(&self, name: &str, content: &str) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        self.write_atomic(&path, content.as_bytes())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
        fs::rename(&tmp, path).map_err(io_err(path))
    }
}
