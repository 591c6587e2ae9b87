// src/store/mod.rs
use csv::ReaderBuilder;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

use crate::error::{EngineError, IngestError};

/// Column names of a table, shared by every record loaded from it.
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // first occurrence wins on duplicated column names
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row: a value per header column. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<Header>,
    values: Vec<String>,
}

impl Record {
    /// Value of `column`, or `None` when the table has no such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .position(column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Like [`Record::get`] but an absent column reads as the empty string.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    /// `(column, value)` pairs in header order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.header.names() == other.header.names() && self.values == other.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.fields() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Ordered rows sharing one header, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    header: Arc<Header>,
    records: Vec<Record>,
}

impl Table {
    /// Read a CSV file whose first row is the header.
    #[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let file = File::open(&path).map_err(|source| IngestError::Open {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(BufReader::new(file))?;
        info!(
            rows = table.len(),
            columns = table.header.len(),
            "loaded dataset"
        );
        Ok(table)
    }

    /// Same as [`Table::load`], run on the blocking pool.
    pub async fn load_async(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let table = tokio::task::spawn_blocking(move || Self::load(path)).await??;
        Ok(table)
    }

    /// Parse CSV from any reader. Short rows are padded with empty values and
    /// fields past the header width are dropped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // short rows are backfilled below
            .from_reader(reader);

        let names: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();
        let header = Arc::new(Header::new(names));
        let width = header.len();

        let mut records = Vec::new();
        let mut padded = 0usize;
        for result in rdr.records() {
            let row = result?;
            let mut values: Vec<String> = row.iter().take(width).map(str::to_string).collect();
            if values.len() < width {
                padded += 1;
                values.resize(width, String::new());
            }
            records.push(Record {
                header: Arc::clone(&header),
                values,
            });
        }
        if padded > 0 {
            debug!(padded, "backfilled short rows with empty values");
        }

        Ok(Self { header, records })
    }

    /// Build a table directly from rows of values. Rows are normalised to the
    /// header width the same way CSV rows are.
    pub fn from_rows<I, R, S>(columns: &[&str], rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let header = Arc::new(Header::new(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        let width = header.len();
        let records = rows
            .into_iter()
            .map(|row| {
                let mut values: Vec<String> = row.into_iter().take(width).map(Into::into).collect();
                values.resize(width, String::new());
                Record {
                    header: Arc::clone(&header),
                    values,
                }
            })
            .collect();
        Self { header, records }
    }

    /// New table over the same header holding `records`.
    pub(crate) fn with_records(&self, records: Vec<Record>) -> Self {
        Self {
            header: Arc::clone(&self.header),
            records,
        }
    }

    pub fn columns(&self) -> &[String] {
        self.header.names()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
