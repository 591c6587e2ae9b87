// src/entries.rs
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::{
    fmt,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{info, warn};

use crate::error::EntryError;

/// A user-submitted incident: field name -> value, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry(pub Vec<(String, String)>);

impl Entry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = Entry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a flat JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Entry, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    fields.push((key, value));
                }
                Ok(Entry(fields))
            }
        }

        deserializer.deserialize_map(EntryVisitor)
    }
}

/// Append-only CSV of submitted entries. The first entry written decides the header.
#[derive(Debug)]
pub struct EntryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EntryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the file with a header when it does not exist yet.
    pub fn append(&self, entry: &Entry) -> Result<(), EntryError> {
        if entry.0.is_empty() {
            return Err(EntryError::Empty);
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self.read_header()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        let mut wtr = WriterBuilder::new().from_writer(file);

        let row: Vec<&str> = match &existing {
            Some(header) => {
                for (k, _) in &entry.0 {
                    if !header.contains(k) {
                        warn!(field = %k, "dropping entry field not present in log header");
                    }
                }
                header
                    .iter()
                    .map(|h| entry.get(h).unwrap_or(""))
                    .collect()
            }
            None => {
                wtr.write_record(entry.0.iter().map(|(k, _)| k.as_str()))?;
                info!(path = %self.path.display(), "created entry log");
                entry.0.iter().map(|(_, v)| v.as_str()).collect()
            }
        };
        wtr.write_record(&row)?;
        wtr.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }

    fn read_header(&self) -> Result<Option<Vec<String>>, EntryError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);
        let header: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        Ok((!header.is_empty()).then_some(header))
    }

    fn io_error(&self, source: std::io::Error) -> EntryError {
        EntryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn entry(json: &str) -> Entry {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_entry_keeps_submission_order_and_stringifies() {
        let e = entry(r#"{"z":"1","latitude":12.5,"note":null}"#);
        assert_eq!(
            e.0,
            vec![
                ("z".to_string(), "1".to_string()),
                ("latitude".to_string(), "12.5".to_string()),
                ("note".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_first_append_writes_header() {
        let tmp = tempdir().unwrap();
        let log = EntryLog::new(tmp.path().join("entries.csv"));
        log.append(&entry(r#"{"crime":"Theft","place":"Main St, 4"}"#))
            .unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "crime,place\nTheft,\"Main St, 4\"\n");
    }

    #[test]
    fn test_later_appends_follow_existing_header() {
        let tmp = tempdir().unwrap();
        let log = EntryLog::new(tmp.path().join("entries.csv"));
        log.append(&entry(r#"{"crime":"Theft","place":"A"}"#)).unwrap();
        log.append(&entry(r#"{"place":"B","extra":"x"}"#)).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "crime,place\nTheft,A\n,B\n");
    }

    #[test]
    fn test_empty_entry_rejected() {
        let tmp = tempdir().unwrap();
        let log = EntryLog::new(tmp.path().join("entries.csv"));
        assert!(matches!(log.append(&Entry::default()), Err(EntryError::Empty)));
        assert!(!log.path().exists());
    }
}
