// src/rank.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::store::Record;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-,\s]*$").unwrap());

/// True for values made only of hyphens, commas and whitespace (including "").
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub freq: u64,
}

/// Counts in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct Counter {
    entries: Vec<FrequencyEntry>,
    index: HashMap<String, usize>,
}

impl Counter {
    pub(crate) fn add(&mut self, value: &str) {
        match self.index.get(value) {
            Some(&i) => self.entries[i].freq += 1,
            None => {
                self.index.insert(value.to_string(), self.entries.len());
                self.entries.push(FrequencyEntry {
                    value: value.to_string(),
                    freq: 1,
                });
            }
        }
    }

    pub(crate) fn into_entries(self) -> Vec<FrequencyEntry> {
        self.entries
    }

    /// Highest counts first; ties keep first-seen order.
    pub(crate) fn into_ranked(self, n: usize) -> Vec<FrequencyEntry> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.freq.cmp(&a.freq));
        entries.truncate(n);
        entries
    }
}

fn counts<'a>(
    rows: impl IntoIterator<Item = &'a Record>,
    column: &str,
    exclude_placeholder: bool,
) -> Counter {
    let mut counter = Counter::default();
    for row in rows {
        let v = match row.get(column) {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        if exclude_placeholder && is_placeholder(v) {
            continue;
        }
        counter.add(v);
    }
    counter
}

/// value -> count over `column`, first-seen order. Empty values never count.
pub fn frequencies<'a>(
    rows: impl IntoIterator<Item = &'a Record>,
    column: &str,
    exclude_placeholder: bool,
) -> Vec<FrequencyEntry> {
    counts(rows, column, exclude_placeholder).into_entries()
}

/// The `n` most frequent values of `column`, by descending count.
pub fn top_n<'a>(
    rows: impl IntoIterator<Item = &'a Record>,
    column: &str,
    n: usize,
    exclude_placeholder: bool,
) -> Vec<FrequencyEntry> {
    counts(rows, column, exclude_placeholder).into_ranked(n)
}

/// A top latitude paired with the most frequent longitude seen at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatePair {
    pub latitude: String,
    pub longitude: Option<String>,
    /// Rows at this latitude.
    pub freq: u64,
}

/// Rank latitudes, then rank longitudes separately among the rows at each
/// top latitude. This is not a joint count of (latitude, longitude) pairs.
pub fn top_coordinate_pairs(
    rows: &[Record],
    lat_column: &str,
    lon_column: &str,
    n: usize,
) -> Vec<CoordinatePair> {
    top_n(rows, lat_column, n, true)
        .into_iter()
        .map(|lat| {
            let at_lat = rows.iter().filter(|r| r.value(lat_column) == lat.value);
            let longitude = top_n(at_lat, lon_column, 1, true)
                .into_iter()
                .next()
                .map(|e| e.value);
            CoordinatePair {
                latitude: lat.value,
                longitude,
                freq: lat.freq,
            }
        })
        .collect()
}
