// src/bucket.rs
use chrono::{Datelike, NaiveDate};
use serde::{
    ser::{SerializeMap, Serializer},
    Serialize,
};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

use crate::{filter::month_of, rank::Counter, store::Record};

/// Hour-of-day bucket. All 24 are always emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    #[serde(skip)]
    pub hour: u32,
    /// `"{hour}:00"`, e.g. `"9:00"`.
    #[serde(rename = "hour")]
    pub label: String,
    pub count: u64,
    /// Up to three `"value (count)"` entries joined by `", "`, or `"No data"`.
    pub top_crimes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn from_month(month: u32) -> Option<Self> {
        match month {
            12 | 1 | 2 => Some(Season::Winter),
            3..=5 => Some(Season::Spring),
            6..=8 => Some(Season::Summer),
            9..=11 => Some(Season::Fall),
            _ => None,
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum BucketKey {
    Number(i32),
    Season(Season),
}

/// A sparse time bucket: only observed keys are emitted, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// JSON name of the key, e.g. `"month"`.
    pub field: &'static str,
    pub key: BucketKey,
    pub count: u64,
}

/// `{"month": 3, "count": 2}`, keyed by the bucket's own field name.
impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.field, &self.key)?;
        map.serialize_entry("count", &self.count)?;
        map.end()
    }
}

const HOURS: u32 = 24;
const TOP_CRIMES_PER_HOUR: usize = 3;

/// Integer before the first `:` of a time value, if it is a valid hour.
pub fn hour_of(time: &str) -> Option<u32> {
    let h: u32 = time.split(':').next()?.trim().parse().ok()?;
    (h < HOURS).then_some(h)
}

/// Calendar date from the leading `YYYY-MM-DD` of a value; any trailing
/// time part after a space or `T` is ignored.
pub fn date_of(value: &str) -> Option<NaiveDate> {
    let day = value
        .trim()
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Week of year as `ceil((days_since_jan_1 + 1) / 7)`, so Jan 1 is week 1 and
/// Dec 31 can be week 53. Deliberately not ISO-8601.
pub fn week_of_year(date: NaiveDate) -> u32 {
    let year_start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
    let days = (date - year_start).num_days() as u32;
    (days + 1).div_ceil(7)
}

/// Year from the first `-` segment of a date value.
pub fn year_of(date: &str) -> Option<i32> {
    date.split('-').next()?.trim().parse().ok()
}

/// Count rows per hour of `time_column`, with the top crime types of each hour.
pub fn bucket_by_hour(rows: &[Record], time_column: &str, crime_column: &str) -> Vec<HourBucket> {
    let mut counts = [0u64; HOURS as usize];
    let mut crimes: Vec<Counter> = (0..HOURS).map(|_| Counter::default()).collect();
    let mut skipped = 0usize;

    for row in rows {
        let Some(hour) = hour_of(row.value(time_column)) else {
            skipped += 1;
            continue;
        };
        counts[hour as usize] += 1;
        let crime = match row.value(crime_column) {
            "" => "Unknown",
            c => c,
        };
        crimes[hour as usize].add(crime);
    }
    if skipped > 0 {
        debug!(skipped, column = time_column, "rows without a usable hour");
    }

    crimes
        .into_iter()
        .enumerate()
        .map(|(h, counter)| {
            let top = counter.into_ranked(TOP_CRIMES_PER_HOUR);
            let top_crimes = if top.is_empty() {
                "No data".to_string()
            } else {
                top.iter()
                    .map(|e| format!("{} ({})", e.value, e.freq))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            HourBucket {
                hour: h as u32,
                label: format!("{}:00", h),
                count: counts[h],
                top_crimes,
            }
        })
        .collect()
}

fn sparse<K: Ord>(
    rows: &[Record],
    column: &str,
    field: &'static str,
    key_of: impl Fn(&str) -> Option<K>,
    to_key: impl Fn(K) -> BucketKey,
) -> Vec<Bucket> {
    let mut counts: BTreeMap<K, u64> = BTreeMap::new();
    let mut skipped = 0usize;
    for row in rows {
        match key_of(row.value(column)) {
            Some(k) => *counts.entry(k).or_insert(0) += 1,
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, column, "rows without a usable date");
    }
    counts
        .into_iter()
        .map(|(k, count)| Bucket {
            field,
            key: to_key(k),
            count,
        })
        .collect()
}

/// Month number of a date value, only when it is a real month.
fn calendar_month(date: &str) -> Option<u32> {
    month_of(date).filter(|m| (1..=12).contains(m))
}

/// Counts per month number (1-12) of `date_column`.
pub fn bucket_by_month(rows: &[Record], date_column: &str) -> Vec<Bucket> {
    sparse(rows, date_column, "month", calendar_month, |m| {
        BucketKey::Number(m as i32)
    })
}

/// Counts per approximate week of year, see [`week_of_year`].
pub fn bucket_by_week(rows: &[Record], date_column: &str) -> Vec<Bucket> {
    sparse(
        rows,
        date_column,
        "week",
        |v| date_of(v).map(week_of_year),
        |w| BucketKey::Number(w as i32),
    )
}

pub fn bucket_by_year(rows: &[Record], date_column: &str) -> Vec<Bucket> {
    sparse(rows, date_column, "year", year_of, BucketKey::Number)
}

/// Counts per season, Winter first.
pub fn bucket_by_season(rows: &[Record], date_column: &str) -> Vec<Bucket> {
    sparse(
        rows,
        date_column,
        "season",
        |v| calendar_month(v).and_then(Season::from_month),
        BucketKey::Season,
    )
}
