// src/query/mod.rs
//! Dashboard questions answered over a [`Table`]: distinct listings, top-N
//! breakdowns, per-column frequency tables and time series.
//!
//! The free functions work on an already filtered slice of records. [`Engine`]
//! wraps them for callers: it validates filters, re-reads the dataset on every
//! call (there is no cache) and then aggregates.

mod summary;

pub use summary::{detail_summary, DetailSummary, Demographics, GeoPoint};

use serde::{
    ser::{SerializeMap, Serializer},
    Serialize,
};
use std::{collections::HashSet, str::FromStr, sync::Arc};
use tracing::info;

use crate::{
    bucket::{self, Bucket, HourBucket},
    config::{Columns, Config},
    error::{EngineError, QueryError},
    filter::{filter, Filters},
    rank::{self, FrequencyEntry},
    store::{Record, Table},
};

/// Top-N used by the detail summary's main breakdowns.
pub const DEFAULT_TOP_N: usize = 10;

/// Rows per page of the heatmap feed.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Distinct values of `column`, first occurrence order.
pub fn distinct_values(rows: &[Record], column: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(|r| r.value(column))
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Unranked value counts for every column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    pub columns: Vec<(String, Vec<FrequencyEntry>)>,
}

/// Serialized as `{column: {value: count}}`, both levels in first-seen order.
impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Values<'a>(&'a [FrequencyEntry]);
        impl Serialize for Values<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for e in self.0 {
                    map.serialize_entry(&e.value, &e.freq)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, entries) in &self.columns {
            map.serialize_entry(column, &Values(entries))?;
        }
        map.end()
    }
}

/// value -> count for each column in header order. Every value counts,
/// blanks and placeholders included.
pub fn full_frequency_table(table: &Table) -> FrequencyTable {
    let columns = table
        .columns()
        .iter()
        .map(|c| {
            let mut counter = rank::Counter::default();
            for r in table.records() {
                counter.add(r.value(c));
            }
            (c.clone(), counter.into_entries())
        })
        .collect();
    FrequencyTable { columns }
}

/// A coordinate equal to zero marks an ungeocoded row. Blank or non-numeric
/// coordinates are not zero and stay in.
fn off_origin(record: &Record, columns: &Columns) -> bool {
    [&columns.latitude, &columns.longitude].iter().all(|c| {
        record
            .value(c)
            .trim()
            .parse::<f64>()
            .map_or(true, |v| v != 0.0)
    })
}

/// One 1-based page of the rows that have a non-zero latitude and longitude.
/// Page 0 and pages past the end are empty.
pub fn page_rows(rows: &[Record], columns: &Columns, page: usize, per_page: usize) -> Vec<Record> {
    let Some(skip) = page.checked_sub(1).map(|p| p.saturating_mul(per_page)) else {
        return Vec::new();
    };
    rows.iter()
        .filter(|r| off_origin(r, columns))
        .skip(skip)
        .take(per_page)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Month,
    Week,
    Year,
    Season,
}

impl FromStr for Granularity {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Granularity::Hour),
            "month" => Ok(Granularity::Month),
            "week" => Ok(Granularity::Week),
            "year" => Ok(Granularity::Year),
            "season" => Ok(Granularity::Season),
            _ => Err(QueryError::UnknownGranularity(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TimeSeries {
    Hourly(Vec<HourBucket>),
    Buckets(Vec<Bucket>),
}

pub fn time_series(rows: &[Record], columns: &Columns, granularity: Granularity) -> TimeSeries {
    match granularity {
        Granularity::Hour => {
            TimeSeries::Hourly(bucket::bucket_by_hour(rows, &columns.time, &columns.crime_type))
        }
        Granularity::Month => TimeSeries::Buckets(bucket::bucket_by_month(rows, &columns.date)),
        Granularity::Week => TimeSeries::Buckets(bucket::bucket_by_week(rows, &columns.date)),
        Granularity::Year => TimeSeries::Buckets(bucket::bucket_by_year(rows, &columns.date)),
        Granularity::Season => TimeSeries::Buckets(bucket::bucket_by_season(rows, &columns.date)),
    }
}

/// Answers dashboard queries against the configured dataset. Every call
/// reloads the CSV, so edits to the file are visible on the next request.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<Config>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn columns(&self) -> &Columns {
        &self.config.columns
    }

    /// Validate `filters`, load the dataset and apply them.
    async fn filtered(&self, filters: &Filters) -> Result<Table, EngineError> {
        let predicates = filters.predicates(self.columns())?;
        let table = Table::load_async(self.config.dataset_path.clone()).await?;
        let out = filter(&table, &predicates);
        info!(total = table.len(), matched = out.len(), "filtered dataset");
        Ok(out)
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn list_distinct_values(
        &self,
        column: &str,
        filters: &Filters,
    ) -> Result<Vec<String>, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(distinct_values(table.records(), column))
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn rank_top_n(
        &self,
        column: &str,
        n: usize,
        filters: &Filters,
    ) -> Result<Vec<FrequencyEntry>, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(rank::top_n(table.records(), column, n, true))
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn full_frequency(&self, filters: &Filters) -> Result<FrequencyTable, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(full_frequency_table(&table))
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn bucketed_counts(
        &self,
        granularity: Granularity,
        filters: &Filters,
    ) -> Result<TimeSeries, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(time_series(table.records(), self.columns(), granularity))
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn detail_summary(&self, filters: &Filters) -> Result<DetailSummary, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(detail_summary(table.records(), self.columns(), DEFAULT_TOP_N))
    }

    /// The matching rows themselves, e.g. every record of one beat.
    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn matching_rows(&self, filters: &Filters) -> Result<Vec<Record>, EngineError> {
        Ok(self.filtered(filters).await?.into_records())
    }

    /// A page of the heatmap feed, see [`page_rows`].
    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn page_rows(
        &self,
        page: usize,
        per_page: usize,
        filters: &Filters,
    ) -> Result<Vec<Record>, EngineError> {
        let table = self.filtered(filters).await?;
        Ok(page_rows(table.records(), self.columns(), page, per_page))
    }
}
