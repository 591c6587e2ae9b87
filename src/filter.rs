// src/filter.rs
use serde::Deserialize;

use crate::{
    config::Columns,
    error::QueryError,
    store::{Record, Table},
};

/// A condition on one column. Predicates in a list are AND-ed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact match. An absent or empty `expected` matches every row.
    Equals {
        column: String,
        expected: Option<String>,
    },
    /// Inclusive lexicographic range over zero-padded `HH:MM:SS` strings.
    /// A range that wraps midnight (`start > end`) matches nothing.
    TimeRange {
        column: String,
        start: String,
        end: String,
    },
    /// Inclusive range over the month component of a `YYYY-MM-DD` date column.
    MonthRange { column: String, start: u32, end: u32 },
}

impl Predicate {
    pub fn equals(column: impl Into<String>, expected: impl Into<String>) -> Self {
        Predicate::Equals {
            column: column.into(),
            expected: Some(expected.into()),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Equals { column, expected } => match expected.as_deref() {
                None | Some("") => true,
                Some(want) => record.value(column) == want,
            },
            Predicate::TimeRange { column, start, end } => {
                let v = record.value(column);
                start.as_str() <= v && v <= end.as_str()
            }
            Predicate::MonthRange { column, start, end } => match month_of(record.value(column))
            {
                Some(m) => *start <= m && m <= *end,
                None => false,
            },
        }
    }
}

/// Month component of a `YYYY-MM-DD`-shaped value (the second `-` segment).
pub fn month_of(date: &str) -> Option<u32> {
    date.split('-').nth(1)?.trim().parse().ok()
}

/// Rows of `table` matching every predicate, in table order.
pub fn filter(table: &Table, predicates: &[Predicate]) -> Table {
    let active: Vec<&Predicate> = predicates
        .iter()
        .filter(|p| {
            !matches!(
                p,
                Predicate::Equals {
                    expected: None,
                    ..
                }
            )
        })
        .collect();
    if active.is_empty() {
        return table.clone();
    }
    let records = table
        .records()
        .iter()
        .filter(|r| active.iter().all(|p| p.matches(r)))
        .cloned()
        .collect();
    table.with_records(records)
}

/// A month bound as the dashboard sends it: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MonthBound {
    Number(i64),
    /// `3.0` from JS number widgets; only whole values are months.
    Float(f64),
    Text(String),
}

impl MonthBound {
    fn parse(&self) -> Result<u32, QueryError> {
        let (raw, n) = match self {
            MonthBound::Number(n) => (n.to_string(), Some(*n)),
            MonthBound::Float(f) => (f.to_string(), (f.fract() == 0.0).then_some(*f as i64)),
            MonthBound::Text(s) => (s.clone(), s.trim().parse::<i64>().ok()),
        };
        match n {
            Some(m) if (1..=12).contains(&m) => Ok(m as u32),
            _ => Err(QueryError::InvalidMonth(raw)),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, MonthBound::Text(s) if s.trim().is_empty())
    }
}

impl From<i32> for MonthBound {
    fn from(m: i32) -> Self {
        MonthBound::Number(m.into())
    }
}

impl From<String> for MonthBound {
    fn from(s: String) -> Self {
        MonthBound::Text(s)
    }
}

/// The optional filters a dashboard request may carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    #[serde(alias = "selectedDistrict")]
    pub district: Option<String>,
    #[serde(alias = "selectedUnit")]
    pub unit: Option<String>,
    pub beat: Option<String>,
    pub start_month: Option<MonthBound>,
    pub end_month: Option<MonthBound>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl Filters {
    pub fn district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn beat(mut self, beat: impl Into<String>) -> Self {
        self.beat = Some(beat.into());
        self
    }

    pub fn months(mut self, start: impl Into<MonthBound>, end: impl Into<MonthBound>) -> Self {
        self.start_month = Some(start.into());
        self.end_month = Some(end.into());
        self
    }

    pub fn times(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self.end_time = Some(end.into());
        self
    }

    /// Validate and translate into predicates. A month range takes precedence
    /// over a time range; either only applies when both of its bounds are set.
    pub fn predicates(&self, columns: &Columns) -> Result<Vec<Predicate>, QueryError> {
        let mut out = vec![
            Predicate::Equals {
                column: columns.district.clone(),
                expected: self.district.clone(),
            },
            Predicate::Equals {
                column: columns.unit.clone(),
                expected: self.unit.clone(),
            },
            Predicate::Equals {
                column: columns.beat.clone(),
                expected: self.beat.clone(),
            },
        ];

        let months = (
            self.start_month.as_ref().filter(|b| !b.is_blank()),
            self.end_month.as_ref().filter(|b| !b.is_blank()),
        );
        let times = (
            non_empty(self.start_time.as_deref()),
            non_empty(self.end_time.as_deref()),
        );

        if let (Some(start), Some(end)) = months {
            out.push(Predicate::MonthRange {
                column: columns.date.clone(),
                start: start.parse()?,
                end: end.parse()?,
            });
        } else if let (Some(start), Some(end)) = times {
            out.push(Predicate::TimeRange {
                column: columns.time.clone(),
                start: parse_time_bound(start)?,
                end: parse_time_bound(end)?,
            });
        }
        Ok(out)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts `HH:MM` or `HH:MM:SS`; `HH:MM` is widened to `HH:MM:00` so it
/// compares correctly against full time values.
fn parse_time_bound(raw: &str) -> Result<String, QueryError> {
    let parts: Vec<&str> = raw.split(':').collect();
    let well_formed = matches!(parts.len(), 2 | 3)
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(QueryError::InvalidTime(raw.to_string()));
    }
    Ok(if parts.len() == 2 {
        format!("{}:00", raw)
    } else {
        raw.to_string()
    })
}
