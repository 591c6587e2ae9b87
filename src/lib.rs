//! Crime dataset aggregation: load a CSV export, filter it by district, unit,
//! beat, month or time of day, and answer the dashboard's ranking and
//! time-series questions over the result.

pub mod bucket;
pub mod config;
pub mod entries;
pub mod error;
pub mod filter;
pub mod query;
pub mod rank;
pub mod report;
pub mod server;
pub mod store;

pub use config::{Columns, Config};
pub use error::{EngineError, IngestError, QueryError};
pub use filter::{filter, Filters, Predicate};
pub use query::{Engine, Granularity, TimeSeries};
pub use store::{Record, Table};
