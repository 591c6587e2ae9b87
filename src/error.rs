use std::{io, path::PathBuf};

use thiserror::Error;

/// The dataset could not be read or parsed. Never partially recovered.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open dataset `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV in dataset: {0}")]
    Csv(#[from] csv::Error),
}

/// Filter or query input rejected before any scan happens.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("month bound `{0}` is not a month number between 1 and 12")]
    InvalidMonth(String),
    #[error("time bound `{0}` is not an HH:MM[:SS] time of day")]
    InvalidTime(String),
    #[error("unknown granularity `{0}` (expected hour, month, week, year or season)")]
    UnknownGranularity(String),
}

/// Failure of one engine call. Either the whole aggregation completes or it fails here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("query source unavailable: {0}")]
    SourceUnavailable(#[from] IngestError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("dataset loader task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// True when the caller sent bad input, as opposed to the dataset being unusable.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Query(_))
    }
}

/// Failure while appending to the entry log.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("entry log io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("entry log csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("entry has no fields")]
    Empty,
}
