use std::{fmt, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Reasons a provider response is rejected before anything is stored.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Wrong from currency: expected {expected}, got {actual}")]
    UnexpectedBaseCurrency { expected: String, actual: String },

    #[error("Wrong number of converted currencies: got {actual} instead of {expected}")]
    QuoteCountMismatch { expected: usize, actual: usize },

    #[error("Malformed quote #{index} ({record}): {reason}")]
    MalformedQuote {
        index: usize,
        record: String,
        reason: String,
    },

    #[error(
        "Quoted currencies don't match the configured set \
         (missing: {missing:?}, unexpected: {unexpected:?}, duplicated: {duplicated:?})"
    )]
    QuoteSetMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
        duplicated: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Can't reach the rate provider: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Rate provider responded with status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Can't decode rate provider response ({source}): {body}")]
    UndecodableResponse {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Run timed out after {0:?}")]
    TimedOut(Duration),
}

/// The pipeline stage a run was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Validating,
    Storing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetch",
            Stage::Validating => "validate",
            Stage::Storing => "store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {error}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}
