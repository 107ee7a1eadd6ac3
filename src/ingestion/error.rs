//! Error types for fetching and parsing source data

use thiserror::Error;

/// A source could not be fetched. Every variant names the dataset so the
/// run aborts with a message pointing at the failing source.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Upstream unreachable or timed out
    #[error("{dataset}: request to {url} failed: {error}")]
    Request {
        dataset: String,
        url: String,
        #[source]
        error: reqwest::Error,
    },

    /// Upstream answered with a non-success status
    #[error("{dataset}: HTTP {status} from {url}")]
    Status {
        dataset: String,
        url: String,
        status: reqwest::StatusCode,
    },

    /// Body was not the JSON array we expected
    #[error("{dataset}: malformed response: {detail}")]
    Malformed { dataset: String, detail: String },
}

impl FetchError {
    pub fn dataset(&self) -> &str {
        match self {
            FetchError::Request { dataset, .. }
            | FetchError::Status { dataset, .. }
            | FetchError::Malformed { dataset, .. } => dataset,
        }
    }
}

/// A response had the right shape for JSON but not for its dataset
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("{dataset}: response is empty, expected a header row")]
    MissingHeader { dataset: String },

    #[error("{dataset}: header has no '{column}' column")]
    MissingColumn { dataset: String, column: String },
}
