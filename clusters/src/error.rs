//! Closed error taxonomy for the clustering engine (spec §7).

use thiserror::Error;

/// Every failure mode the core can produce. Kept as a closed enum on purpose:
/// callers match on it rather than on string content.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("recursion limit exceeded while clusterizing")]
    RecursionLimitExceeded,

    #[error("log-score validation mismatch: {0}")]
    LogScoreMismatch(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
