use std::time::Duration;

use thiserror::Error;

use crate::job::{JobId, JobResult};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    /// Downstream system unreachable or not yet converged; retry later
    #[error("Transient lookup failure: {0}")]
    TransientLookup(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Job {job_id} still running after {waited:?}")]
    StillRunning { job_id: JobId, waited: Duration },

    #[error("{what} did not converge within {waited:?}")]
    NotConverged { what: String, waited: Duration },

    #[error("Job {} failed with {} failure(s)", .0.job_id, .0.failures.len())]
    JobFailed(Box<JobResult>),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientLookup(_))
    }
}
