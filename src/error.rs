use thiserror::Error;

use crate::api::ApiError;

/// Message delivered when a watch outlives its duration budget.
pub const TIMEOUT_MESSAGE: &str = "Analysis timeout - please check back later or contact support";

/// Fallback when the backend reports a failed job without a message.
pub const JOB_FAILED_FALLBACK: &str = "Analysis failed";

/// Terminal outcomes of an analysis, as seen by the caller.
///
/// The `Display` text of every variant is the message handed to
/// `SessionObserver::on_error`.
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    /// The job-creation call failed. Never retried inside the crate.
    #[error("{0}")]
    Submission(#[source] ApiError),

    /// The request was rejected locally before any network call.
    #[error("{0}")]
    InvalidInput(String),

    /// Consecutive status fetches failed until the retry budget ran out.
    /// Carries the last underlying transport message.
    #[error("{last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ApiError,
    },

    /// The backend finished the job and reported it as failed.
    #[error("{0}")]
    JobFailed(String),

    /// The watch ran longer than `max_duration_ms`.
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout { elapsed_ms: u64 },

    /// The request was overtaken by `reset()` or a newer `start()`.
    #[error("Analysis was cancelled")]
    Superseded,
}

impl AnalysisError {
    /// True for failures that happened before a job id existed.
    pub fn is_submission_stage(&self) -> bool {
        matches!(
            self,
            AnalysisError::Submission(_) | AnalysisError::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
