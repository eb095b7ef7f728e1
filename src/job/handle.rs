use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::parse_timestamp;

/// A submitted analysis job. Created once on successful submission and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque id assigned by the service.
    pub job_id: String,
    /// Human-readable hint such as "30-60 seconds". Informational only.
    pub estimated_completion: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Submission response as it arrives on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    pub job_id: Option<String>,
    #[serde(default)]
    pub estimated_completion: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            estimated_completion: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_estimate(mut self, estimate: impl Into<String>) -> Self {
        self.estimated_completion = Some(estimate.into());
        self
    }

    /// Build a handle from a submission response. A missing or empty job id
    /// is an error; an unreadable `created_at` falls back to now.
    pub(crate) fn from_response(resp: SubmitResponse) -> Result<Self, String> {
        let job_id = match resp.job_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err("submission response is missing job_id".to_string()),
        };

        let created_at = resp
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            job_id,
            estimated_completion: resp.estimated_completion,
            created_at,
        })
    }
}
