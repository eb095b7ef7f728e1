use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One validated poll result.
///
/// `result` is only set for completed jobs and `error` only for failed ones.
/// `progress` is passed through as reported: a value lower than the previous
/// poll is not clamped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Status response as it arrives on the wire, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: Option<String>,
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl StatusSnapshot {
    pub fn pending(progress: u8) -> Self {
        Self::with_status(JobStatus::Pending, progress)
    }

    pub fn processing(progress: u8) -> Self {
        Self::with_status(JobStatus::Processing, progress)
    }

    pub fn completed(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::with_status(JobStatus::Completed, 100)
        }
    }

    pub fn failed(error: Option<String>, progress: u8) -> Self {
        Self {
            error,
            ..Self::with_status(JobStatus::Failed, progress)
        }
    }

    fn with_status(status: JobStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            result: None,
            error: None,
            updated_at: None,
        }
    }

    /// Validate a wire response into a snapshot.
    ///
    /// Rejected shapes: unknown or missing status, missing or out-of-range
    /// progress, and a completed status without a result. Fields that do not
    /// belong to the reported status are dropped.
    pub(crate) fn from_response(resp: StatusResponse) -> Result<Self, String> {
        let status: JobStatus = resp
            .status
            .as_deref()
            .ok_or_else(|| "status response is missing status".to_string())?
            .parse()?;

        let progress = match resp.progress {
            Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => p.floor() as u8,
            Some(p) => return Err(format!("progress {} is outside 0-100", p)),
            None => return Err("status response is missing progress".to_string()),
        };

        let result = match status {
            JobStatus::Completed => match resp.result {
                Some(Value::Null) | None => {
                    return Err("completed status without a result".to_string())
                }
                Some(value) => Some(value),
            },
            _ => None,
        };

        let error = match status {
            JobStatus::Failed => resp.error.filter(|e| !e.trim().is_empty()),
            _ => None,
        };

        Ok(Self {
            status,
            progress,
            result,
            error,
            updated_at: resp.updated_at.as_deref().and_then(parse_timestamp),
        })
    }
}
