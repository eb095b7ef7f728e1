use std::path::Path;

use async_trait::async_trait;

use crate::api::ApiError;
use crate::job::{JobHandle, StatusSnapshot};

/// A resume file held in memory, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ResumeFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a resume from disk. The file name sent to the service is the
    /// last path component.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume".to_string());
        Ok(Self { file_name, bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What gets analyzed: an uploaded file or already-extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPayload {
    File(ResumeFile),
    Text(String),
}

impl SubmissionPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionPayload::File(_) => "file",
            SubmissionPayload::Text(_) => "text",
        }
    }
}

/// The analysis service as seen by the tracker.
///
/// `fetch_job_status` returns `Ok` for every job-level outcome, including a
/// job the service reports as failed. `Err` means the fetch itself failed.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Create a remote job for `target_id` (the job posting the resume is
    /// scored against).
    async fn submit_job(
        &self,
        target_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<JobHandle, ApiError>;

    async fn fetch_job_status(&self, job_id: &str) -> Result<StatusSnapshot, ApiError>;
}
