//! One-shot job creation.

use std::sync::Arc;

use crate::api::{JobBackend, ResumeFile, SubmissionPayload};
use crate::config::FileRules;
use crate::error::{AnalysisError, Result};
use crate::job::JobHandle;

/// A request to analyze one resume against one job posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInput {
    /// Id of the job posting the resume is scored against.
    pub target_id: String,
    pub payload: SubmissionPayload,
}

impl AnalysisInput {
    pub fn file(target_id: impl Into<String>, file: ResumeFile) -> Self {
        Self {
            target_id: target_id.into(),
            payload: SubmissionPayload::File(file),
        }
    }

    pub fn text(target_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            payload: SubmissionPayload::Text(text.into()),
        }
    }
}

/// Creates remote jobs. Exactly one backend call per submission, no retry.
#[derive(Clone)]
pub struct JobSubmitter {
    backend: Arc<dyn JobBackend>,
    rules: FileRules,
}

impl JobSubmitter {
    pub fn new(backend: Arc<dyn JobBackend>, rules: FileRules) -> Self {
        Self { backend, rules }
    }

    pub async fn submit_with_file(&self, target_id: &str, file: ResumeFile) -> Result<JobHandle> {
        self.submit(target_id, &SubmissionPayload::File(file)).await
    }

    pub async fn submit_with_text(&self, target_id: &str, text: &str) -> Result<JobHandle> {
        self.submit(target_id, &SubmissionPayload::Text(text.to_string()))
            .await
    }

    pub async fn submit_input(&self, input: &AnalysisInput) -> Result<JobHandle> {
        self.submit(&input.target_id, &input.payload).await
    }

    async fn submit(&self, target_id: &str, payload: &SubmissionPayload) -> Result<JobHandle> {
        self.check(target_id, payload)?;

        tracing::info!(target_id, kind = payload.kind(), "Submitting analysis job");

        match self.backend.submit_job(target_id, payload).await {
            Ok(handle) => {
                tracing::info!(
                    target_id,
                    job_id = %handle.job_id,
                    estimated_completion = ?handle.estimated_completion,
                    "Analysis job submitted"
                );
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(target_id, error = %e, "Analysis job submission failed");
                Err(AnalysisError::Submission(e))
            }
        }
    }

    fn check(&self, target_id: &str, payload: &SubmissionPayload) -> Result<()> {
        if target_id.trim().is_empty() {
            return Err(AnalysisError::InvalidInput(
                "A job id is required to analyze a resume".to_string(),
            ));
        }

        match payload {
            SubmissionPayload::File(file) => self
                .rules
                .validate(&file.file_name, file.len())
                .map_err(AnalysisError::InvalidInput),
            SubmissionPayload::Text(text) if text.trim().is_empty() => Err(
                AnalysisError::InvalidInput("Resume text is empty".to_string()),
            ),
            SubmissionPayload::Text(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::job::StatusSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl JobBackend for CountingBackend {
        async fn submit_job(
            &self,
            target_id: &str,
            _payload: &SubmissionPayload,
        ) -> std::result::Result<JobHandle, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::network("connection reset"))
            } else {
                Ok(JobHandle::new(format!("job-for-{}", target_id)))
            }
        }

        async fn fetch_job_status(
            &self,
            _job_id: &str,
        ) -> std::result::Result<StatusSnapshot, ApiError> {
            unreachable!("submitter never polls")
        }
    }

    fn submitter(fail: bool) -> (JobSubmitter, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend {
            calls: AtomicUsize::new(0),
            fail,
        });
        (
            JobSubmitter::new(backend.clone(), FileRules::default()),
            backend,
        )
    }

    #[tokio::test]
    async fn submit_text_returns_handle() {
        let (submitter, backend) = submitter(false);
        let handle = submitter.submit_with_text("job_1", "Rust dev").await.unwrap();
        assert_eq!(handle.job_id, "job-for-job_1");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_file_returns_handle() {
        let (submitter, _backend) = submitter(false);
        let file = ResumeFile::new("cv.pdf", b"%PDF-1.4".to_vec());
        let handle = submitter.submit_with_file("job_2", file).await.unwrap();
        assert_eq!(handle.job_id, "job-for-job_2");
    }

    #[tokio::test]
    async fn backend_failure_is_not_retried() {
        let (submitter, backend) = submitter(true);
        let err = submitter
            .submit_input(&AnalysisInput::text("job_1", "Rust dev"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Submission(_)));
        assert_eq!(err.to_string(), "Network error: connection reset");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_file_never_reaches_backend() {
        let (submitter, backend) = submitter(false);
        let file = ResumeFile::new("photo.png", vec![0; 16]);
        let err = submitter.submit_with_file("job_1", file).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_text_and_target_are_rejected() {
        let (submitter, backend) = submitter(false);
        assert!(submitter.submit_with_text("job_1", "  ").await.is_err());
        assert!(submitter.submit_with_text("", "Rust dev").await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
