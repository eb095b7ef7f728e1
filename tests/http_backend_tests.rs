//! `HttpBackend` and `AnalysisSession` against the mock service over real HTTP.


use std::sync::Arc;
use std::time::Duration;

use analysis_tracker::api::{ApiError, HttpBackend, JobBackend, ResumeFile, SubmissionPayload};
use analysis_tracker::config::{ApiConfig, ClientConfig, PollConfig};
use analysis_tracker::job::JobStatus;
use analysis_tracker::mock_server::{MockBackendState, MockConfig};
use analysis_tracker::session::{AnalysisSession, SessionStatus};
use analysis_tracker::submitter::AnalysisInput;
use test_harness::{MockService, RecordingObserver};

fn fast_polling() -> PollConfig {
    PollConfig::default()
        .with_interval_ms(20)
        .with_max_duration_ms(10_000)
}

fn session_for(service: &MockService, polling: PollConfig) -> (AnalysisSession, RecordingObserver) {
    let config = ClientConfig::new(service.base_url()).with_polling(polling);
    let backend: Arc<dyn JobBackend> = Arc::new(HttpBackend::new(config.api.clone()).unwrap());
    let observer = RecordingObserver::new();
    let session = AnalysisSession::with_observer(backend, &config, observer.clone());
    (session, observer)
}

#[tokio::test]
async fn health_check_reports_service_up() {
    let service = MockService::start(MockBackendState::default()).await;
    let backend = HttpBackend::new(ApiConfig::new(format!("{}/", service.base_url()))).unwrap();

    assert_eq!(backend.config().base_url, service.base_url());
    assert!(backend.health_check().await.unwrap());
    service.stop().await;
}

#[tokio::test]
async fn text_submission_and_status_progression() {
    let service = MockService::start(MockBackendState::default()).await;
    let backend = HttpBackend::new(ApiConfig::new(service.base_url())).unwrap();

    let handle = backend
        .submit_job(
            "posting-42",
            &SubmissionPayload::Text("Rust engineer".to_string()),
        )
        .await
        .unwrap();
    assert!(!handle.job_id.is_empty());
    assert_eq!(handle.estimated_completion.as_deref(), Some("30-60 seconds"));

    let job = service.state.job(&handle.job_id).await.unwrap();
    assert_eq!(job.target_id, "posting-42");
    assert_eq!(job.resume, "Rust engineer");

    let first = backend.fetch_job_status(&handle.job_id).await.unwrap();
    assert_eq!(first.status, JobStatus::Pending);
    assert_eq!(first.progress, 0);

    let second = backend.fetch_job_status(&handle.job_id).await.unwrap();
    assert_eq!(second.status, JobStatus::Processing);
    assert_eq!(second.progress, 25);
    assert!(second.updated_at.is_some());
    service.stop().await;
}

#[tokio::test]
async fn file_submission_uploads_multipart() {
    let service = MockService::start(MockBackendState::default()).await;
    let backend = HttpBackend::new(ApiConfig::new(service.base_url())).unwrap();

    let file = ResumeFile::new("resume.txt", b"Ten years of systems work".to_vec());
    let handle = backend
        .submit_job("posting-7", &SubmissionPayload::File(file))
        .await
        .unwrap();

    let job = service.state.job(&handle.job_id).await.unwrap();
    assert_eq!(job.target_id, "posting-7");
    assert_eq!(job.resume, "Ten years of systems work");
    service.stop().await;
}

#[tokio::test]
async fn rejected_upload_maps_to_client_error() {
    let service = MockService::start(MockBackendState::default()).await;
    let backend = HttpBackend::new(ApiConfig::new(service.base_url())).unwrap();

    let file = ResumeFile::new("resume.exe", vec![0u8; 16]);
    let err = backend
        .submit_job("posting-7", &SubmissionPayload::File(file))
        .await
        .unwrap_err();

    match err {
        ApiError::Client { status, message } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("Unsupported file type: .exe"));
        }
        other => panic!("expected client error, got {:?}", other),
    }
    service.stop().await;
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let service = MockService::start(MockBackendState::default()).await;
    let backend = HttpBackend::new(ApiConfig::new(service.base_url())).unwrap();

    let err = backend.fetch_job_status("missing").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::NotFound {
            message: "Job not found".to_string()
        }
    );
    assert_eq!(err.status_code(), Some(404));
    service.stop().await;
}

#[tokio::test]
async fn session_completes_against_mock_service() {
    let service = MockService::start(MockBackendState::default()).await;
    let (session, observer) = session_for(&service, fast_polling());

    let handle = session
        .submit(AnalysisInput::text("posting-42", "Rust engineer"))
        .await
        .unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), session.settled())
        .await
        .unwrap();

    assert_eq!(state.status, SessionStatus::Completed);
    assert_eq!(state.job_id.as_deref(), Some(handle.job_id.as_str()));
    let result = state.result.unwrap();
    assert_eq!(result["job_id"], "posting-42");
    let score = result["analysis"]["overall_score"].as_u64().unwrap();
    assert!((50..100).contains(&score));

    assert_eq!(observer.progress(), vec![0, 25, 50, 75, 100]);
    assert_eq!(observer.completions().len(), 1);
    service.stop().await;
}

#[tokio::test]
async fn session_reports_job_failure() {
    let service = MockService::start(MockBackendState::default()).await;
    let (session, observer) = session_for(&service, fast_polling());

    session
        .submit(AnalysisInput::text("posting-42", "FAIL_ANALYSIS please"))
        .await
        .unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), session.settled())
        .await
        .unwrap();

    assert_eq!(state.status, SessionStatus::Failed);
    assert_eq!(
        state.error.as_deref(),
        Some("Resume analysis failed: document could not be scored")
    );
    assert_eq!(observer.errors().len(), 1);
    service.stop().await;
}

#[tokio::test]
async fn session_rides_out_transient_server_errors() {
    let service = MockService::start(MockBackendState::new(MockConfig {
        progress_step: 50,
        ..MockConfig::default()
    }))
    .await;
    let (session, observer) = session_for(&service, fast_polling());

    service.state.inject_status_failures(2);
    session
        .submit(AnalysisInput::text("posting-42", "Rust engineer"))
        .await
        .unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), session.settled())
        .await
        .unwrap();

    assert!(state.is_completed());
    assert!(observer.errors().is_empty());
    service.stop().await;
}

#[tokio::test]
async fn session_fails_when_server_errors_persist() {
    let service = MockService::start(MockBackendState::default()).await;
    let (session, observer) = session_for(&service, fast_polling());

    service.state.inject_status_failures(3);
    session
        .submit(AnalysisInput::text("posting-42", "Rust engineer"))
        .await
        .unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), session.settled())
        .await
        .unwrap();

    assert!(state.is_failed());
    assert_eq!(
        state.error.as_deref(),
        Some("Server error: Analysis service is busy")
    );
    assert_eq!(observer.errors().len(), 1);
    assert!(observer.progress().is_empty());
    service.stop().await;
}

#[tokio::test]
async fn submission_to_unreachable_service_fails() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = ClientConfig::new(format!("http://127.0.0.1:{}", port)).with_polling(fast_polling());
    let backend: Arc<dyn JobBackend> = Arc::new(HttpBackend::new(config.api.clone()).unwrap());
    let session = AnalysisSession::new(backend, &config);

    let err = session
        .submit(AnalysisInput::text("posting-42", "Rust engineer"))
        .await
        .unwrap_err();

    assert!(err.is_submission_stage());
    let state = session.state();
    assert!(state.is_failed());
    assert!(state.error.unwrap().starts_with("Network error"));
}
