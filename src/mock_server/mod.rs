//! In-process stand-in for the resume analysis service.
//!
//! Serves the same endpoints [`HttpBackend`](crate::api::HttpBackend) talks
//! to. Jobs advance by `progress_step` on every status fetch and complete
//! with a deterministic score once they reach 100. A resume containing
//! `failure_marker` makes its job report failure on the first fetch past 0,
//! and [`MockBackendState::inject_status_failures`] makes the next status
//! fetches answer 503.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::{endpoints, FileRules};
use crate::job::JobStatus;

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Progress added per status fetch.
    pub progress_step: u8,
    /// Resumes containing this text fail.
    pub failure_marker: String,
    pub estimated_completion: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            progress_step: 25,
            failure_marker: "FAIL_ANALYSIS".to_string(),
            estimated_completion: "30-60 seconds".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockJob {
    pub id: String,
    pub target_id: String,
    pub resume: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_checks: u32,
}

impl MockJob {
    fn new(target_id: String, resume: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            target_id,
            resume,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            status_checks: 0,
        }
    }

    /// Advance one step. Terminal jobs stay where they are.
    fn advance(&mut self, config: &MockConfig) {
        self.status_checks += 1;
        if self.status.is_terminal() || self.status_checks == 1 {
            return;
        }

        self.progress = self.progress.saturating_add(config.progress_step).min(100);
        self.updated_at = Utc::now();

        self.status = if self.resume.contains(&config.failure_marker) {
            JobStatus::Failed
        } else if self.progress >= 100 {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        };
    }

    /// Deterministic score in 50..100 derived from the resume.
    pub fn score(&self) -> u32 {
        50 + (self.resume.len() % 50) as u32
    }

    fn to_json(&self) -> Value {
        let mut body = json!({
            "job_id": self.id,
            "status": self.status.to_string(),
            "progress": self.progress,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        });

        match self.status {
            JobStatus::Completed => {
                body["result"] = json!({
                    "job_id": self.target_id,
                    "analysis": {
                        "overall_score": self.score(),
                        "passed_hard_filters": true,
                        "hard_filter_failures": [],
                        "risk_flags": [],
                        "confidence": 0.85,
                    }
                });
            }
            JobStatus::Failed => {
                body["error"] = json!("Resume analysis failed: document could not be scored");
            }
            _ => {}
        }
        body
    }
}

#[derive(Clone, Default)]
pub struct MockBackendState {
    pub jobs: Arc<RwLock<HashMap<String, MockJob>>>,
    pub config: MockConfig,
    pub files: FileRules,
    failing_status_calls: Arc<AtomicU32>,
}

impl MockBackendState {
    /// A zero step would never finish a job, so the step is kept in 1..=100.
    pub fn new(mut config: MockConfig) -> Self {
        config.progress_step = config.progress_step.clamp(1, 100);
        Self {
            config,
            ..Default::default()
        }
    }

    /// Make the next `count` status fetches fail with 503.
    pub fn inject_status_failures(&self, count: u32) {
        self.failing_status_calls.store(count, Ordering::SeqCst);
    }

    pub async fn job(&self, job_id: &str) -> Option<MockJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_status_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn create_job(&self, target_id: String, resume: String) -> Value {
        let job = MockJob::new(target_id, resume);
        let body = json!({
            "job_id": job.id,
            "status": "pending",
            "estimated_completion": self.config.estimated_completion,
            "created_at": job.created_at.to_rfc3339(),
        });
        tracing::info!(job_id = %job.id, target_id = %job.target_id, "Mock analysis job created");
        self.jobs.write().await.insert(job.id.clone(), job);
        body
    }
}

#[derive(Deserialize)]
struct SubmitTextRequest {
    job_id: String,
    resume_text: String,
}

pub fn router(state: MockBackendState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(endpoints::HEALTH, get(health_handler))
        .route(endpoints::SUBMIT_FILE, post(submit_file_handler))
        .route(endpoints::SUBMIT_TEXT, post(submit_text_handler))
        .route(
            &format!("{}/:job_id", endpoints::JOB_STATUS),
            get(job_status_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: MockBackendState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Starting mock analysis backend");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn submit_file_handler(
    State(state): State<MockBackendState>,
    mut multipart: Multipart,
) -> Response {
    let mut target_id = None;
    let mut file = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("job_id") => match field.text().await {
                Ok(text) => target_id = Some(text),
                Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
            },
            Some("file") => {
                let file_name = field.file_name().unwrap_or("resume").to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, bytes)),
                    Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
                }
            }
            _ => {}
        }
    }

    let (Some(target_id), Some((file_name, bytes))) = (target_id, file) else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "job_id and file are required");
    };

    if let Err(e) = state.files.validate(&file_name, bytes.len()) {
        return detail(StatusCode::BAD_REQUEST, &e);
    }

    let resume = String::from_utf8_lossy(&bytes).into_owned();
    Json(state.create_job(target_id, resume).await).into_response()
}

async fn submit_text_handler(
    State(state): State<MockBackendState>,
    Json(payload): Json<SubmitTextRequest>,
) -> Response {
    if payload.resume_text.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, "resume_text is empty");
    }
    Json(state.create_job(payload.job_id, payload.resume_text).await).into_response()
}

async fn job_status_handler(
    State(state): State<MockBackendState>,
    Path(job_id): Path<String>,
) -> Response {
    if state.take_injected_failure() {
        return detail(StatusCode::SERVICE_UNAVAILABLE, "Analysis service is busy");
    }

    let mut jobs = state.jobs.write().await;
    let Some(job) = jobs.get_mut(&job_id) else {
        return detail(StatusCode::NOT_FOUND, "Job not found");
    };

    job.advance(&state.config);
    Json(job.to_json()).into_response()
}
