use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::job::JobHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Submitting => write!(f, "submitting"),
            SessionStatus::Polling => write!(f, "polling"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Observable state of an [`AnalysisSession`](super::AnalysisSession).
///
/// `result` is set iff the status is `Completed` (and then `progress` is
/// 100); `error` is set iff the status is `Failed`. Only the transition
/// helpers below mutate it, which keeps those invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub job_id: Option<String>,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub estimated_completion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle()
    }
}

impl SessionState {
    pub fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            job_id: None,
            progress: 0,
            result: None,
            error: None,
            estimated_completion: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == SessionStatus::Idle
    }

    /// Submitting or polling.
    pub fn is_analyzing(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Submitting | SessionStatus::Polling
        )
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == SessionStatus::Failed
    }

    pub(crate) fn submitting() -> Self {
        Self {
            status: SessionStatus::Submitting,
            ..Self::idle()
        }
    }

    pub(crate) fn polling(handle: &JobHandle) -> Self {
        Self {
            status: SessionStatus::Polling,
            job_id: Some(handle.job_id.clone()),
            estimated_completion: handle.estimated_completion.clone(),
            created_at: Some(handle.created_at),
            ..Self::idle()
        }
    }

    pub(crate) fn set_progress(&mut self, progress: u8, updated_at: Option<DateTime<Utc>>) {
        self.progress = progress;
        if updated_at.is_some() {
            self.updated_at = updated_at;
        }
    }

    pub(crate) fn complete(&mut self, result: Value) {
        self.status = SessionStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = SessionStatus::Failed;
        self.result = None;
        self.error = Some(message);
    }
}
