//! Timer-driven status polling for one submitted job.
//!
//! A [`Watch`] owns a spawned task that fetches status on a fixed interval
//! until the job completes, fails, runs out of time, exhausts its retry
//! budget, or is stopped.
//!
//! # Tick
//!
//! 1. The first fetch happens immediately, later ones every `poll_interval_ms`
//! 2. Before each fetch the elapsed time since `watch()` is checked against
//!    `max_duration_ms`; past it the watch fails with a timeout and the fetch
//!    is not issued
//! 3. A successful fetch resets the failure counter, emits
//!    [`PollEvent::Progress`], then ends the watch if the job is terminal
//! 4. A failed fetch increments the counter; reaching `max_retries` ends the
//!    watch with the last error, otherwise it is logged and polling goes on
//!
//! Fetches never overlap, so events arrive in poll order.
//!
//! # Cancellation
//!
//! Events are delivered while the watch's phase lock is held and only when
//! the phase is not terminal. [`Watch::stop`] takes the same lock, so once it
//! returns no further event reaches the sink, including the result of a fetch
//! that was already in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, JobBackend};
use crate::config::PollConfig;
use crate::error::{AnalysisError, JOB_FAILED_FALLBACK};
use crate::job::{JobHandle, JobStatus, StatusSnapshot};

/// Lifecycle of a single watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Created, no fetch issued yet.
    Armed,
    Polling,
    Completed,
    /// Job-reported failure, timeout, or retry budget exhausted.
    Failed,
    /// Cancelled by the caller.
    Stopped,
}

impl PollPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollPhase::Completed | PollPhase::Failed | PollPhase::Stopped
        )
    }
}

impl std::fmt::Display for PollPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollPhase::Armed => write!(f, "armed"),
            PollPhase::Polling => write!(f, "polling"),
            PollPhase::Completed => write!(f, "completed"),
            PollPhase::Failed => write!(f, "failed"),
            PollPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// What a watch reports, in the order polls complete.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Emitted once per successful fetch, whatever the status.
    Progress {
        progress: u8,
        updated_at: Option<DateTime<Utc>>,
    },
    Completed(Value),
    Failed(AnalysisError),
}

type Sink = dyn Fn(PollEvent) + Send + Sync;

/// Starts watches against a backend with a fixed polling configuration.
#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn JobBackend>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn JobBackend>, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Start watching `handle`. Must be called inside a Tokio runtime.
    ///
    /// `sink` runs on the polling task with the watch's phase lock held.
    /// Calling [`Watch::stop`] on the same watch from inside `sink` deadlocks.
    pub fn watch<F>(&self, handle: &JobHandle, sink: F) -> Watch
    where
        F: Fn(PollEvent) + Send + Sync + 'static,
    {
        let shared = Arc::new(WatchShared {
            phase: Mutex::new(PollPhase::Armed),
            token: CancellationToken::new(),
        });

        let task = tokio::spawn(run_watch(
            Instant::now(),
            self.backend.clone(),
            handle.job_id.clone(),
            self.config.clone(),
            shared.clone(),
            Arc::new(sink),
        ));

        Watch {
            job_id: handle.job_id.clone(),
            shared,
            task: Some(task),
        }
    }
}

struct WatchShared {
    phase: Mutex<PollPhase>,
    token: CancellationToken,
}

impl WatchShared {
    fn phase(&self) -> MutexGuard<'_, PollPhase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move from `Armed` to `Polling`. Returns false if the watch was stopped.
    fn begin(&self) -> bool {
        let mut phase = self.phase();
        match *phase {
            PollPhase::Armed => {
                *phase = PollPhase::Polling;
                true
            }
            PollPhase::Polling => true,
            _ => false,
        }
    }

    /// Deliver `event` unless the watch already ended. `next` is the phase a
    /// terminal event moves to. Returns false if the event was discarded.
    fn emit(&self, sink: &Sink, event: PollEvent, next: Option<PollPhase>) -> bool {
        let mut phase = self.phase();
        if phase.is_terminal() {
            return false;
        }
        if let Some(next) = next {
            *phase = next;
        }
        sink(event);
        true
    }
}

/// A running watch.
///
/// Dropping it cancels polling; use [`stop`](Self::stop) when no further
/// event may reach the sink.
pub struct Watch {
    job_id: String,
    shared: Arc<WatchShared>,
    task: Option<JoinHandle<()>>,
}

impl Watch {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Current phase. Blocks while an event is being delivered, so never call
    /// this (or `is_active`, `stop`, `Debug`) while holding a lock the sink
    /// also takes.
    pub fn phase(&self) -> PollPhase {
        *self.shared.phase()
    }

    pub fn is_active(&self) -> bool {
        !self.phase().is_terminal()
    }

    /// Cancel polling. Idempotent; a watch that already ended keeps its phase.
    pub fn stop(&self) {
        self.shared.token.cancel();
        let mut phase = self.shared.phase();
        if !phase.is_terminal() {
            *phase = PollPhase::Stopped;
            tracing::debug!(job_id = %self.job_id, "Status polling stopped");
        }
    }

    /// Wait for the polling task to exit and return the final phase.
    pub async fn finished(&mut self) -> PollPhase {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(job_id = %self.job_id, error = %e, "Polling task panicked");
            }
        }
        self.phase()
    }
}

impl Drop for Watch {
    // Only cancels: the last owner of a watch may be dropped from inside its
    // own sink, where the phase lock is already held.
    fn drop(&mut self) {
        self.shared.token.cancel();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("job_id", &self.job_id)
            .field("phase", &self.phase())
            .finish()
    }
}

async fn run_watch(
    started: Instant,
    backend: Arc<dyn JobBackend>,
    job_id: String,
    config: PollConfig,
    shared: Arc<WatchShared>,
    sink: Arc<Sink>,
) {
    let mut interval = tokio::time::interval(config.poll_interval().max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures: u32 = 0;

    if !shared.begin() {
        return;
    }
    tracing::debug!(job_id = %job_id, interval_ms = config.poll_interval_ms, "Status polling started");

    loop {
        // The first tick completes immediately.
        tokio::select! {
            biased;
            _ = shared.token.cancelled() => return,
            _ = interval.tick() => {}
        }

        let elapsed = started.elapsed();
        if elapsed > config.max_duration() {
            let elapsed_ms = whole_millis(elapsed);
            tracing::warn!(job_id = %job_id, elapsed_ms, "Status polling timed out");
            shared.emit(
                sink.as_ref(),
                PollEvent::Failed(AnalysisError::Timeout { elapsed_ms }),
                Some(PollPhase::Failed),
            );
            return;
        }

        let fetched = tokio::select! {
            biased;
            _ = shared.token.cancelled() => return,
            result = backend.fetch_job_status(&job_id) => result.and_then(require_result),
        };

        match fetched {
            Ok(snapshot) => {
                consecutive_failures = 0;

                let progress = PollEvent::Progress {
                    progress: snapshot.progress,
                    updated_at: snapshot.updated_at,
                };
                if !shared.emit(sink.as_ref(), progress, None) {
                    return;
                }

                match snapshot.status {
                    JobStatus::Completed => {
                        tracing::info!(job_id = %job_id, "Analysis completed");
                        let result = snapshot.result.unwrap_or(Value::Null);
                        shared.emit(
                            sink.as_ref(),
                            PollEvent::Completed(result),
                            Some(PollPhase::Completed),
                        );
                        return;
                    }
                    JobStatus::Failed => {
                        let message = snapshot
                            .error
                            .unwrap_or_else(|| JOB_FAILED_FALLBACK.to_string());
                        tracing::warn!(job_id = %job_id, error = %message, "Analysis job reported failure");
                        shared.emit(
                            sink.as_ref(),
                            PollEvent::Failed(AnalysisError::JobFailed(message)),
                            Some(PollPhase::Failed),
                        );
                        return;
                    }
                    JobStatus::Pending | JobStatus::Processing => {
                        tracing::debug!(
                            job_id = %job_id,
                            status = %snapshot.status,
                            progress = snapshot.progress,
                            "Analysis in progress"
                        );
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;

                if consecutive_failures >= config.max_retries {
                    tracing::warn!(
                        job_id = %job_id,
                        attempts = consecutive_failures,
                        error = %e,
                        "Status check retries exhausted"
                    );
                    shared.emit(
                        sink.as_ref(),
                        PollEvent::Failed(AnalysisError::RetriesExhausted {
                            attempts: consecutive_failures,
                            last: e,
                        }),
                        Some(PollPhase::Failed),
                    );
                    return;
                }

                tracing::warn!(
                    job_id = %job_id,
                    attempt = consecutive_failures,
                    max_retries = config.max_retries,
                    error = %e,
                    "Status check failed, will retry"
                );
            }
        }
    }
}

/// Milliseconds in `elapsed`, saturating at `u64::MAX`.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// A completed snapshot without a result is malformed; treat it as a failed fetch.
fn require_result(snapshot: StatusSnapshot) -> Result<StatusSnapshot, ApiError> {
    if snapshot.status == JobStatus::Completed && snapshot.result.is_none() {
        return Err(ApiError::InvalidResponse {
            message: "completed status without a result".to_string(),
        });
    }
    Ok(snapshot)
}
