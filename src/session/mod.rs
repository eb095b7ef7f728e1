//! Caller-facing orchestration of one analysis at a time.
//!
//! An [`AnalysisSession`] drives [`JobSubmitter`] then [`StatusPoller`] and
//! owns the authoritative [`SessionState`]:
//!
//! ```text
//!   idle ──start──→ submitting ──ok──→ polling ──completed──→ completed
//!                       │                 │
//!                       └──error──→ failed ←──failed/timeout/retries
//!
//!   any state ──reset──→ idle
//! ```
//!
//! # One active watch
//!
//! Every `start`, `retry` and `reset` bumps a generation counter and stops
//! the previous watch. Poll events and submission results carry the
//! generation they were issued under and are dropped on mismatch, so a late
//! response can never resurrect a reset or superseded analysis.
//!
//! # Lock order
//!
//! A watch delivers events with its phase lock held and the session lock is
//! taken inside that. Nothing here may touch a watch's phase while holding
//! the session lock; `Watch::stop` is only called after the guard is dropped.

mod observer;
mod state;

pub use observer::{Callbacks, NoopObserver, SessionObserver};
pub use state::{SessionState, SessionStatus};

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::JobBackend;
use crate::config::ClientConfig;
use crate::error::{AnalysisError, Result};
use crate::job::JobHandle;
use crate::poller::{PollEvent, StatusPoller, Watch};
use crate::submitter::{AnalysisInput, JobSubmitter};

/// Public entry point: submit a resume, observe it to completion.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct AnalysisSession {
    shared: Arc<Shared>,
}

struct Shared {
    submitter: JobSubmitter,
    poller: StatusPoller,
    observer: Arc<dyn SessionObserver>,
    state_tx: watch::Sender<SessionState>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    generation: u64,
    handle: Option<JobHandle>,
    watch: Option<Watch>,
    /// True from watch spawn until its terminal event or until superseded.
    watching: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, inner: &mut Inner, state: SessionState) {
        inner.state = state.clone();
        self.state_tx.send_replace(state);
    }

    /// Apply a poll event issued under `generation`.
    fn apply(&self, generation: u64, event: PollEvent) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(generation, current = inner.generation, "Discarding stale poll event");
            return;
        }

        let mut state = inner.state.clone();
        match event {
            PollEvent::Progress {
                progress,
                updated_at,
            } => {
                state.set_progress(progress, updated_at);
                self.publish(&mut inner, state);
                self.observer.on_progress(progress);
            }
            PollEvent::Completed(result) => {
                inner.watching = false;
                state.complete(result.clone());
                self.publish(&mut inner, state);
                self.observer.on_complete(&result);
            }
            PollEvent::Failed(err) => {
                inner.watching = false;
                let message = err.to_string();
                state.fail(message.clone());
                self.publish(&mut inner, state);
                self.observer.on_error(&message);
            }
        }
    }
}

impl AnalysisSession {
    pub fn new(backend: Arc<dyn JobBackend>, config: &ClientConfig) -> Self {
        Self::with_observer(backend, config, NoopObserver)
    }

    pub fn with_observer(
        backend: Arc<dyn JobBackend>,
        config: &ClientConfig,
        observer: impl SessionObserver + 'static,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::idle());

        Self {
            shared: Arc::new(Shared {
                submitter: JobSubmitter::new(backend.clone(), config.files.clone()),
                poller: StatusPoller::new(backend, config.polling.clone()),
                observer: Arc::new(observer),
                state_tx,
                inner: Mutex::new(Inner {
                    state: SessionState::idle(),
                    generation: 0,
                    handle: None,
                    watch: None,
                    watching: false,
                }),
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    /// Receive every state replacement from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Handle of the job currently owned by the session, if any.
    pub fn job_handle(&self) -> Option<JobHandle> {
        self.shared.lock().handle.clone()
    }

    /// True while a watch is polling for this session.
    pub fn is_watching(&self) -> bool {
        self.shared.lock().watching
    }

    /// Kick off an analysis without waiting for the submission.
    ///
    /// The session is `submitting` when this returns. The outcome arrives
    /// through the observer and [`subscribe`](Self::subscribe); the returned
    /// task resolves to the submission result. Must be called inside a Tokio
    /// runtime.
    pub fn start(&self, input: AnalysisInput) -> JoinHandle<Result<JobHandle>> {
        let generation = self.begin();
        let session = self.clone();
        tokio::spawn(async move { session.finish_submission(generation, input).await })
    }

    /// Submit and wait for the job handle. Polling continues in the
    /// background once this returns `Ok`.
    ///
    /// Returns [`AnalysisError::Superseded`] if the session was reset or
    /// restarted while the submission was in flight.
    pub async fn submit(&self, input: AnalysisInput) -> Result<JobHandle> {
        let generation = self.begin();
        self.finish_submission(generation, input).await
    }

    /// Stop any active watch and return to `idle`. Safe from any state.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.handle = None;
            inner.watching = false;
            if !inner.state.is_idle() {
                self.shared.publish(&mut inner, SessionState::idle());
                tracing::debug!("Analysis session reset");
            }
            inner.watch.take()
        };

        if let Some(watch) = previous {
            watch.stop();
        }
    }

    /// Watch the current job again after a failed watch, with a fresh clock
    /// and retry budget.
    ///
    /// Returns false (and does nothing) unless the session failed after its
    /// job was submitted.
    pub fn retry(&self) -> bool {
        let previous = {
            let mut inner = self.shared.lock();
            let Some(handle) = inner.handle.clone() else {
                return false;
            };
            if !inner.state.is_failed() {
                return false;
            }

            inner.generation += 1;
            let generation = inner.generation;
            let previous = inner.watch.take();
            self.shared
                .publish(&mut inner, SessionState::polling(&handle));
            inner.watch = Some(self.spawn_watch(&handle, generation));
            inner.watching = true;
            tracing::info!(job_id = %handle.job_id, "Retrying status polling");
            previous
        };

        if let Some(watch) = previous {
            watch.stop();
        }
        true
    }

    /// Wait until the session is neither submitting nor polling.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|state| !state.is_analyzing()).await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Supersede whatever is running and enter `submitting`.
    fn begin(&self) -> u64 {
        let (generation, previous) = {
            let mut inner = self.shared.lock();
            inner.generation += 1;
            inner.handle = None;
            inner.watching = false;
            self.shared
                .publish(&mut inner, SessionState::submitting());
            (inner.generation, inner.watch.take())
        };

        if let Some(watch) = previous {
            tracing::debug!(job_id = %watch.job_id(), "Superseding active watch");
            watch.stop();
        }
        generation
    }

    async fn finish_submission(&self, generation: u64, input: AnalysisInput) -> Result<JobHandle> {
        let outcome = self.shared.submitter.submit_input(&input).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            tracing::debug!(
                target_id = %input.target_id,
                "Discarding submission result for superseded analysis"
            );
            return Err(AnalysisError::Superseded);
        }

        match outcome {
            Ok(handle) => {
                self.shared
                    .publish(&mut inner, SessionState::polling(&handle));
                inner.watch = Some(self.spawn_watch(&handle, generation));
                inner.watching = true;
                inner.handle = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let message = e.to_string();
                let mut state = inner.state.clone();
                state.fail(message.clone());
                self.shared.publish(&mut inner, state);
                self.shared.observer.on_error(&message);
                Err(e)
            }
        }
    }

    fn spawn_watch(&self, handle: &JobHandle, generation: u64) -> Watch {
        let shared = Arc::downgrade(&self.shared);
        self.shared.poller.watch(handle, move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.apply(generation, event);
            }
        })
    }
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("state", &self.state())
            .finish()
    }
}
