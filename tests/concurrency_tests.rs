//! Session and poller behaviour on a multi-threaded runtime.
//!
//! Polling runs on real time with a 1ms interval so that events, readers and
//! cancellation genuinely overlap across worker threads.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_tracker::api::JobBackend;
use analysis_tracker::config::{ClientConfig, PollConfig};
use analysis_tracker::error::TIMEOUT_MESSAGE;
use analysis_tracker::job::JobHandle;
use analysis_tracker::poller::{PollPhase, StatusPoller};
use analysis_tracker::session::AnalysisSession;
use analysis_tracker::submitter::AnalysisInput;
use test_harness::{
    assert_eventually, channel_sink, collect_events, RecordingObserver, ScriptedBackend,
};

fn tight_polling() -> PollConfig {
    PollConfig::default()
        .with_interval_ms(1)
        .with_max_duration_ms(60_000)
}

fn session_with(
    backend: &Arc<ScriptedBackend>,
    polling: PollConfig,
) -> (AnalysisSession, RecordingObserver) {
    let observer = RecordingObserver::new();
    let config = ClientConfig::default().with_polling(polling);
    let backend: Arc<dyn JobBackend> = backend.clone();
    let session = AnalysisSession::with_observer(backend, &config, observer.clone());
    (session, observer)
}

fn text_input() -> AnalysisInput {
    AnalysisInput::text("posting-42", "Senior Rust engineer")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_do_not_block_event_delivery() {
    let backend = ScriptedBackend::new();
    let (session, observer) = session_with(&backend, tight_polling());
    session.submit(text_input()).await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let session = session.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let mut calls = 0u64;
            while !done.load(Ordering::SeqCst) {
                let _ = session.is_watching();
                let _ = session.state();
                let _ = session.job_handle();
                calls += 1;
            }
            calls
        })
    };

    let before = backend.fetch_calls();
    assert_eventually(
        || {
            let backend = backend.clone();
            async move { backend.fetch_calls() >= before + 50 }
        },
        Duration::from_secs(5),
        "polling stalled while the session was being read",
    )
    .await;

    done.store(true, Ordering::SeqCst);
    let joined = tokio::task::spawn_blocking(move || reader.join().unwrap());
    let calls = tokio::time::timeout(Duration::from_secs(5), joined)
        .await
        .expect("reader thread never returned")
        .unwrap();

    assert!(calls > 0);
    assert!(session.is_watching());
    assert!(observer.progress().len() >= 40);
    session.reset();
    assert!(!session.is_watching());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_silences_in_flight_polls() {
    for round in 0..25u64 {
        let backend = ScriptedBackend::new();
        let (session, observer) = session_with(&backend, tight_polling());

        session.submit(text_input()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(round % 5)).await;
        session.reset();

        let seen = observer.events().len();
        let fetches = backend.fetch_calls();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(observer.events().len(), seen, "callback after reset in round {}", round);
        assert!(session.state().is_idle());
        assert!(!session.is_watching());
        // A fetch already past its cancellation check may still be counted.
        assert!(backend.fetch_calls() <= fetches + 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn superseded_watch_never_reaches_terminal() {
    for round in 0..10u64 {
        let backend = ScriptedBackend::new();
        let polling = PollConfig::default()
            .with_interval_ms(1)
            .with_max_duration_ms(100);
        let (session, observer) = session_with(&backend, polling);

        let first = session.start(text_input()).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(round % 4)).await;
        let second = session.start(text_input()).await.unwrap().unwrap();
        assert_ne!(first.job_id, second.job_id);

        let state = tokio::time::timeout(Duration::from_secs(5), session.settled())
            .await
            .expect("second analysis never settled");
        assert!(state.is_failed());
        assert_eq!(state.job_id.as_deref(), Some(second.job_id.as_str()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(observer.errors(), vec![TIMEOUT_MESSAGE], "round {}", round);
        assert!(observer.completions().is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_blocks_further_poll_events() {
    for _ in 0..20 {
        let backend = ScriptedBackend::new();
        let backend_dyn: Arc<dyn JobBackend> = backend.clone();
        let poller = StatusPoller::new(backend_dyn, tight_polling());

        let (sink, mut rx) = channel_sink();
        let watch = poller.watch(&JobHandle::new("abc123"), sink);
        tokio::time::sleep(Duration::from_millis(3)).await;
        watch.stop();

        // Everything delivered before stop returned is already queued.
        while rx.try_recv().is_ok() {}

        let late = tokio::time::timeout(Duration::from_secs(2), collect_events(&mut rx))
            .await
            .expect("polling task did not exit after stop");
        assert!(late.is_empty());
        assert_eq!(watch.phase(), PollPhase::Stopped);
    }
}
