use serde_json::Value;

/// Caller hooks for a session's events.
///
/// `on_progress` fires once per successful poll. Exactly one of
/// `on_complete` / `on_error` fires per started analysis, unless the session
/// is reset first.
///
/// Hooks run synchronously while the session is locked. Calling back into the
/// same session from a hook deadlocks; spawn a task for that instead.
pub trait SessionObserver: Send + Sync {
    fn on_progress(&self, _progress: u8) {}

    fn on_complete(&self, _result: &Value) {}

    fn on_error(&self, _message: &str) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;
type CompleteFn = Box<dyn Fn(&Value) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str) + Send + Sync>;

/// Closure-based observer.
///
/// ```rust
/// use analysis_tracker::session::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_progress(|p| println!("{p}%"))
///     .on_error(|msg| eprintln!("analysis failed: {msg}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    progress: Option<ProgressFn>,
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl SessionObserver for Callbacks {
    fn on_progress(&self, progress: u8) {
        if let Some(f) = &self.progress {
            f(progress);
        }
    }

    fn on_complete(&self, result: &Value) {
        if let Some(f) = &self.complete {
            f(result);
        }
    }

    fn on_error(&self, message: &str) {
        if let Some(f) = &self.error {
            f(message);
        }
    }
}
