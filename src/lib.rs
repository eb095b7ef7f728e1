pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod mock_server;
pub mod poller;
pub mod session;
pub mod shutdown;
pub mod submitter;

pub use api::{ApiError, HttpBackend, JobBackend, ResumeFile, SubmissionPayload};
pub use config::{ApiConfig, ClientConfig, FileRules, PollConfig};
pub use error::{AnalysisError, Result};
pub use job::{JobHandle, JobStatus, StatusSnapshot};
pub use poller::{PollEvent, PollPhase, StatusPoller, Watch};
pub use session::{AnalysisSession, Callbacks, SessionObserver, SessionState, SessionStatus};
pub use submitter::{AnalysisInput, JobSubmitter};
