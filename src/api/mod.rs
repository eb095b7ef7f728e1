//! The two operations the tracker consumes from the analysis service.
//!
//! [`JobBackend`] is the seam: the session and poller only ever talk to it.
//! [`HttpBackend`] is the production implementation over `reqwest`.

pub mod backend;
pub mod error;
pub mod http;

pub use backend::{JobBackend, ResumeFile, SubmissionPayload};
pub use error::ApiError;
pub use http::HttpBackend;
