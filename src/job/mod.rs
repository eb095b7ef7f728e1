//! Job handles and status snapshots exchanged with the analysis service.
//!
//! Both types are decoded from loosely-shaped JSON. Decoding goes through
//! private wire structs first; only values that pass validation become a
//! [`JobHandle`] or a [`StatusSnapshot`].

pub mod handle;
pub mod status;

pub use handle::JobHandle;
pub use status::{JobStatus, StatusSnapshot};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a backend timestamp. Accepts RFC 3339 and naive ISO 8601 (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
