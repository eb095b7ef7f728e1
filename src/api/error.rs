use thiserror::Error;

/// Transport-level failures of a backend call.
///
/// During polling every variant counts as a transient fetch failure. During
/// submission every variant is terminal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Could not reach the service (connection refused, DNS, TLS).
    #[error("Network error: {message}")]
    Network { message: String },

    /// The request did not finish within its timeout.
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// 5xx responses.
    #[error("Server error: {message}")]
    Server { status: u16, message: String },

    /// 404 responses.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// 422 responses, with FastAPI detail messages flattened.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Other 4xx responses.
    #[error("Request error: {message}")]
    Client { status: u16, message: String },

    /// The body was not valid JSON for the expected type.
    #[error("Failed to parse response: {message}")]
    Parse { message: String },

    /// The body parsed but its contents were inconsistent.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network {
            message: message.into(),
        }
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, ApiError::Network { .. } | ApiError::Timeout { .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Server { .. })
    }

    /// HTTP status carried by the error, if the service answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Validation { .. } => Some(422),
            _ => None,
        }
    }
}

/// Map a non-success HTTP response onto an `ApiError`.
pub(crate) fn from_status(status: u16, body: &str) -> ApiError {
    let detail = extract_detail(body);
    let or_default = |fallback: String| {
        if detail.is_empty() {
            fallback
        } else {
            detail.clone()
        }
    };

    match status {
        404 => ApiError::NotFound {
            message: or_default("Job not found".to_string()),
        },
        422 => ApiError::Validation {
            message: or_default("Invalid request data".to_string()),
        },
        500..=599 => ApiError::Server {
            status,
            message: or_default(format!("Server error ({})", status)),
        },
        _ => ApiError::Client {
            status,
            message: or_default(format!("Request failed ({})", status)),
        },
    }
}

/// Pull a readable message out of an error body.
///
/// Understands FastAPI shapes: `{"detail": "msg"}`, `{"detail": {"error": "msg"}}`
/// and `{"detail": [{"msg": "..."}]}`. Anything else is returned trimmed.
fn extract_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    match json.get("detail") {
        Some(serde_json::Value::String(msg)) => msg.clone(),
        Some(serde_json::Value::Object(obj)) => obj
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        Some(serde_json::Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(|msg| msg.strip_prefix("Value error, ").unwrap_or(msg))
                .collect();
            if messages.is_empty() {
                body.trim().to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => body.trim().to_string(),
    }
}
