use std::time::Duration;

/// Endpoint paths of the analysis service, relative to `ApiConfig::base_url`.
pub mod endpoints {
    pub const SUBMIT_FILE: &str = "/async/review-resume";
    pub const SUBMIT_TEXT: &str = "/async/review-resume-text";
    pub const JOB_STATUS: &str = "/async/job-status";
    pub const HEALTH: &str = "/health";

    pub fn job_status(job_id: &str) -> String {
        format!("{}/{}", JOB_STATUS, job_id)
    }
}

/// Polling behaviour for a single watched job.
///
/// These are the only knobs the poller recognizes:
/// - `poll_interval_ms`: time between consecutive status fetches
/// - `max_duration_ms`: hard ceiling on total watch time
/// - `max_retries`: consecutive transient failures tolerated before giving up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval_ms: u64,
    pub max_duration_ms: u64,
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_duration_ms: 300_000, // 5 minutes
            max_retries: 3,
        }
    }
}

impl PollConfig {
    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_duration_ms(mut self, ms: u64) -> Self {
        self.max_duration_ms = ms;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    /// Reject settings that would make the poller spin or never fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        if self.max_duration_ms == 0 {
            return Err("max_duration_ms must be greater than zero".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Connection settings for the analysis service.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL without a trailing slash (e.g. `http://localhost:8000`)
    pub base_url: String,
    /// Timeout for submission calls, which carry the resume upload.
    pub upload_timeout_ms: u64,
    /// Timeout for a single status fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            upload_timeout_ms: 60_000,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Default::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// True when the base URL points at this machine.
    pub fn is_local(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Local checks applied to a resume file before it is uploaded.
#[derive(Debug, Clone)]
pub struct FileRules {
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub max_size_bytes: usize,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            allowed_extensions: ["pdf", "docx", "doc", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

impl FileRules {
    /// Check a file name and size against the rules.
    pub fn validate(&self, file_name: &str, size: usize) -> Result<(), String> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            let supported: Vec<String> = self
                .allowed_extensions
                .iter()
                .map(|ext| format!(".{}", ext))
                .collect();
            return Err(format!(
                "Unsupported file type: .{}. Supported types: {}",
                extension,
                supported.join(", ")
            ));
        }

        if size > self.max_size_bytes {
            return Err(format!(
                "File size too large. Maximum size: {}MB",
                self.max_size_bytes / 1024 / 1024
            ));
        }

        Ok(())
    }
}

/// Everything a client needs: where the service lives, how to poll, what to upload.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub polling: PollConfig,
    pub files: FileRules,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig::new(base_url),
            ..Default::default()
        }
    }

    pub fn with_polling(mut self, polling: PollConfig) -> Self {
        self.polling = polling;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_config_default() {
        let cfg = PollConfig::default();
        assert_eq!(cfg.poll_interval_ms, 2_000);
        assert_eq!(cfg.max_duration_ms, 300_000);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn poll_config_builders() {
        let cfg = PollConfig::default()
            .with_interval_ms(500)
            .with_max_duration_ms(5_000)
            .with_max_retries(5);
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.max_duration(), Duration::from_secs(5));
        assert_eq!(cfg.max_retries, 5);
    }

    #[test]
    fn poll_config_rejects_zero_values() {
        assert!(PollConfig::default().with_interval_ms(0).validate().is_err());
        assert!(PollConfig::default()
            .with_max_duration_ms(0)
            .validate()
            .is_err());
        assert!(PollConfig::default().with_max_retries(0).validate().is_err());
    }

    #[test]
    fn api_config_default() {
        let cfg = ApiConfig::default();
        assert_eq!(cfg.base_url, "http://localhost:8000");
        assert_eq!(cfg.upload_timeout_ms, 60_000);
        assert_eq!(cfg.fetch_timeout_ms, 10_000);
        assert!(cfg.is_local());
    }

    #[test]
    fn api_config_strips_trailing_slash() {
        let cfg = ApiConfig::new("https://api.example.com/");
        assert_eq!(cfg.base_url, "https://api.example.com");
        assert_eq!(
            cfg.url(endpoints::SUBMIT_FILE),
            "https://api.example.com/async/review-resume"
        );
        assert_eq!(cfg.url("health"), "https://api.example.com/health");
        assert!(!cfg.is_local());
    }

    #[test]
    fn job_status_path() {
        assert_eq!(endpoints::job_status("abc123"), "/async/job-status/abc123");
    }

    #[test]
    fn file_rules_accept_supported_types() {
        let rules = FileRules::default();
        assert!(rules.validate("resume.pdf", 1024).is_ok());
        assert!(rules.validate("Resume.DOCX", 1024).is_ok());
        assert!(rules.validate("notes.txt", 0).is_ok());
    }

    #[test]
    fn file_rules_reject_unsupported_type() {
        let err = FileRules::default().validate("photo.png", 10).unwrap_err();
        assert!(err.starts_with("Unsupported file type: .png"));
        assert!(err.contains(".pdf, .docx, .doc, .txt"));
    }

    #[test]
    fn file_rules_reject_missing_extension() {
        assert!(FileRules::default().validate("resume", 10).is_err());
    }

    #[test]
    fn file_rules_reject_oversize() {
        let rules = FileRules::default();
        let err = rules
            .validate("resume.pdf", rules.max_size_bytes + 1)
            .unwrap_err();
        assert_eq!(err, "File size too large. Maximum size: 10MB");
        assert!(rules.validate("resume.pdf", rules.max_size_bytes).is_ok());
    }

    #[test]
    fn client_config_new() {
        let cfg = ClientConfig::new("http://10.0.0.1:9000")
            .with_polling(PollConfig::default().with_max_retries(7));
        assert_eq!(cfg.api.base_url, "http://10.0.0.1:9000");
        assert_eq!(cfg.polling.max_retries, 7);
        assert_eq!(cfg.files.allowed_extensions.len(), 4);
    }
}
