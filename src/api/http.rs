use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::error::from_status;
use crate::api::{ApiError, JobBackend, SubmissionPayload};
use crate::config::{endpoints, ApiConfig};
use crate::job::handle::SubmitResponse;
use crate::job::status::StatusResponse;
use crate::job::{JobHandle, StatusSnapshot};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
struct SubmitTextRequest<'a> {
    job_id: &'a str,
    resume_text: &'a str,
}

/// `JobBackend` over HTTP.
///
/// Each call is a single request with no retry. Submissions use the upload
/// timeout and status fetches the fetch timeout from [`ApiConfig`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: ApiConfig,
    client: Client,
}

impl HttpBackend {
    /// Build the client. Fails if the TLS backend cannot be initialized.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("analysis-tracker/{VERSION}"))
                .unwrap_or_else(|_| HeaderValue::from_static("analysis-tracker")),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Ping the service's health endpoint.
    pub async fn health_check(&self) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(self.config.url(endpoints::HEALTH))
            .timeout(Duration::from_millis(self.config.fetch_timeout_ms))
            .send()
            .await
            .map_err(to_transport_error)?;
        Ok(response.status().is_success())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        let response = request.send().await.map_err(to_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status.as_u16(), &body));
        }

        response.json::<T>().await.map_err(|e| ApiError::Parse {
            message: format!("Failed to parse {} response: {}", what, e),
        })
    }
}

fn to_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout {
            message: err.to_string(),
        }
    } else {
        ApiError::Network {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit_job(
        &self,
        target_id: &str,
        payload: &SubmissionPayload,
    ) -> Result<JobHandle, ApiError> {
        let timeout = Duration::from_millis(self.config.upload_timeout_ms);

        let request = match payload {
            SubmissionPayload::File(file) => {
                let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
                let form = Form::new()
                    .text("job_id", target_id.to_string())
                    .part("file", part);
                self.client
                    .post(self.config.url(endpoints::SUBMIT_FILE))
                    .multipart(form)
            }
            SubmissionPayload::Text(text) => self
                .client
                .post(self.config.url(endpoints::SUBMIT_TEXT))
                .json(&SubmitTextRequest {
                    job_id: target_id,
                    resume_text: text,
                }),
        };

        let response: SubmitResponse = self
            .send_json(request.timeout(timeout), "submission")
            .await?;

        JobHandle::from_response(response).map_err(|message| ApiError::InvalidResponse { message })
    }

    async fn fetch_job_status(&self, job_id: &str) -> Result<StatusSnapshot, ApiError> {
        let request = self
            .client
            .get(self.config.url(&endpoints::job_status(job_id)))
            .timeout(Duration::from_millis(self.config.fetch_timeout_ms));

        let response: StatusResponse = self.send_json(request, "job status").await?;

        StatusSnapshot::from_response(response)
            .map_err(|message| ApiError::InvalidResponse { message })
    }
}
