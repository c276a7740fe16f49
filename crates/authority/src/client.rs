//! Submission authority API client.
//!
//! Wraps the authority's REST endpoints: batch submission of observations
//! and the health path used as a reachability probe.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use uuid::Uuid;

use fieldsync_core::connectivity::ReachabilityProbe;
use fieldsync_core::observation::Observation;
use fieldsync_core::sync::{
    classify_http_status, AuthorityFailure, BatchReceipt, RetryClass, SubmissionAuthority,
};

use crate::error::{AuthorityError, Result};
use crate::types::ApiErrorResponse;

/// Default timeout for API requests. A request that exceeds it is treated
/// the same as any other network failure.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Environment variable carrying the authority base URL.
pub const API_URL_ENV: &str = "FIELDSYNC_API_URL";

/// Resolve the configured authority base URL.
pub fn configured_base_url() -> Result<String> {
    std::env::var(API_URL_ENV)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AuthorityError::invalid_request(format!(
                "{} not configured. Remote submission is disabled.",
                API_URL_ENV
            ))
        })
}

/// Client for the submission authority REST API.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthorityClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the authority (e.g., "https://api.example.org")
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from the environment configuration.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(&configured_base_url()?))
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AuthorityError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let request_id = HeaderValue::from_str(&Uuid::new_v4().to_string())
            .map_err(|_| AuthorityError::invalid_request("Invalid request ID"))?;
        headers.insert("x-request-id", request_id);

        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            // Try to parse error response
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                if !error.detail.is_empty() {
                    return Err(AuthorityError::api(status.as_u16(), error.detail));
                }
            }
            return Err(AuthorityError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            AuthorityError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Submit an ordered batch of observations.
    ///
    /// POST /api/forms/sync
    pub async fn sync_submissions(
        &self,
        token: &str,
        batch: &[Observation],
    ) -> Result<BatchReceipt> {
        let url = format!("{}/api/forms/sync", self.base_url);
        debug!("Submitting batch of {} observation(s)", batch.len());

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&batch)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Probe the authority's health path.
    ///
    /// GET /health
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("Health probe failed: {}", err);
                false
            }
        }
    }
}

/// Map a client error into the engine-facing failure contract.
fn to_failure(err: AuthorityError) -> AuthorityFailure {
    match err {
        AuthorityError::Api { status, message } => match classify_http_status(status) {
            RetryClass::ReauthRequired => {
                AuthorityFailure::Auth(format!("({}) {}", status, message))
            }
            _ => AuthorityFailure::Rejected { status, message },
        },
        AuthorityError::Auth(message) => AuthorityFailure::Auth(message),
        other => AuthorityFailure::Network(other.to_string()),
    }
}

#[async_trait]
impl SubmissionAuthority for AuthorityClient {
    async fn submit_batch(
        &self,
        token: &str,
        batch: &[Observation],
    ) -> std::result::Result<BatchReceipt, AuthorityFailure> {
        self.sync_submissions(token, batch).await.map_err(to_failure)
    }
}

#[async_trait]
impl ReachabilityProbe for AuthorityClient {
    async fn probe(&self) -> bool {
        self.check_health().await
    }
}
