//! Google API error responses.
//!
//! Google APIs report failures as
//!
//! ```json
//! {"error": {"code": 403, "message": "Rate Limit Exceeded", "status": "PERMISSION_DENIED"}}
//! ```

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{ClassifyError, parse_retry_after};

/// A non-success response from a Google API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Google API error {code}: {message}")]
pub struct GoogleApiError {
    /// HTTP status code.
    pub code: u16,
    pub message: String,
    /// Canonical status name, e.g. `RESOURCE_EXHAUSTED`.
    pub status: Option<String>,
    /// Parsed `Retry-After` header of the response.
    pub retry_after: Option<Duration>,
}

#[derive(Deserialize)]
struct Envelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleApiError {
    /// Build from a status code and response body.
    ///
    /// Bodies that are not a Google error envelope become the message as-is.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<Envelope>(body) {
            Ok(Envelope { error }) => Self {
                code: error.code.unwrap_or(status),
                message: if error.message.is_empty() {
                    format!("HTTP {status}")
                } else {
                    error.message
                },
                status: error.status,
                retry_after: None,
            },
            Err(_) => Self {
                code: status,
                message: if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                },
                status: None,
                retry_after: None,
            },
        }
    }

    /// Read the error out of a failed response, consuming it.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.text().await.unwrap_or_default();

        Self {
            retry_after,
            ..Self::from_body(status, &body)
        }
    }
}

impl ClassifyError for GoogleApiError {
    fn status_code(&self) -> Option<u16> {
        Some(self.code)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}
