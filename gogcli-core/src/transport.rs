//! Outbound HTTP for Google API calls.
//!
//! Requests go through a stack of [`RoundTrip`] layers: the hardened
//! [`reqwest::Client`] from [`build_http_client`] at the bottom, then
//! [`BearerAuth`] injecting the token, with [`RetryTransport`] on top
//! applying the 429/5xx policy and the circuit breaker.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Method, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::api_error::GoogleApiError;
use crate::error::CircuitBreakerError;
use crate::resilience::{
    CallContext, ClassifyError, ContextError, RetryConfig, exponential_backoff, parse_retry_after,
};
use crate::token::{TokenError, TokenSource};

/// Client-level timeout applied to every request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for outbound API calls.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("obtain access token: {0}")]
    Token(#[from] TokenError),

    #[error("read request body: {0}")]
    Body(#[source] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("JSON body: {0}")]
    Json(#[source] serde_json::Error),

    #[error(transparent)]
    Api(#[from] GoogleApiError),
}

impl TransportError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

impl ClassifyError for TransportError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status_code(),
            Self::Api(e) => e.status_code(),
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Streaming request body.
pub type BodyStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Body of an [`ApiRequest`].
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// Read once and buffered before the first attempt.
    Stream(BodyStream),
}

impl RequestBody {
    async fn buffer(self) -> std::io::Result<Option<Vec<u8>>> {
        match self {
            Self::Empty => Ok(None),
            Self::Bytes(bytes) => Ok(Some(bytes)),
            Self::Stream(stream) => {
                let chunks: Vec<Vec<u8>> = stream.try_collect().await?;
                Ok(Some(chunks.concat()))
            }
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A request that can be replayed across retries.
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(body);
        self
    }

    pub fn with_stream(mut self, stream: BodyStream) -> Self {
        self.body = RequestBody::Stream(stream);
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json<T: serde::Serialize + ?Sized>(self, value: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_vec(value).map_err(TransportError::Json)?;
        Ok(self
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body))
    }
}

/// One layer of the HTTP stack.
#[async_trait]
pub trait RoundTrip: Send + Sync {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl RoundTrip for reqwest::Client {
    async fn round_trip(&self, request: Request) -> Result<Response, TransportError> {
        Ok(self.execute(request).await?)
    }
}

/// Build the base HTTP client: rustls, TLS 1.2 or newer, bounded timeouts.
pub fn build_http_client() -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(TransportError::Build)
}

/// Sets the `Authorization` header from a token source on every request.
pub struct BearerAuth {
    source: Arc<dyn TokenSource>,
    inner: Arc<dyn RoundTrip>,
}

impl BearerAuth {
    pub fn new(source: Arc<dyn TokenSource>, inner: Arc<dyn RoundTrip>) -> Self {
        Self { source, inner }
    }
}

#[async_trait]
impl RoundTrip for BearerAuth {
    async fn round_trip(&self, mut request: Request) -> Result<Response, TransportError> {
        let token = self.source.token().await?;
        let mut value = HeaderValue::from_str(&token.authorization_value()).map_err(|_| {
            TokenError::Unavailable {
                message: "access token is not a valid header value".to_string(),
            }
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.inner.round_trip(request).await
    }
}

/// Retries rate-limited (429) and failed (5xx) requests.
///
/// Exhausted retries hand the last response back unchanged. Only a tripped
/// circuit breaker or a finished [`CallContext`] turn into errors; transport
/// failures are returned as-is without a retry.
pub struct RetryTransport {
    base: Arc<dyn RoundTrip>,
    config: RetryConfig,
}

impl RetryTransport {
    pub fn new(base: Arc<dyn RoundTrip>) -> Self {
        Self::with_config(base, RetryConfig::default())
    }

    pub fn with_config(base: Arc<dyn RoundTrip>, config: RetryConfig) -> Self {
        Self { base, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        ctx: &CallContext,
        request: ApiRequest,
    ) -> Result<Response, TransportError> {
        if self.config.breaker_rejects() {
            return Err(CircuitBreakerError.into());
        }

        let ApiRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let body = body.buffer().await.map_err(TransportError::Body)?;

        let mut retries_429 = 0u32;
        let mut retries_5xx = 0u32;

        loop {
            let mut attempt = Request::new(method.clone(), url.clone());
            *attempt.headers_mut() = headers.clone();
            if let Some(bytes) = &body {
                *attempt.body_mut() = Some(reqwest::Body::from(bytes.clone()));
            }

            let response = ctx.run(self.base.round_trip(attempt)).await??;
            let status = response.status().as_u16();

            if status < 400 {
                self.config.record_success();
                return Ok(response);
            }

            if status == 429 {
                if retries_429 >= self.config.max_rate_limit_retries {
                    return Ok(response);
                }

                let delay = self.rate_limit_delay(retries_429, &response);
                tracing::info!(
                    delay = ?delay,
                    attempt = retries_429 + 1,
                    max_retries = self.config.max_rate_limit_retries,
                    "rate limited, retrying"
                );
                drop(response);

                ctx.sleep(delay).await?;
                retries_429 += 1;
                continue;
            }

            if status >= 500 {
                self.config.record_failure();

                if retries_5xx >= self.config.max_5xx_retries {
                    return Ok(response);
                }

                tracing::info!(status, attempt = retries_5xx + 1, "server error, retrying");
                drop(response);

                ctx.sleep(self.config.server_error_delay).await?;
                retries_5xx += 1;
                continue;
            }

            return Ok(response);
        }
    }

    /// `Retry-After` when present and parseable, else jittered backoff.
    fn rate_limit_delay(&self, attempt: u32, response: &Response) -> Duration {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()))
            .unwrap_or_else(|| exponential_backoff(self.config.base_delay, attempt))
    }
}

impl std::fmt::Debug for RetryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_stream_body_buffered_in_order() {
        let chunks = vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())];
        let body = RequestBody::Stream(Box::pin(stream::iter(chunks)));

        assert_eq!(body.buffer().await.unwrap(), Some(b"hello world".to_vec()));
    }

    #[tokio::test]
    async fn test_stream_body_error_propagates() {
        let chunks: Vec<std::io::Result<Vec<u8>>> = vec![
            Ok(b"partial".to_vec()),
            Err(std::io::Error::other("disk gone")),
        ];
        let body = RequestBody::Stream(Box::pin(stream::iter(chunks)));

        assert!(body.buffer().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert_eq!(RequestBody::Empty.buffer().await.unwrap(), None);
    }

    #[test]
    fn test_with_json_sets_content_type() {
        let url = Url::parse("https://www.googleapis.com/drive/v3/files").unwrap();
        let request = ApiRequest::new(Method::POST, url)
            .with_json(&serde_json::json!({"name": "report"}))
            .unwrap();

        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert!(matches!(request.body, RequestBody::Bytes(ref b) if b == br#"{"name":"report"}"#));
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client().is_ok());
    }

    #[test]
    fn test_transport_error_classification() {
        let api = TransportError::Api(GoogleApiError::from_body(503, ""));
        assert_eq!(api.status_code(), Some(503));
        assert!(api.is_retryable());

        let open = TransportError::CircuitOpen(CircuitBreakerError);
        assert!(open.is_circuit_open());
        assert_eq!(open.status_code(), None);
        assert!(!open.is_retryable());
    }
}
