//! Authenticated Google API client.

use reqwest::Response;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use crate::api_error::GoogleApiError;
use crate::resilience::{CallContext, RetryConfig};
use crate::token::TokenSource;
use crate::transport::{
    ApiRequest, BearerAuth, RetryTransport, RoundTrip, TransportError, build_http_client,
};

/// A [`RetryTransport`] over a bearer-authenticated HTTP client.
///
/// Cheap to clone; clones share the transport and its circuit breaker.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Arc<RetryTransport>,
}

impl ApiClient {
    /// Client over the default hardened HTTP stack.
    pub fn new(source: Arc<dyn TokenSource>, config: RetryConfig) -> Result<Self, TransportError> {
        let http: Arc<dyn RoundTrip> = Arc::new(build_http_client()?);
        Ok(Self::with_base(source, http, config))
    }

    /// Client over a caller-supplied bottom layer.
    pub fn with_base(
        source: Arc<dyn TokenSource>,
        base: Arc<dyn RoundTrip>,
        config: RetryConfig,
    ) -> Self {
        let authed = Arc::new(BearerAuth::new(source, base));
        Self {
            transport: Arc::new(RetryTransport::with_config(authed, config)),
        }
    }

    pub fn transport(&self) -> &RetryTransport {
        &self.transport
    }

    /// Send a request through the retry transport.
    ///
    /// Error statuses are returned as responses, not errors.
    pub async fn send(
        &self,
        ctx: &CallContext,
        request: ApiRequest,
    ) -> Result<Response, TransportError> {
        self.transport.execute(ctx, request).await
    }

    pub async fn get(&self, ctx: &CallContext, url: &str) -> Result<Response, TransportError> {
        let url = Url::parse(url)?;
        self.send(ctx, ApiRequest::get(url)).await
    }

    /// GET `url` and decode a JSON body.
    ///
    /// A non-success status becomes [`TransportError::Api`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        url: &str,
    ) -> Result<T, TransportError> {
        let response = self.get(ctx, url).await?;
        if !response.status().is_success() {
            let err = GoogleApiError::from_response(response).await;
            tracing::debug!(code = err.code, message = %err.message, "API call failed");
            return Err(err.into());
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(TransportError::Json)
    }
}
