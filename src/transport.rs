//! Pluggable HTTP transport.
//!
//! The orchestrator talks to the network only through [`HttpTransport`];
//! the default implementation rides on a shared `reqwest` connection pool.
//! Tests inject their own transport or point the reqwest one at the
//! in-process fixture server.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::TransportError;
use crate::request::AwsRequest;

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct AwsHttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl AwsHttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Async HTTP transport contract.
pub trait HttpTransport: Send + Sync + 'static {
    /// Send `request`, observing `timeout` for the whole exchange.
    fn execute(
        &self,
        request: AwsRequest,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<AwsHttpResponse, TransportError>> + Send + '_>>;
}

/// Default transport over a shared `reqwest` connection pool.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        request: AwsRequest,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<AwsHttpResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method, request.url)
                .headers(request.headers)
                .timeout(timeout);

            if let Some(bytes) = request.body.as_bytes() {
                builder = builder.body(bytes);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;

            Ok(AwsHttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else if err.is_builder() || err.is_request() {
        TransportError::Other(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}
