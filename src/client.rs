//! The client orchestrator.
//!
//! [`AwsClient`] wires the subsystems together: credential resolution,
//! request building, the middleware chain, SigV4 signing, the transport
//! with its retry loop, and response decoding. One client instance serves
//! one `(service, region)` pair and is cheap to share behind an `Arc`.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Instrument};

use crate::config::ServiceConfig;
use crate::credentials::CredentialResolver;
use crate::errors::{AwsError, ClientError};
use crate::metrics::{REQUESTS_TOTAL, REQUEST_DURATION, REQUEST_ERRORS, RETRIES_TOTAL};
use crate::middleware::{apply_request_chain, apply_response_chain, RequestContext};
use crate::operation::OperationDescriptor;
use crate::request::build_request;
use crate::response::{decode_error, decode_response};
use crate::retry::{JitterRetry, RetryPolicy};
use crate::shape::ShapeValue;
use crate::signer::Signer;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Generic AWS service client.
pub struct AwsClient {
    config: ServiceConfig,
    credentials: CredentialResolver,
    transport: Arc<dyn HttpTransport>,
    /// Whether this client created the transport and owns its lifecycle.
    owns_transport: bool,
    retry_policy: Arc<dyn RetryPolicy>,
    request_counter: AtomicU64,
    shut_down: AtomicBool,
}

impl AwsClient {
    /// Client with its own transport (shared `reqwest` connection pool)
    /// and the default jittered retry policy.
    pub fn new(config: ServiceConfig, credentials: CredentialResolver) -> Self {
        Self {
            config,
            credentials,
            transport: Arc::new(ReqwestTransport::new()),
            owns_transport: true,
            retry_policy: Arc::new(JitterRetry::default()),
            request_counter: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Client over an injected transport whose lifecycle the caller keeps.
    pub fn with_transport(
        config: ServiceConfig,
        credentials: CredentialResolver,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            config,
            credentials,
            transport,
            owns_transport: false,
            retry_policy: Arc::new(JitterRetry::default()),
            request_counter: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Execute one operation end to end.
    pub async fn execute(
        &self,
        op: &OperationDescriptor,
        input: Option<ShapeValue>,
    ) -> Result<Option<ShapeValue>, AwsError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ClientError::AlreadyShutdown.into());
        }

        let request_id = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = RequestContext {
            request_id,
            service: self.config.service_name.clone(),
            operation: op.name.clone(),
        };

        let span = tracing::info_span!(
            "aws_request",
            "aws-service" = %ctx.service,
            "aws-operation" = %ctx.operation,
            "aws-request-id" = ctx.request_id,
        );

        let started = Instant::now();
        counter!(
            REQUESTS_TOTAL,
            "service" => ctx.service.clone(),
            "operation" => ctx.operation.clone()
        )
        .increment(1);

        let result = self
            .execute_with_retry(op, input, &ctx)
            .instrument(span)
            .await;

        histogram!(
            REQUEST_DURATION,
            "service" => ctx.service.clone(),
            "operation" => ctx.operation.clone()
        )
        .record(started.elapsed().as_secs_f64());

        if let Err(err) = &result {
            counter!(
                REQUEST_ERRORS,
                "service" => ctx.service.clone(),
                "operation" => ctx.operation.clone()
            )
            .increment(1);
            error!(
                "aws-service" = %ctx.service,
                "aws-operation" = %ctx.operation,
                "aws-request-id" = ctx.request_id,
                error = %err,
                "request failed"
            );
        }

        result
    }

    async fn execute_with_retry(
        &self,
        op: &OperationDescriptor,
        input: Option<ShapeValue>,
        ctx: &RequestContext,
    ) -> Result<Option<ShapeValue>, AwsError> {
        let credential = self.credentials.get_credential().await?;

        // Body encoding is CPU-bound; keep it off the async workers.
        let request = {
            let op = op.clone();
            let config = self.config.clone();
            tokio::task::spawn_blocking(move || build_request(&op, &config, input.as_ref()))
                .await
                .map_err(|e| AwsError::Protocol(format!("encoder task failed: {e}")))??
        };

        let mut request = apply_request_chain(&self.config.middlewares, request, ctx)?;

        // Middlewares are done; nothing below may touch signed headers.
        let signer = Signer::new(
            &credential.credential,
            &self.config.region,
            &self.config.service_name,
        )
        .with_signing_name(&self.config.signing_name);
        let body_bytes = request.body.as_bytes();
        {
            let method = request.method.clone();
            let url = request.url.clone();
            signer.sign_headers(
                &method,
                &url,
                &mut request.headers,
                body_bytes.as_deref(),
                Utc::now(),
            )?;
        }

        let mut attempt: u32 = 0;
        loop {
            let error = match self
                .transport
                .execute(request.clone(), self.config.timeout)
                .await
            {
                Ok(response) if response.is_success() => {
                    let response =
                        apply_response_chain(&self.config.middlewares, response, ctx)?;
                    return decode_response(op, &self.config, &response);
                }
                Ok(response) => AwsError::Service(decode_error(&self.config, &response)),
                Err(err) => AwsError::Transport(err),
            };

            match self.retry_policy.retry_wait_time(&error, attempt) {
                Some(delay) => {
                    info!(
                        "aws-service" = %ctx.service,
                        "aws-operation" = %ctx.operation,
                        "aws-request-id" = ctx.request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying request"
                    );
                    counter!(
                        RETRIES_TOTAL,
                        "service" => ctx.service.clone(),
                        "operation" => ctx.operation.clone()
                    )
                    .increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(error),
            }
        }
    }

    /// Tear down owned resources. A second call reports `AlreadyShutdown`.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyShutdown);
        }
        Ok(())
    }
}

impl Drop for AwsClient {
    fn drop(&mut self) {
        // Destroying a client that owns its transport without shutting it
        // down is a lifecycle contract violation.
        debug_assert!(
            !self.owns_transport || self.shut_down.load(Ordering::SeqCst),
            "AwsClient dropped without shutdown"
        );
    }
}
