//! Ordered request/response transformer chain.
//!
//! Middlewares run in configuration order for outgoing requests (before
//! signing) and in reverse order for incoming responses (before decoding).
//! A failing transformer aborts the exchange with its error. Nothing may
//! touch signer-owned headers after signing has started; the orchestrator
//! enforces this by running the chain strictly pre-signing.

use std::sync::Arc;

use crate::errors::AwsError;
use crate::request::AwsRequest;
use crate::transport::AwsHttpResponse;

/// Per-request metadata visible to middlewares and log lines.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Process-monotone request counter.
    pub request_id: u64,
    pub service: String,
    pub operation: String,
}

/// A request/response transformer.
///
/// Both hooks default to pass-through so implementations override only the
/// direction they care about.
pub trait Middleware: Send + Sync + 'static {
    fn chain_request(
        &self,
        request: AwsRequest,
        _ctx: &RequestContext,
    ) -> Result<AwsRequest, AwsError> {
        Ok(request)
    }

    fn chain_response(
        &self,
        response: AwsHttpResponse,
        _ctx: &RequestContext,
    ) -> Result<AwsHttpResponse, AwsError> {
        Ok(response)
    }
}

/// Run the request hooks in configuration order.
pub fn apply_request_chain(
    middlewares: &[Arc<dyn Middleware>],
    mut request: AwsRequest,
    ctx: &RequestContext,
) -> Result<AwsRequest, AwsError> {
    for middleware in middlewares {
        request = middleware.chain_request(request, ctx)?;
    }
    Ok(request)
}

/// Run the response hooks in reverse configuration order.
pub fn apply_response_chain(
    middlewares: &[Arc<dyn Middleware>],
    mut response: AwsHttpResponse,
    ctx: &RequestContext,
) -> Result<AwsHttpResponse, AwsError> {
    for middleware in middlewares.iter().rev() {
        response = middleware.chain_response(response, ctx)?;
    }
    Ok(response)
}
