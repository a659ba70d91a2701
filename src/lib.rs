//! Cumulo — generic AWS service client runtime.
//!
//! This crate provides the core machinery that turns a typed request
//! description into a correctly signed HTTPS request, dispatches it through
//! a shared connection pool, decodes the response for one of the four AWS
//! wire dialects, and retries transient failures. Auto-generated per-service
//! bindings sit on top of it and supply operation metadata and payloads.

pub mod body;
pub mod client;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod errors;
pub mod fixture;
pub mod metrics;
pub mod middleware;
pub mod operation;
pub mod request;
pub mod response;
pub mod retry;
pub mod shape;
pub mod signer;
pub mod transport;
pub mod waiter;
pub mod xml;

/// Initialize tracing output for applications embedding the client.
///
/// Respects `RUST_LOG`; defaults to `info`. Safe to skip when the embedding
/// application installs its own subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

pub use body::Body;
pub use client::AwsClient;
pub use config::{Protocol, ServiceConfig};
pub use credentials::{Credential, CredentialResolver};
pub use errors::{AwsError, ClientError};
pub use operation::OperationDescriptor;
pub use shape::ShapeValue;
