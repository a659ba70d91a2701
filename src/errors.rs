//! Client error taxonomy.
//!
//! Every failure a caller can observe maps to one of the enums here.
//! [`ServiceError`] carries errors decoded from non-2xx responses and knows
//! which of them the retry controller may re-attempt; everything else
//! surfaces immediately.

use std::time::Duration;
use thiserror::Error;

/// Well-known 4xx error codes shared by all AWS services.
///
/// A decoded error code matching one of these (after the `Exception` suffix
/// is stripped) is surfaced as [`ServiceError::Client`].
pub const CLIENT_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "IncompleteSignature",
    "InvalidAction",
    "InvalidClientTokenId",
    "InvalidParameterCombination",
    "InvalidParameterValue",
    "InvalidQueryParameter",
    "MalformedQueryString",
    "MissingAction",
    "MissingAuthenticationToken",
    "MissingParameter",
    "OptInRequired",
    "RequestExpired",
    "Throttling",
    "UnrecognizedClient",
    "ValidationError",
];

/// Well-known 5xx error codes shared by all AWS services.
pub const SERVER_ERROR_CODES: &[&str] = &["InternalFailure", "ServiceUnavailable"];

/// Configuration and lifecycle errors raised before a request leaves the
/// client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No region was configured and none could be derived.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// The resolved endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// A header or parameter value cannot be represented on the wire.
    #[error("invalid value for header {0}")]
    InvalidHeader(String),

    /// A path parameter named by the operation was missing from the input.
    #[error("missing required path parameter {0}")]
    MissingPathParameter(String),

    /// `shutdown` was called on a client that is already shut down.
    #[error("client already shut down")]
    AlreadyShutdown,
}

/// Credential acquisition errors.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// A single provider failed; the chain falls through on this.
    #[error("credential provider {provider} failed: {message}")]
    ProviderFailed {
        provider: &'static str,
        message: String,
    },

    /// Every provider in the chain failed.
    #[error("no credential provider in the chain produced a credential")]
    NoProvider,
}

/// Transport-level failures from the HTTP layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection establishment failed (DNS, TCP, TLS).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection broke mid-exchange.
    #[error("i/o error: {0}")]
    Io(String),

    /// The request could not be constructed or sent for a non-network reason.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the retry controller may re-attempt after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout(_) | TransportError::Connection(_) | TransportError::Io(_)
        )
    }
}

/// An error decoded from a non-2xx service response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// A 4xx-class error with a well-known client code.
    #[error("{code}: {message}")]
    Client {
        code: String,
        message: String,
        status: u16,
    },

    /// A 5xx-class error with a well-known server code.
    #[error("{code}: {message}")]
    Server {
        code: String,
        message: String,
        status: u16,
    },

    /// A code from the operation's `possible_error_types`.
    #[error("{code}: {message}")]
    Service {
        code: String,
        message: String,
        status: u16,
    },

    /// A decodable error whose code matched no known taxonomy.
    #[error("{code}: {message}")]
    Response {
        code: String,
        message: String,
        status: u16,
    },

    /// The error body could not be decoded at all.
    #[error("Unhandled Error (status {status})")]
    Unhandled { status: u16, raw_body: String },
}

impl ServiceError {
    /// HTTP status the error was decoded from.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Client { status, .. }
            | ServiceError::Server { status, .. }
            | ServiceError::Service { status, .. }
            | ServiceError::Response { status, .. }
            | ServiceError::Unhandled { status, .. } => *status,
        }
    }

    /// Error code, if one was decoded.
    pub fn code(&self) -> Option<&str> {
        match self {
            ServiceError::Client { code, .. }
            | ServiceError::Server { code, .. }
            | ServiceError::Service { code, .. }
            | ServiceError::Response { code, .. } => Some(code),
            ServiceError::Unhandled { .. } => None,
        }
    }

    /// Whether the retry controller may re-attempt: 5xx or 429.
    pub fn is_retriable(&self) -> bool {
        let status = self.status();
        status >= 500 || status == 429
    }
}

/// Umbrella error returned by [`crate::client::AwsClient::execute`].
#[derive(Debug, Error)]
pub enum AwsError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The response could not be decoded into the requested shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AwsError {
    /// Whether the retry controller may re-attempt after this error.
    pub fn is_retriable(&self) -> bool {
        match self {
            AwsError::Transport(e) => e.is_transient(),
            AwsError::Service(e) => e.is_retriable(),
            _ => false,
        }
    }
}

/// Errors surfaced by the waiter.
#[derive(Debug, Error)]
pub enum WaiterError {
    /// Cumulative wait exceeded `max_wait`.
    #[error("waiter timed out after {0:?}")]
    Timeout(Duration),

    /// An acceptor matched its `failure` state.
    #[error("waiter reached failure state: {0}")]
    FailureState(String),

    /// The underlying call failed with a non-matching error.
    #[error(transparent)]
    Request(#[from] Box<AwsError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_retriability() {
        let throttled = ServiceError::Client {
            code: "Throttling".into(),
            message: "slow down".into(),
            status: 429,
        };
        assert!(throttled.is_retriable());

        let unavailable = ServiceError::Server {
            code: "ServiceUnavailable".into(),
            message: "".into(),
            status: 503,
        };
        assert!(unavailable.is_retriable());

        let bad_request = ServiceError::Response {
            code: "ValidationError".into(),
            message: "".into(),
            status: 400,
        };
        assert!(!bad_request.is_retriable());
    }

    #[test]
    fn test_transport_transience() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(TransportError::Connection("refused".into()).is_transient());
        assert!(!TransportError::Other("bad header".into()).is_transient());
    }

    #[test]
    fn test_aws_error_never_retries_client_errors() {
        let err = AwsError::Client(ClientError::InvalidRegion("".into()));
        assert!(!err.is_retriable());
        let err = AwsError::Credential(CredentialError::NoProvider);
        assert!(!err.is_retriable());
    }
}
