//! In-process HTTP/1.1 test peer.
//!
//! Protocol tests need a real conversation partner: the fixture binds an
//! ephemeral local port, reads each request fully, hands it to the
//! configured callback, and writes the callback's response. Bodies
//! arriving with `Content-Encoding: aws-chunked` are de-framed before the
//! callback sees them; `Transfer-Encoding: chunked` is handled by the HTTP
//! stack underneath.

use axum::extract::State;
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Message shown when aws-chunked framing cannot be parsed.
pub const CORRUPT_CHUNKED_DATA: &str = "corrupt chunked data";

/// A fully read request as the callback sees it.
#[derive(Debug, Clone)]
pub struct FixtureRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    /// Body bytes, de-framed when aws-chunked.
    pub body: Bytes,
}

/// The callback's answer.
#[derive(Debug, Clone)]
pub struct FixtureResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FixtureResponse {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Bytes::from(body.into()),
        }
    }

    pub fn xml(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type".into(), "application/xml".into())],
            body: Bytes::from(body.into()),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Bytes::from(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self
    }
}

/// Per-exchange callback.
pub type FixtureHandler =
    dyn Fn(FixtureRequest) -> Result<FixtureResponse, String> + Send + Sync + 'static;

/// The running server.
pub struct FixtureServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl FixtureServer {
    /// Bind an ephemeral local port and serve `handler`.
    pub async fn start(handler: Arc<FixtureHandler>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .fallback(any(handle_exchange))
            .with_state(handler);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "fixture server failed");
            }
        });

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:49152`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for the serve task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn handle_exchange(
    State(handler): State<Arc<FixtureHandler>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let raw = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let body = if is_aws_chunked(&parts.headers) {
        match decode_aws_chunked(&raw) {
            Ok(decoded) => decoded,
            Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
        }
    } else {
        raw
    };

    let fixture_request = FixtureRequest {
        method: parts.method,
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body,
    };

    match handler(fixture_request) {
        Ok(response) => build_response(response),
        Err(message) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &message),
    }
}

fn is_aws_chunked(headers: &HeaderMap) -> bool {
    headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("aws-chunked"))
        .unwrap_or(false)
}

fn build_response(response: FixtureResponse) -> axum::response::Response {
    let mut builder = http::Response::builder()
        .status(response.status)
        .header("date", httpdate::fmt_http_date(std::time::SystemTime::now()))
        .header("x-amz-request-id", generate_request_id());
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(axum::body::Body::from(response.body))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "bad response"))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    http::Response::builder()
        .status(status)
        .header("x-amz-request-id", generate_request_id())
        .body(axum::body::Body::from(message.to_string()))
        .expect("static error response")
}

/// Generate a 16-character hex request ID.
fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

// ── aws-chunked framing ─────────────────────────────────────────────

/// De-frame an `aws-chunked` body.
///
/// Each chunk is `<hex-size>;chunk-signature=<64 hex>\r\n<bytes>\r\n` and a
/// zero-size chunk terminates the stream. Signature values are not
/// verified; any framing deviation fails with [`CORRUPT_CHUNKED_DATA`].
pub fn decode_aws_chunked(data: &[u8]) -> Result<Bytes, String> {
    const SIGNATURE_PREFIX: &[u8] = b";chunk-signature=";
    const SIGNATURE_HEX_LEN: usize = 64;

    let mut out = Vec::new();
    let mut pos = 0;

    loop {
        let header_end = find_crlf(&data[pos..])
            .map(|i| pos + i)
            .ok_or_else(|| CORRUPT_CHUNKED_DATA.to_string())?;
        let header = &data[pos..header_end];

        let semi = header
            .iter()
            .position(|&b| b == b';')
            .ok_or_else(|| CORRUPT_CHUNKED_DATA.to_string())?;
        let size_str = std::str::from_utf8(&header[..semi])
            .map_err(|_| CORRUPT_CHUNKED_DATA.to_string())?;
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| CORRUPT_CHUNKED_DATA.to_string())?;

        // The signature field is rigid: prefix plus exactly 64 hex chars.
        let signature = &header[semi..];
        if !signature.starts_with(SIGNATURE_PREFIX)
            || signature.len() != SIGNATURE_PREFIX.len() + SIGNATURE_HEX_LEN
            || !signature[SIGNATURE_PREFIX.len()..]
                .iter()
                .all(|b| b.is_ascii_hexdigit())
        {
            return Err(CORRUPT_CHUNKED_DATA.to_string());
        }

        pos = header_end + 2;

        if size == 0 {
            return Ok(Bytes::from(out));
        }

        if pos + size + 2 > data.len() {
            return Err(CORRUPT_CHUNKED_DATA.to_string());
        }
        out.extend_from_slice(&data[pos..pos + size]);
        if &data[pos + size..pos + size + 2] != b"\r\n" {
            return Err(CORRUPT_CHUNKED_DATA.to_string());
        }
        pos += size + 2;
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == b"\r\n")
}
