//! Service configuration and endpoint resolution.
//!
//! A [`ServiceConfig`] describes one service in one region: wire dialect,
//! API version, signing name, endpoint overrides, timeout, and the service
//! specific error codes the decoder should recognize. [`ClientSettings`]
//! carries the YAML-loadable client-wide defaults.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::errors::ClientError;
use crate::middleware::Middleware;

/// Wire dialect of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// AWS JSON RPC with a version, e.g. `1.0` or `1.1`.
    Json { version: String },
    RestJson,
    RestXml,
    Query,
    /// Query variant with EC2-style list flattening.
    Ec2,
}

impl Protocol {
    /// `Content-Type` emitted for request bodies of this dialect.
    pub fn content_type(&self) -> String {
        match self {
            Protocol::Json { version } => format!("application/x-amz-json-{version}"),
            Protocol::RestJson => "application/json".to_string(),
            Protocol::RestXml => "application/xml".to_string(),
            Protocol::Query | Protocol::Ec2 => {
                "application/x-www-form-urlencoded; charset=utf-8".to_string()
            }
        }
    }

    /// Whether request bodies are form-encoded `Action=...` documents.
    pub fn is_query_like(&self) -> bool {
        matches!(self, Protocol::Query | Protocol::Ec2)
    }
}

/// Static description of one service in one region.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Region the client addresses, e.g. `us-east-1`.
    pub region: String,
    /// Endpoint partition: `aws` or `aws-cn`.
    pub partition: String,
    /// Service DNS prefix, e.g. `s3`, `dynamodb`.
    pub service_name: String,
    /// Name used in the SigV4 credential scope; defaults to `service_name`.
    pub signing_name: String,
    pub protocol: Protocol,
    /// API version string sent in query-dialect bodies.
    pub api_version: String,
    /// Explicit endpoint override (highest precedence).
    pub endpoint: Option<String>,
    /// Per-region endpoint hostname overrides from the endpoints manifest.
    pub service_endpoints: HashMap<String, String>,
    /// Partition-wide endpoint hostname for global services.
    pub partition_endpoint: Option<String>,
    /// Per-request deadline handed to the transport.
    pub timeout: Duration,
    /// Request/response transformers, run in order for requests and in
    /// reverse for responses.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Service-specific error codes tried first by the error decoder.
    pub possible_error_types: Vec<String>,
    /// Prefix for `X-Amz-Target` on JSON-RPC services that require it.
    pub target_prefix: Option<String>,
    /// Namespace attribute for REST-XML request documents.
    pub xml_namespace: Option<String>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("region", &self.region)
            .field("service_name", &self.service_name)
            .field("signing_name", &self.signing_name)
            .field("protocol", &self.protocol)
            .field("api_version", &self.api_version)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl ServiceConfig {
    pub fn new(
        region: impl Into<String>,
        service_name: impl Into<String>,
        protocol: Protocol,
        api_version: impl Into<String>,
    ) -> Self {
        let service_name = service_name.into();
        Self {
            region: region.into(),
            partition: "aws".to_string(),
            signing_name: service_name.clone(),
            service_name,
            protocol,
            api_version: api_version.into(),
            endpoint: None,
            service_endpoints: HashMap::new(),
            partition_endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            middlewares: Vec::new(),
            possible_error_types: Vec::new(),
            target_prefix: None,
            xml_namespace: None,
        }
    }

    pub fn with_signing_name(mut self, signing_name: impl Into<String>) -> Self {
        self.signing_name = signing_name.into();
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_service_endpoints(
        mut self,
        endpoints: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        self.service_endpoints = endpoints
            .into_iter()
            .map(|(region, host)| (region.to_string(), host.to_string()))
            .collect();
        self
    }

    pub fn with_partition_endpoint(mut self, host: impl Into<String>) -> Self {
        self.partition_endpoint = Some(host.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_possible_error_types(
        mut self,
        codes: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.possible_error_types = codes.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_target_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target_prefix = Some(prefix.into());
        self
    }

    pub fn with_xml_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.xml_namespace = Some(namespace.into());
        self
    }

    /// DNS suffix for the configured partition.
    fn dns_suffix(&self) -> &'static str {
        match self.partition.as_str() {
            "aws-cn" => "amazonaws.com.cn",
            _ => "amazonaws.com",
        }
    }

    /// Resolve the base endpoint URL.
    ///
    /// Precedence: explicit endpoint, per-region override, partition
    /// endpoint, then the standard `https://<service>.<region>.<suffix>`.
    pub fn resolve_endpoint(&self) -> Result<Url, ClientError> {
        let raw = if let Some(endpoint) = &self.endpoint {
            endpoint.clone()
        } else if let Some(host) = self.service_endpoints.get(&self.region) {
            format!("https://{host}")
        } else if let Some(host) = &self.partition_endpoint {
            format!("https://{host}")
        } else {
            if self.region.is_empty() {
                return Err(ClientError::InvalidRegion(self.region.clone()));
            }
            format!(
                "https://{}.{}.{}",
                self.service_name,
                self.region,
                self.dns_suffix()
            )
        };

        Url::parse(&raw).map_err(|_| ClientError::InvalidUrl(raw))
    }
}

// -- Client-wide settings ----------------------------------------------------

/// Client-wide defaults, loadable from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// Default region; `AWS_DEFAULT_REGION` wins over the file value.
    #[serde(default = "default_region")]
    pub region: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry budget for the default policy.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for the default retry policy, milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl ClientSettings {
    /// Effective region: environment override, then the configured value.
    pub fn effective_region(&self) -> String {
        std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.region.clone())
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

/// Load client settings from a YAML file at `path`.
pub fn load_settings<P: AsRef<Path>>(path: P) -> anyhow::Result<ClientSettings> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let settings: ClientSettings = serde_yaml::from_str(&contents)?;
    Ok(settings)
}
