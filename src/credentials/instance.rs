//! EC2 instance metadata credential provider.
//!
//! Speaks IMDSv2 first: a PUT to the token endpoint, then the role listing
//! and role document with the session token attached. Any failure on the
//! token step retries the whole sequence without the token header (IMDSv1).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{CredentialProvider, ExpiringCredential, MetadataCredentialDocument};
use crate::errors::CredentialError;

/// Base URL of the EC2 instance metadata service.
const IMDS_BASE: &str = "http://169.254.169.254";

/// Session tokens are requested with a 6 hour TTL.
const TOKEN_TTL_SECONDS: &str = "21600";

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider backed by the EC2 instance metadata service.
pub struct InstanceProvider {
    client: reqwest::Client,
    base_url: String,
}

impl InstanceProvider {
    pub fn new() -> Self {
        Self::with_base_url(IMDS_BASE.to_string())
    }

    /// Provider pointed at an alternative endpoint, for tests.
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(IMDS_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client, base_url }
    }

    /// IMDSv2 step (a): acquire a session token.
    async fn fetch_token(&self) -> Result<String, CredentialError> {
        let url = format!("{}/latest/api/token", self.base_url);
        let response = self
            .client
            .put(&url)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await
            .map_err(|e| CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("token request returned {}", response.status()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("token body unreadable: {e}"),
            })
    }

    async fn get_metadata(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<String, CredentialError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("GET {url} failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("GET {url} returned {}", response.status()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("GET {url} body unreadable: {e}"),
            })
    }

    /// Steps (b) and (c): role name, then the role's credential document.
    async fn fetch_role_credential(
        &self,
        token: Option<&str>,
    ) -> Result<ExpiringCredential, CredentialError> {
        let role = self
            .get_metadata("/latest/meta-data/iam/security-credentials/", token)
            .await?;
        let role = role.trim();
        if role.is_empty() {
            return Err(CredentialError::ProviderFailed {
                provider: "imds",
                message: "no IAM role attached to this instance".into(),
            });
        }

        let body = self
            .get_metadata(
                &format!("/latest/meta-data/iam/security-credentials/{role}"),
                token,
            )
            .await?;

        let document: MetadataCredentialDocument =
            serde_json::from_str(&body).map_err(|e| CredentialError::ProviderFailed {
                provider: "imds",
                message: format!("bad credential document for role {role}: {e}"),
            })?;

        document.into_credential("imds")
    }
}

impl Default for InstanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for InstanceProvider {
    fn name(&self) -> &'static str {
        "imds"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        Box::pin(async move {
            // IMDSv2 with v1 fallback: a failed token step (hop limit, old
            // instance, 403) downgrades the whole sequence to tokenless.
            let token = match self.fetch_token().await {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::debug!(error = %err, "IMDSv2 token unavailable, falling back to IMDSv1");
                    None
                }
            };

            self.fetch_role_credential(token.as_deref()).await
        })
    }
}
