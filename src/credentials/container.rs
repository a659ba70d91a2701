//! ECS container metadata credential provider.
//!
//! Active only when `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is set; fetches
//! the credential document from the task-scoped endpoint at
//! `169.254.170.2`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{CredentialProvider, ExpiringCredential, MetadataCredentialDocument};
use crate::errors::CredentialError;

/// Base URL of the ECS task metadata endpoint.
const ECS_METADATA_BASE: &str = "http://169.254.170.2";

/// Hard timeout for metadata fetches.
const ECS_TIMEOUT: Duration = Duration::from_secs(2);

/// Provider backed by the ECS container credential endpoint.
pub struct ContainerProvider {
    client: reqwest::Client,
    base_url: String,
    /// Explicit relative URI; the environment is consulted when `None`.
    relative_uri: Option<String>,
}

impl ContainerProvider {
    pub fn new() -> Self {
        Self::with_base_url(ECS_METADATA_BASE.to_string())
    }

    /// Provider pointed at an alternative endpoint, for tests.
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(ECS_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url,
            relative_uri: None,
        }
    }

    /// Pin the relative URI instead of reading the environment.
    pub fn with_relative_uri(mut self, relative_uri: impl Into<String>) -> Self {
        self.relative_uri = Some(relative_uri.into());
        self
    }

    async fn fetch(&self, relative_uri: &str) -> Result<ExpiringCredential, CredentialError> {
        let url = format!("{}{}", self.base_url, relative_uri);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CredentialError::ProviderFailed {
                provider: "ecs",
                message: format!("GET {url} failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(CredentialError::ProviderFailed {
                provider: "ecs",
                message: format!("GET {url} returned {}", response.status()),
            });
        }

        let document: MetadataCredentialDocument =
            response
                .json()
                .await
                .map_err(|e| CredentialError::ProviderFailed {
                    provider: "ecs",
                    message: format!("bad credential document: {e}"),
                })?;

        document.into_credential("ecs")
    }
}

impl Default for ContainerProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for ContainerProvider {
    fn name(&self) -> &'static str {
        "ecs"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        Box::pin(async move {
            let relative_uri = match &self.relative_uri {
                Some(uri) => uri.clone(),
                None => std::env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .ok_or(CredentialError::ProviderFailed {
                        provider: "ecs",
                        message: "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI not set".into(),
                    })?,
            };

            self.fetch(&relative_uri).await
        })
    }
}
