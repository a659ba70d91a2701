//! Credential records and the provider chain.
//!
//! A [`CredentialProvider`] resolves AWS credentials from one source; the
//! [`ChainProvider`] tries a configured list of them in order and
//! short-circuits on the first success. [`CredentialResolver`] is the value
//! threaded through the client constructor — there is no process-wide
//! default, callers always pass one explicitly.

pub mod cache;
pub mod container;
pub mod env;
pub mod instance;
pub mod profile;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::CredentialError;

/// An immutable AWS credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for STS / role-derived temporary credentials.
    pub session_token: Option<String>,
}

impl Credential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }
}

/// A credential together with its expiration instant, if it has one.
#[derive(Debug, Clone)]
pub struct ExpiringCredential {
    pub credential: Credential,
    /// `None` for static credentials that never expire.
    pub expiration: Option<DateTime<Utc>>,
}

impl ExpiringCredential {
    /// A credential without an expiration.
    pub fn non_expiring(credential: Credential) -> Self {
        Self {
            credential,
            expiration: None,
        }
    }

    /// Whether the credential expires within `window` from now.
    pub fn is_expiring_within(&self, window: Duration) -> bool {
        match self.expiration {
            None => false,
            Some(expiration) => {
                let remaining = expiration - Utc::now();
                remaining <= chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
            }
        }
    }
}

/// Async credential source contract.
pub trait CredentialProvider: Send + Sync + 'static {
    /// Provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Resolve a credential. A returned credential is never already expired.
    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>;
}

/// Explicitly configured static credentials.
pub struct StaticProvider {
    credential: Credential,
}

impl StaticProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

impl CredentialProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        let credential = self.credential.clone();
        Box::pin(async move { Ok(ExpiringCredential::non_expiring(credential)) })
    }
}

/// Tries providers in order; the first success wins, failures fall through.
pub struct ChainProvider {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// The default resolution order: explicit static credentials when
    /// configured, then environment, shared profile file, ECS container
    /// metadata, EC2 instance metadata.
    pub fn default_chain(static_credential: Option<Credential>) -> Self {
        let mut providers: Vec<Arc<dyn CredentialProvider>> = Vec::new();
        if let Some(credential) = static_credential {
            providers.push(Arc::new(StaticProvider::new(credential)));
        }
        providers.push(Arc::new(env::EnvProvider));
        providers.push(Arc::new(profile::ProfileProvider::new()));
        providers.push(Arc::new(container::ContainerProvider::new()));
        providers.push(Arc::new(instance::InstanceProvider::new()));
        Self::new(providers)
    }
}

impl CredentialProvider for ChainProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        Box::pin(async move {
            for provider in &self.providers {
                match provider.get_credential().await {
                    Ok(credential) => return Ok(credential),
                    Err(err) => {
                        tracing::debug!(provider = provider.name(), error = %err, "credential provider failed, trying next");
                    }
                }
            }
            Err(CredentialError::NoProvider)
        })
    }
}

/// The credential source handed to [`crate::client::AwsClient`].
///
/// Wraps a provider (usually the default chain) in the singleflight expiring
/// cache so concurrent requests share one metadata fetch.
#[derive(Clone)]
pub struct CredentialResolver {
    cache: Arc<cache::CachedProvider>,
}

impl CredentialResolver {
    /// Resolver over the default provider chain. Explicit static
    /// credentials, when given, are tried before every other source.
    pub fn default_chain(static_credential: Option<Credential>) -> Self {
        Self::with_provider(Arc::new(ChainProvider::default_chain(static_credential)))
    }

    /// Resolver over explicit static credentials.
    pub fn from_static(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self::with_provider(Arc::new(StaticProvider::new(Credential::new(
            access_key_id,
            secret_access_key,
            session_token,
        ))))
    }

    /// Resolver over a caller-supplied provider.
    pub fn with_provider(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            cache: Arc::new(cache::CachedProvider::new(provider)),
        }
    }

    /// Resolve a credential, consulting the cache first.
    pub async fn get_credential(&self) -> Result<ExpiringCredential, CredentialError> {
        self.cache.get_credential().await
    }
}

/// The JSON credential document returned by both the ECS metadata endpoint
/// and the EC2 instance role endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct MetadataCredentialDocument {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "Token")]
    pub token: Option<String>,
    #[serde(rename = "Expiration")]
    pub expiration: Option<String>,
}

impl MetadataCredentialDocument {
    /// Convert into an [`ExpiringCredential`], rejecting documents whose
    /// expiration is already in the past.
    pub fn into_credential(
        self,
        provider: &'static str,
    ) -> Result<ExpiringCredential, CredentialError> {
        let expiration = match self.expiration.as_deref() {
            None => None,
            Some(raw) => {
                let parsed = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| CredentialError::ProviderFailed {
                        provider,
                        message: format!("bad Expiration {raw:?}: {e}"),
                    })?
                    .with_timezone(&Utc);
                if parsed <= Utc::now() {
                    return Err(CredentialError::ProviderFailed {
                        provider,
                        message: format!("credential already expired at {parsed}"),
                    });
                }
                Some(parsed)
            }
        };

        Ok(ExpiringCredential {
            credential: Credential {
                access_key_id: self.access_key_id,
                secret_access_key: self.secret_access_key,
                session_token: self.token,
            },
            expiration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_expiring_never_expires() {
        let cred = ExpiringCredential::non_expiring(Credential::new("AKID", "secret", None));
        assert!(!cred.is_expiring_within(Duration::from_secs(u32::MAX as u64)));
    }

    #[test]
    fn test_is_expiring_within_window() {
        let cred = ExpiringCredential {
            credential: Credential::new("AKID", "secret", None),
            expiration: Some(Utc::now() + chrono::Duration::seconds(60)),
        };
        assert!(cred.is_expiring_within(Duration::from_secs(180)));
        assert!(!cred.is_expiring_within(Duration::from_secs(10)));
    }

    #[test]
    fn test_metadata_document_rejects_expired() {
        let doc = MetadataCredentialDocument {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            token: None,
            expiration: Some("2001-01-01T00:00:00Z".into()),
        };
        assert!(doc.into_credential("test").is_err());
    }

    #[test]
    fn test_metadata_document_parses_expiration() {
        let doc = MetadataCredentialDocument {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            token: Some("tok".into()),
            expiration: Some("2099-01-01T00:00:00Z".into()),
        };
        let cred = doc.into_credential("test").unwrap();
        assert_eq!(cred.credential.session_token.as_deref(), Some("tok"));
        assert!(cred.expiration.is_some());
    }

    #[tokio::test]
    async fn test_chain_short_circuits_on_first_success() {
        struct Failing;
        impl CredentialProvider for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn get_credential(
                &self,
            ) -> Pin<
                Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>,
            > {
                Box::pin(async {
                    Err(CredentialError::ProviderFailed {
                        provider: "failing",
                        message: "nope".into(),
                    })
                })
            }
        }

        let chain = ChainProvider::new(vec![
            Arc::new(Failing),
            Arc::new(StaticProvider::new(Credential::new("AKID", "secret", None))),
        ]);
        let cred = chain.get_credential().await.unwrap();
        assert_eq!(cred.credential.access_key_id, "AKID");
    }

    #[tokio::test]
    async fn test_chain_exhaustion_is_no_provider() {
        let chain = ChainProvider::new(vec![]);
        assert!(matches!(
            chain.get_credential().await,
            Err(CredentialError::NoProvider)
        ));
    }

    #[tokio::test]
    async fn test_default_chain_tries_static_credentials_first() {
        // With explicit keys configured, the chain resolves them without
        // consulting the environment or any metadata endpoint.
        let chain = ChainProvider::default_chain(Some(Credential::new(
            "AKIDSTATIC",
            "static-secret",
            None,
        )));
        let cred = chain.get_credential().await.unwrap();
        assert_eq!(cred.credential.access_key_id, "AKIDSTATIC");
        assert!(cred.expiration.is_none());

        let resolver = CredentialResolver::default_chain(Some(Credential::new(
            "AKIDSTATIC",
            "static-secret",
            None,
        )));
        let cred = resolver.get_credential().await.unwrap();
        assert_eq!(cred.credential.access_key_id, "AKIDSTATIC");
    }
}
