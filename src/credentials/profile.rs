//! Shared credentials file provider.
//!
//! Reads the INI file at `AWS_SHARED_CREDENTIALS_FILE` (default
//! `~/.aws/credentials`), section selected by `AWS_PROFILE` (default
//! `default`). The file is only ever read, never written.

use ini::Ini;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use super::{Credential, CredentialProvider, ExpiringCredential};
use crate::errors::CredentialError;

/// Provider backed by the shared `~/.aws/credentials` INI file.
pub struct ProfileProvider {
    /// Explicit file path; falls back to env / home-dir resolution.
    path: Option<PathBuf>,
    /// Explicit profile name; falls back to `AWS_PROFILE` / `default`.
    profile: Option<String>,
}

impl ProfileProvider {
    pub fn new() -> Self {
        Self {
            path: None,
            profile: None,
        }
    }

    /// Provider pinned to an explicit file and profile, for tests and
    /// non-standard layouts.
    pub fn with_location(path: PathBuf, profile: impl Into<String>) -> Self {
        Self {
            path: Some(path),
            profile: Some(profile.into()),
        }
    }

    fn resolve_path(&self) -> Result<PathBuf, CredentialError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(".aws").join("credentials"))
            .ok_or(CredentialError::ProviderFailed {
                provider: "profile",
                message: "home directory not resolvable".into(),
            })
    }

    fn resolve_profile(&self) -> String {
        if let Some(profile) = &self.profile {
            return profile.clone();
        }
        std::env::var("AWS_PROFILE")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }
}

impl Default for ProfileProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for ProfileProvider {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        Box::pin(async move {
            let path = self.resolve_path()?;
            let profile = self.resolve_profile();

            let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
                CredentialError::ProviderFailed {
                    provider: "profile",
                    message: format!("cannot read {}: {e}", path.display()),
                }
            })?;

            let ini =
                Ini::load_from_str(&contents).map_err(|e| CredentialError::ProviderFailed {
                    provider: "profile",
                    message: format!("cannot parse {}: {e}", path.display()),
                })?;

            let section =
                ini.section(Some(profile.as_str()))
                    .ok_or(CredentialError::ProviderFailed {
                        provider: "profile",
                        message: format!("profile {profile:?} not found"),
                    })?;

            let access_key_id =
                section
                    .get("aws_access_key_id")
                    .ok_or(CredentialError::ProviderFailed {
                        provider: "profile",
                        message: format!("profile {profile:?} has no aws_access_key_id"),
                    })?;
            let secret_access_key =
                section
                    .get("aws_secret_access_key")
                    .ok_or(CredentialError::ProviderFailed {
                        provider: "profile",
                        message: format!("profile {profile:?} has no aws_secret_access_key"),
                    })?;
            let session_token = section.get("aws_session_token").map(str::to_string);

            Ok(ExpiringCredential::non_expiring(Credential::new(
                access_key_id,
                secret_access_key,
                session_token,
            )))
        })
    }
}
