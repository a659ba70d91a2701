//! Environment-variable credential provider.

use std::future::Future;
use std::pin::Pin;

use super::{Credential, CredentialProvider, ExpiringCredential};
use crate::errors::CredentialError;

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
/// `AWS_SESSION_TOKEN` from the process environment.
pub struct EnvProvider;

impl CredentialProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    fn get_credential(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<ExpiringCredential, CredentialError>> + Send + '_>>
    {
        Box::pin(async {
            let access_key_id = require_var("AWS_ACCESS_KEY_ID")?;
            let secret_access_key = require_var("AWS_SECRET_ACCESS_KEY")?;
            let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

            Ok(ExpiringCredential::non_expiring(Credential::new(
                access_key_id,
                secret_access_key,
                session_token,
            )))
        })
    }
}

fn require_var(name: &str) -> Result<String, CredentialError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(CredentialError::ProviderFailed {
            provider: "env",
            message: format!("{name} not set"),
        })
}
