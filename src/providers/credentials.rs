// ABOUTME: Credential lookup and SSH key generation seams.
// ABOUTME: Secrets are resolved per integration at the moment they are needed.

use async_trait::async_trait;

use super::ProviderError;
use crate::model::{IntegrationSecret, KeyPair};
use crate::types::IntegrationId;

/// Resolves per-integration secrets.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`ProviderError::MissingCredentials`] when nothing is stored.
    async fn integration_secret(
        &self,
        integration: &IntegrationId,
    ) -> Result<IntegrationSecret, ProviderError>;
}

/// Generates SSH key pairs for newly created servers.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self, label: &str) -> Result<KeyPair, ProviderError>;
}
