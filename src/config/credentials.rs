// ABOUTME: Credential store backed by the `credentials` section of the config file.

use async_trait::async_trait;
use std::collections::HashMap;

use super::SecretValue;
use crate::model::IntegrationSecret;
use crate::providers::{CredentialStore, ProviderError};
use crate::types::IntegrationId;
use serde::Deserialize;

/// One integration's credentials as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CredentialEntry {
    Detailed {
        #[serde(default)]
        key_id: Option<SecretValue>,
        secret: SecretValue,
    },
    Secret(SecretValue),
}

impl CredentialEntry {
    fn resolve(&self) -> crate::error::Result<IntegrationSecret> {
        match self {
            CredentialEntry::Secret(secret) => Ok(IntegrationSecret::token(secret.resolve()?)),
            CredentialEntry::Detailed { key_id, secret } => Ok(IntegrationSecret {
                key_id: key_id.as_ref().map(SecretValue::resolve).transpose()?,
                secret: secret.resolve()?,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialStore {
    entries: HashMap<String, CredentialEntry>,
}

impl ConfigCredentialStore {
    pub fn new(entries: HashMap<String, CredentialEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CredentialStore for ConfigCredentialStore {
    async fn integration_secret(
        &self,
        integration: &IntegrationId,
    ) -> Result<IntegrationSecret, ProviderError> {
        let entry = self
            .entries
            .get(integration.as_str())
            .ok_or_else(|| ProviderError::MissingCredentials(integration.clone()))?;
        entry.resolve().map_err(|e| {
            tracing::warn!(integration = %integration, "credential lookup failed: {}", e);
            ProviderError::MissingCredentials(integration.clone())
        })
    }
}
