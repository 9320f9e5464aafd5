// ABOUTME: Integration references and resolved secrets for remote providers.
// ABOUTME: Secrets redact themselves in Debug output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::IntegrationId;

/// Resolved credentials for one integration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSecret {
    /// Optional key id (S3-style access key id, account email, ...).
    #[serde(default)]
    pub key_id: Option<String>,
    pub secret: String,
}

impl IntegrationSecret {
    pub fn token(secret: impl Into<String>) -> Self {
        Self {
            key_id: None,
            secret: secret.into(),
        }
    }

    pub fn key_pair(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for IntegrationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationSecret")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A freshly generated SSH key pair in OpenSSH text form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// A DNS zone managed through a DNS provider integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    pub integration: IntegrationId,
    pub zone_id: String,
    /// Apex name, e.g. `example.com`.
    pub zone_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupProvider {
    /// Amazon S3 or any endpoint speaking its API.
    S3,
    /// Cloudflare R2.
    R2,
    /// Backblaze B2 (S3-compatible endpoint).
    B2,
}

/// Object storage target for database backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIntegration {
    pub integration: IntegrationId,
    pub provider: BackupProvider,
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Explicit endpoint; S3 uses the AWS default when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Cloudflare account id, required for R2 endpoints.
    #[serde(default)]
    pub account_id: Option<String>,
}
