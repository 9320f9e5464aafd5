// ABOUTME: Source-control secrets contract for deployment credentials.
// ABOUTME: A renamed repository is reported as its own condition, not a failure.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use super::ProviderError;
use crate::model::{DeployedProject, IntegrationSecret, Repository, RepositoryRename, Server};

/// A named group of environment variables in the production env file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSection {
    pub name: String,
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct SecretsRequest<'a> {
    pub project: &'a DeployedProject,
    pub server: &'a Server,
    pub repository: &'a Repository,
    pub sections: &'a [EnvSection],
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecretsError {
    #[error("repository {} was renamed to {}", .0.old, .0.new)]
    Renamed(RepositoryRename),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Push deployment secrets; returns the production env content that was used.
    async fn configure_deployment_secrets(
        &self,
        request: &SecretsRequest<'_>,
        creds: &IntegrationSecret,
    ) -> Result<String, SecretsError>;

    async fn delete_deployment_secrets(
        &self,
        repository: &Repository,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;
}
