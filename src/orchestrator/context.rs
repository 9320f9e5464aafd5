// ABOUTME: Composition root holding every collaborator the orchestrators use.
// ABOUTME: Built once by the host; orchestrators receive it as Arc<AppContext>.

use std::sync::Arc;

use super::error::{OrchestrationError, ProviderSnafu};
use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::model::{DeployedProject, IntegrationSecret, Server};
use crate::providers::{
    BackupStorage, CloudProvider, CredentialStore, DnsProvider, KeyGenerator, ProviderError,
    SecretsProvider, TunnelProvider,
};
use crate::runner::ConfigurationRunner;
use crate::ssh::{PortCheck, RemoteShell, SshShell, TcpPortCheck};
use crate::store::EntityStore;
use crate::types::{IntegrationId, ProjectId, ProjectMarker, ServerId, ServerMarker};
use snafu::ResultExt;

use super::deploy::DeploymentOrchestrator;
use super::registry::TaskRegistry;
use super::server::ServerLifecycle;
use super::teardown::TeardownOrchestrator;

pub struct AppContext {
    pub config: OrchestratorConfig,
    pub store: Arc<dyn EntityStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub keys: Arc<dyn KeyGenerator>,
    pub cloud: Arc<dyn CloudProvider>,
    pub dns: Arc<dyn DnsProvider>,
    pub tunnels: Arc<dyn TunnelProvider>,
    pub secrets: Arc<dyn SecretsProvider>,
    pub backups: Arc<dyn BackupStorage>,
    pub runner: Arc<dyn ConfigurationRunner>,
    pub shell: Arc<dyn RemoteShell>,
    pub port_check: Arc<dyn PortCheck>,
    pub server_tasks: TaskRegistry<ServerMarker>,
    pub project_tasks: TaskRegistry<ProjectMarker>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("server_tasks", &self.server_tasks)
            .field("project_tasks", &self.project_tasks)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn builder(config: OrchestratorConfig) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    pub fn servers(self: &Arc<Self>) -> ServerLifecycle {
        ServerLifecycle::new(Arc::clone(self))
    }

    pub fn deployments(self: &Arc<Self>) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(Arc::clone(self))
    }

    pub fn teardown(self: &Arc<Self>) -> TeardownOrchestrator {
        TeardownOrchestrator::new(Arc::clone(self))
    }

    pub(crate) async fn secret(
        &self,
        integration: &IntegrationId,
    ) -> std::result::Result<IntegrationSecret, ProviderError> {
        self.credentials.integration_secret(integration).await
    }

    pub(crate) async fn secret_for(
        &self,
        integration: &IntegrationId,
        step: &'static str,
    ) -> std::result::Result<IntegrationSecret, OrchestrationError> {
        self.secret(integration).await.context(ProviderSnafu { step })
    }

    pub(crate) async fn load_server(
        &self,
        id: &ServerId,
    ) -> std::result::Result<Server, OrchestrationError> {
        self.store
            .server(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound {
                entity: "server",
                id: id.to_string(),
            })
    }

    pub(crate) async fn load_project(
        &self,
        id: &ProjectId,
    ) -> std::result::Result<DeployedProject, OrchestrationError> {
        self.store
            .project(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound {
                entity: "project",
                id: id.to_string(),
            })
    }
}

/// Assembles an [`AppContext`]. Every remote collaborator is required;
/// the shell and port check default to SSH and TCP, credentials default to the
/// config's `credentials` section.
pub struct AppContextBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn EntityStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    keys: Option<Arc<dyn KeyGenerator>>,
    cloud: Option<Arc<dyn CloudProvider>>,
    dns: Option<Arc<dyn DnsProvider>>,
    tunnels: Option<Arc<dyn TunnelProvider>>,
    secrets: Option<Arc<dyn SecretsProvider>>,
    backups: Option<Arc<dyn BackupStorage>>,
    runner: Option<Arc<dyn ConfigurationRunner>>,
    shell: Option<Arc<dyn RemoteShell>>,
    port_check: Option<Arc<dyn PortCheck>>,
}

impl AppContextBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
            credentials: None,
            keys: None,
            cloud: None,
            dns: None,
            tunnels: None,
            secrets: None,
            backups: None,
            runner: None,
            shell: None,
            port_check: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn cloud(mut self, cloud: Arc<dyn CloudProvider>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn dns(mut self, dns: Arc<dyn DnsProvider>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn tunnels(mut self, tunnels: Arc<dyn TunnelProvider>) -> Self {
        self.tunnels = Some(tunnels);
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn backups(mut self, backups: Arc<dyn BackupStorage>) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ConfigurationRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn RemoteShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn port_check(mut self, port_check: Arc<dyn PortCheck>) -> Self {
        self.port_check = Some(port_check);
        self
    }

    pub fn build(self) -> Result<Arc<AppContext>> {
        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => Arc::new(self.config.credential_store()),
        };

        Ok(Arc::new(AppContext {
            store: required(self.store, "store")?,
            credentials,
            keys: required(self.keys, "key generator")?,
            cloud: required(self.cloud, "cloud provider")?,
            dns: required(self.dns, "DNS provider")?,
            tunnels: required(self.tunnels, "tunnel provider")?,
            secrets: required(self.secrets, "secrets provider")?,
            backups: required(self.backups, "backup storage")?,
            runner: required(self.runner, "configuration runner")?,
            shell: self.shell.unwrap_or_else(|| Arc::new(SshShell::new())),
            port_check: self.port_check.unwrap_or_else(|| Arc::new(TcpPortCheck)),
            config: self.config,
            server_tasks: TaskRegistry::new(),
            project_tasks: TaskRegistry::new(),
        }))
    }
}

fn required<T: ?Sized>(value: Option<Arc<T>>, name: &str) -> Result<Arc<T>> {
    value.ok_or_else(|| Error::InvalidConfig(format!("missing collaborator: {name}")))
}
