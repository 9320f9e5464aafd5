// ABOUTME: Cloud server provider contract.
// ABOUTME: Key upload, image lookup, server create/poll/delete.

use async_trait::async_trait;
use std::time::Duration;

use super::ProviderError;
use crate::model::IntegrationSecret;
use crate::types::SshKeyId;

/// Interval between status polls in the default `wait_for_server_active`.
pub const SERVER_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderServerStatus {
    New,
    Active,
    Off,
    Archived,
}

/// A server as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderServer {
    pub remote_id: String,
    pub status: ProviderServerStatus,
    pub public_ipv4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveServer {
    pub public_ipv4: String,
}

#[derive(Debug, Clone)]
pub struct CreateServerRequest<'a> {
    pub name: &'a str,
    pub region: &'a str,
    pub size: &'a str,
    pub image: &'a str,
    pub ssh_key: &'a SshKeyId,
}

/// Progress callback for `wait_for_server_active`, called with elapsed time.
pub type WaitProgress<'a> = &'a (dyn Fn(Duration) + Send + Sync);

#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn upload_ssh_key(
        &self,
        name: &str,
        public_key: &str,
        creds: &IntegrationSecret,
    ) -> Result<SshKeyId, ProviderError>;

    async fn delete_ssh_key(
        &self,
        key: &SshKeyId,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;

    async fn latest_base_image(&self, creds: &IntegrationSecret) -> Result<String, ProviderError>;

    async fn create_server(
        &self,
        request: &CreateServerRequest<'_>,
        creds: &IntegrationSecret,
    ) -> Result<ProviderServer, ProviderError>;

    async fn server(
        &self,
        remote_id: &str,
        creds: &IntegrationSecret,
    ) -> Result<ProviderServer, ProviderError>;

    async fn delete_server(
        &self,
        remote_id: &str,
        creds: &IntegrationSecret,
    ) -> Result<(), ProviderError>;

    /// Poll until the server is active with a public IPv4 address.
    ///
    /// The default implementation polls [`CloudProvider::server`] every
    /// [`SERVER_POLL_INTERVAL`] and gives up after `max_wait`.
    async fn wait_for_server_active(
        &self,
        remote_id: &str,
        creds: &IntegrationSecret,
        max_wait: Duration,
        on_progress: WaitProgress<'_>,
    ) -> Result<ActiveServer, ProviderError> {
        let started = tokio::time::Instant::now();
        loop {
            let server = self.server(remote_id, creds).await?;
            if server.status == ProviderServerStatus::Active
                && let Some(ip) = server.public_ipv4
            {
                return Ok(ActiveServer { public_ipv4: ip });
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                return Err(ProviderError::network(
                    "cloud",
                    format!("server {remote_id} not active after {}s", max_wait.as_secs()),
                ));
            }
            on_progress(elapsed);
            tokio::time::sleep(SERVER_POLL_INTERVAL).await;
        }
    }
}
