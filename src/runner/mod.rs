// ABOUTME: Contract for idempotent remote configuration procedures run over SSH.
// ABOUTME: Every procedure must be safe to re-run; resumption repeats them blindly.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{IntegrationSecret, Server, TunnelVars};
use crate::types::IntegrationId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("could not connect to {host}: {message}")]
    Connection { host: String, message: String },

    #[error("{procedure} failed: {message}")]
    Failed { procedure: String, message: String },
}

impl RunnerError {
    pub fn failed(procedure: impl Into<String>, message: impl Into<String>) -> Self {
        RunnerError::Failed {
            procedure: procedure.into(),
            message: message.into(),
        }
    }
}

/// One DNS provider wired into the certificate resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChallengeProvider {
    pub integration: IntegrationId,
    pub secret: IntegrationSecret,
}

/// The complete set of DNS-challenge providers a server must know about.
///
/// Always the full set sorted by integration id, never just the newest
/// addition: the remote procedure rewrites the resolver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsChallengeVars {
    pub providers: Vec<DnsChallengeProvider>,
}

impl DnsChallengeVars {
    /// Sorted by integration id; a repeated integration keeps its first secret.
    pub fn new(providers: impl IntoIterator<Item = DnsChallengeProvider>) -> Self {
        let mut providers: Vec<_> = providers.into_iter().collect();
        providers.sort_by(|a, b| a.integration.cmp(&b.integration));
        providers.dedup_by(|later, earlier| later.integration == earlier.integration);
        Self { providers }
    }

    pub fn integrations(&self) -> Vec<&IntegrationId> {
        self.providers.iter().map(|p| &p.integration).collect()
    }
}

#[async_trait]
pub trait ConfigurationRunner: Send + Sync {
    async fn test_connection(&self, server: &Server) -> Result<(), RunnerError>;

    /// Create `target_user` with sudo and `public_key` authorized.
    async fn prepare_user(
        &self,
        server: &Server,
        target_user: &str,
        public_key: &str,
    ) -> Result<(), RunnerError>;

    /// Harden the server and install the runtime stack.
    async fn provision_server(
        &self,
        server: &Server,
        user: &str,
        public_key: Option<&str>,
        tunnel: Option<&TunnelVars>,
    ) -> Result<(), RunnerError>;

    async fn configure_dns_challenge_provider(
        &self,
        server: &Server,
        vars: &DnsChallengeVars,
    ) -> Result<(), RunnerError>;

    /// Close the public SSH port; access continues through the tunnel.
    async fn close_direct_port(
        &self,
        server: &Server,
        tunnel: &TunnelVars,
    ) -> Result<(), RunnerError>;

    /// Reach the server through its tunnel with a real connection.
    async fn test_tunnel(&self, server: &Server) -> Result<(), RunnerError>;
}
