// ABOUTME: Single-command remote execution seam used for diagnostics.
// ABOUTME: SshShell opens a short-lived session per command.

use async_trait::async_trait;

use super::client::{CommandOutput, Session, SessionConfig};
use super::error::Result;
use crate::model::Server;

#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, server: &Server, command: &str) -> Result<CommandOutput>;
}

/// `RemoteShell` over russh, authenticating with the server's stored credentials.
#[derive(Debug, Clone, Default)]
pub struct SshShell {
    known_hosts_path: Option<std::path::PathBuf>,
}

impl SshShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_hosts(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            known_hosts_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&self, server: &Server, command: &str) -> Result<CommandOutput> {
        let mut config = SessionConfig::for_server(server)?;
        if let Some(path) = &self.known_hosts_path {
            config = config.known_hosts_path(path.clone());
        }

        let session = Session::connect(config).await?;
        let output = session.exec(command).await;
        if let Err(e) = session.disconnect().await {
            tracing::debug!(server = %server.id, "SSH disconnect failed: {}", e);
        }
        output
    }
}
