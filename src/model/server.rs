// ABOUTME: Server and Tunnel entities with their provisioning status.
// ABOUTME: Credentials redact in Debug; Ready requires a known host address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::integration::DnsZone;
use crate::types::{
    Architecture, Hostname, IntegrationId, ServerId, SshKeyId, TunnelId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerStatus {
    /// Created at the provider, no public address yet.
    WaitingForIp,
    Provisioning,
    Ready,
    Failed,
}

impl ServerStatus {
    /// Statuses that `start_if_needed` leaves alone.
    pub fn is_settled(&self) -> bool {
        matches!(self, ServerStatus::Ready | ServerStatus::Failed)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::WaitingForIp => "waiting for IP",
            ServerStatus::Provisioning => "provisioning",
            ServerStatus::Ready => "ready",
            ServerStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The last provisioning step that completed, persisted for visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvisionStep {
    AddressAssigned,
    SshReachable,
    ArchitectureDetected,
    UserPrepared,
    Configured,
    TunnelVerified,
    SshPortClosed,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Credentials {
    KeyPair {
        private_key: String,
        public_key: String,
    },
    Password {
        password: String,
    },
}

impl Credentials {
    pub fn public_key(&self) -> Option<&str> {
        match self {
            Credentials::KeyPair { public_key, .. } => Some(public_key),
            Credentials::Password { .. } => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::KeyPair { public_key, .. } => f
                .debug_struct("KeyPair")
                .field("public_key", public_key)
                .finish_non_exhaustive(),
            Credentials::Password { .. } => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Link to the cloud provider that owns the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLink {
    pub integration: IntegrationId,
    /// Provider-assigned server id.
    pub remote_id: String,
    /// SSH key uploaded to the provider for this server.
    #[serde(default)]
    pub ssh_key: Option<SshKeyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: ServerId,
    #[serde(default)]
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    pub status: ServerStatus,
    #[serde(default)]
    pub provider: Option<ProviderLink>,
    #[serde(default)]
    pub tunnel: Option<TunnelId>,
    /// DNS-challenge provider integrations already wired on this server.
    #[serde(default)]
    pub dns_challenge_providers: BTreeSet<IntegrationId>,
    #[serde(default)]
    pub architecture: Option<Architecture>,
    /// Pre-existing host registered by the operator rather than created here.
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub last_step: Option<ProvisionStep>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Server {
    /// A server created at a cloud provider; it has no address yet.
    pub fn provider_managed(
        name: impl Into<String>,
        provider: ProviderLink,
        credentials: Credentials,
    ) -> Self {
        Self {
            id: ServerId::generate(),
            name: Some(name.into()),
            host: None,
            port: 22,
            user: "root".to_string(),
            credentials: Some(credentials),
            status: ServerStatus::WaitingForIp,
            provider: Some(provider),
            tunnel: None,
            dns_challenge_providers: BTreeSet::new(),
            architecture: None,
            custom: false,
            last_step: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A pre-existing host reachable at `host:port` as `user`.
    pub fn custom(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            id: ServerId::generate(),
            name: None,
            host: Some(host.into()),
            port,
            user: user.into(),
            credentials: Some(credentials),
            status: ServerStatus::Provisioning,
            provider: None,
            tunnel: None,
            dns_challenge_providers: BTreeSet::new(),
            architecture: None,
            custom: true,
            last_step: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.host.as_deref())
            .unwrap_or(self.id.as_str())
    }

    pub fn is_root(&self) -> bool {
        self.user == "root"
    }

    /// Status to restart from when provisioning is retried.
    pub fn restart_status(&self) -> ServerStatus {
        if self.provider.is_some() && self.host.is_none() {
            ServerStatus::WaitingForIp
        } else {
            ServerStatus::Provisioning
        }
    }

    /// Transition to Ready. Refused while the address is unknown.
    pub fn mark_ready(&mut self) -> Result<(), &'static str> {
        if self.host.is_none() {
            return Err("server has no address and cannot be ready");
        }
        self.status = ServerStatus::Ready;
        self.error = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ServerStatus::Failed;
        self.error = Some(message.into());
    }
}

/// A persistent reverse tunnel giving access to a server without open ports.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tunnel {
    pub id: TunnelId,
    pub integration: IntegrationId,
    /// Provider-assigned tunnel id.
    pub remote_id: String,
    pub token: String,
    pub zone: DnsZone,
    /// Hostname that reaches the server's SSH daemon through the tunnel.
    pub ssh_hostname: Hostname,
    #[serde(default)]
    pub ssh_record: Option<crate::types::DnsRecordId>,
    /// Owning server; cleared when the tunnel could not be deleted remotely.
    #[serde(default)]
    pub server: Option<ServerId>,
}

impl Tunnel {
    pub fn vars(&self) -> TunnelVars {
        TunnelVars {
            token: self.token.clone(),
            ssh_hostname: self.ssh_hostname.to_string(),
        }
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("remote_id", &self.remote_id)
            .field("zone", &self.zone.zone_name)
            .field("ssh_hostname", &self.ssh_hostname)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Variables handed to remote configuration when a tunnel is in use.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelVars {
    pub token: String,
    pub ssh_hostname: String,
}

impl fmt::Debug for TunnelVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelVars")
            .field("ssh_hostname", &self.ssh_hostname)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> ProviderLink {
        ProviderLink {
            integration: IntegrationId::new("do"),
            remote_id: "123".to_string(),
            ssh_key: None,
        }
    }

    #[test]
    fn ready_requires_host() {
        let mut server = Server::provider_managed(
            "web",
            link(),
            Credentials::Password {
                password: "pw".to_string(),
            },
        );
        assert!(server.mark_ready().is_err());
        assert_eq!(server.status, ServerStatus::WaitingForIp);

        server.host = Some("203.0.113.9".to_string());
        server.mark_ready().unwrap();
        assert_eq!(server.status, ServerStatus::Ready);
    }

    #[test]
    fn restart_status_waits_for_ip_only_without_address() {
        let mut server = Server::provider_managed(
            "web",
            link(),
            Credentials::Password {
                password: "pw".to_string(),
            },
        );
        assert_eq!(server.restart_status(), ServerStatus::WaitingForIp);
        server.host = Some("203.0.113.9".to_string());
        assert_eq!(server.restart_status(), ServerStatus::Provisioning);
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let creds = Credentials::Password {
            password: "hunter2".to_string(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
