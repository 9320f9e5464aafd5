// ABOUTME: SSH session management using russh.
// ABOUTME: Authenticates with a server's stored key or password and runs commands.

use super::error::{Error, Result};
use crate::model::{Credentials, Server};
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How the session authenticates.
#[derive(Clone)]
pub enum SessionAuth {
    /// OpenSSH private key text.
    PrivateKey(String),
    Password(String),
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAuth::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            SessionAuth::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: SessionAuth,
    /// Accept and remember unknown host keys. Fresh servers are always unknown.
    pub trust_on_first_use: bool,
    /// known_hosts file; None uses ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl SessionConfig {
    /// Build a config for `server` using its current user and credentials.
    pub fn for_server(server: &Server) -> Result<Self> {
        let host = server.host.clone().ok_or(Error::NoAddress)?;
        let auth = match server.credentials.as_ref().ok_or(Error::NoCredentials)? {
            Credentials::KeyPair { private_key, .. } => SessionAuth::PrivateKey(private_key.clone()),
            Credentials::Password { password } => SessionAuth::Password(password.clone()),
        };
        Ok(Self {
            host,
            port: server.port,
            user: server.user.clone(),
            auth,
            trust_on_first_use: true,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(60),
        })
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) if self.trust_on_first_use => {
                tracing::debug!(host = %self.host, port = self.port, "trusting new host key");
                let learned = match &self.known_hosts_path {
                    Some(path) => {
                        learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                    }
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learned {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!(host = %self.host, "host key changed; refusing connection");
                Ok(false)
            }
            Err(_) => Ok(self.trust_on_first_use),
        }
    }
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<SshHandler>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Session {
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        let connect = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(Error::Connection(e.to_string())),
            Err(_) => {
                return Err(Error::Connection(format!(
                    "timed out connecting to {}:{}",
                    config.host, config.port
                )));
            }
        };

        if !Self::authenticate(&mut handle, &config).await? {
            return Err(Error::AuthenticationFailed {
                user: config.user.clone(),
                host: config.host.clone(),
            });
        }

        Ok(Self { config, handle })
    }

    async fn authenticate(handle: &mut Handle<SshHandler>, config: &SessionConfig) -> Result<bool> {
        match &config.auth {
            SessionAuth::PrivateKey(pem) => {
                let key =
                    decode_secret_key(pem, None).map_err(|e| Error::KeyDecode(e.to_string()))?;
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();
                let result = handle
                    .authenticate_publickey(
                        &config.user,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(Error::Protocol)?;
                Ok(result.success())
            }
            SessionAuth::Password(password) => {
                let result = handle
                    .authenticate_password(&config.user, password)
                    .await
                    .map_err(Error::Protocol)?;
                Ok(result.success())
            }
        }
    }

    /// Execute a command on the remote host.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        match tokio::time::timeout(self.config.command_timeout, self.exec_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(self.config.command_timeout)),
        }
    }

    async fn exec_inner(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_address() {
        let server = Server::provider_managed(
            "web",
            crate::model::ProviderLink {
                integration: crate::types::IntegrationId::new("do"),
                remote_id: "1".to_string(),
                ssh_key: None,
            },
            Credentials::Password {
                password: "pw".to_string(),
            },
        );
        assert!(matches!(
            SessionConfig::for_server(&server),
            Err(Error::NoAddress)
        ));
    }

    #[test]
    fn config_uses_server_user_and_port() {
        let server = Server::custom(
            "198.51.100.7",
            2222,
            "deploy",
            Credentials::Password {
                password: "pw".to_string(),
            },
        );
        let config = SessionConfig::for_server(&server).unwrap();
        assert_eq!(config.host, "198.51.100.7");
        assert_eq!(config.port, 2222);
        assert_eq!(config.user, "deploy");
        assert!(matches!(config.auth, SessionAuth::Password(_)));
        assert!(!format!("{:?}", config.auth).contains("pw"));
    }

    #[test]
    fn success_means_zero_exit() {
        let out = CommandOutput {
            exit_code: 0,
            stdout: "x86_64\n".to_string(),
            stderr: String::new(),
        };
        assert!(out.success());
    }
}
