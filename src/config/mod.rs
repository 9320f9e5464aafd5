// ABOUTME: Orchestrator configuration loaded from harbormaster.yml.
// ABOUTME: Polling bounds, timeouts, deployment defaults, and integration credentials.

mod credentials;
mod secret_value;

pub use credentials::{ConfigCredentialStore, CredentialEntry};
pub use secret_value::SecretValue;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "harbormaster.yml";
pub const CONFIG_FILENAME_ALT: &str = "harbormaster.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".harbormaster/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Integration id -> secret.
    #[serde(default)]
    pub credentials: HashMap<String, CredentialEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Upper bound for a provider server to become active with an address.
    #[serde(default = "default_server_active_timeout", with = "humantime_serde")]
    pub server_active_timeout: Duration,

    #[serde(default = "default_ssh_attempts")]
    pub ssh_attempts: u32,

    #[serde(default = "default_ssh_interval", with = "humantime_serde")]
    pub ssh_interval: Duration,

    #[serde(default = "default_ssh_connect_timeout", with = "humantime_serde")]
    pub ssh_connect_timeout: Duration,

    /// Pause after configuration before the tunnel is verified.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    #[serde(default = "default_tunnel_attempts")]
    pub tunnel_attempts: u32,

    #[serde(default = "default_tunnel_interval", with = "humantime_serde")]
    pub tunnel_interval: Duration,

    /// Non-root user created on provider servers.
    #[serde(default = "default_target_user")]
    pub target_user: String,

    #[serde(default = "default_region")]
    pub default_region: String,

    #[serde(default = "default_size")]
    pub default_size: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            server_active_timeout: default_server_active_timeout(),
            ssh_attempts: default_ssh_attempts(),
            ssh_interval: default_ssh_interval(),
            ssh_connect_timeout: default_ssh_connect_timeout(),
            settle_delay: default_settle_delay(),
            tunnel_attempts: default_tunnel_attempts(),
            tunnel_interval: default_tunnel_interval(),
            target_user: default_target_user(),
            default_region: default_region(),
            default_size: default_size(),
        }
    }
}

fn default_server_active_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_ssh_attempts() -> u32 {
    30
}

fn default_ssh_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_ssh_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(15)
}

fn default_tunnel_attempts() -> u32 {
    6
}

fn default_tunnel_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_target_user() -> String {
    "deploy".to_string()
}

fn default_region() -> String {
    "fra1".to_string()
}

fn default_size() -> String {
    "s-1vcpu-2gb".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    /// Service on the server that tunnel ingress routes point at.
    #[serde(default = "default_local_origin")]
    pub local_origin: String,

    #[serde(default = "default_propagation_attempts")]
    pub propagation_attempts: u32,

    #[serde(default = "default_propagation_interval", with = "humantime_serde")]
    pub propagation_interval: Duration,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            local_origin: default_local_origin(),
            propagation_attempts: default_propagation_attempts(),
            propagation_interval: default_propagation_interval(),
        }
    }
}

fn default_local_origin() -> String {
    "https://localhost:443".to_string()
}

fn default_propagation_attempts() -> u32 {
    10
}

fn default_propagation_interval() -> Duration {
    Duration::from_secs(3)
}

impl OrchestratorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        if self.provisioning.ssh_attempts == 0 {
            return Err(Error::InvalidConfig(
                "provisioning.ssh_attempts must be at least 1".to_string(),
            ));
        }
        if self.provisioning.tunnel_attempts == 0 {
            return Err(Error::InvalidConfig(
                "provisioning.tunnel_attempts must be at least 1".to_string(),
            ));
        }
        if self.provisioning.target_user.trim().is_empty()
            || self.provisioning.target_user == "root"
        {
            return Err(Error::InvalidConfig(
                "provisioning.target_user must be a non-root user".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credential_store(&self) -> ConfigCredentialStore {
        ConfigCredentialStore::new(self.credentials.clone())
    }
}
