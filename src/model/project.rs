// ABOUTME: DeployedProject entity, its deployment status, and repository identity.
// ABOUTME: Tracks exactly which DNS records this system created for scoped cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::integration::{BackupIntegration, DnsZone};
use crate::types::{DnsRecordId, Hostname, IntegrationId, ProjectId, ServerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectDeploymentStatus {
    #[default]
    NotDeployed,
    Deploying,
    Deployed,
    Failed,
}

impl fmt::Display for ProjectDeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectDeploymentStatus::NotDeployed => "not deployed",
            ProjectDeploymentStatus::Deploying => "deploying",
            ProjectDeploymentStatus::Deployed => "deployed",
            ProjectDeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A source-control repository, addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub integration: IntegrationId,
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(
        integration: IntegrationId,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            integration,
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The linked repository was renamed upstream; deployment waits for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRename {
    pub old: Repository,
    pub new: Repository,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedProject {
    pub id: ProjectId,
    pub name: String,
    /// Identifier of the local (development) project, when linked.
    #[serde(default)]
    pub local_project: Option<String>,
    #[serde(default)]
    pub server: Option<ServerId>,
    /// Production hostname from the last successful domain configuration.
    #[serde(default)]
    pub domain: Option<Hostname>,
    #[serde(default)]
    pub dns_zone: Option<DnsZone>,
    /// Records created by this system, in creation order. Nothing else is ever deleted.
    #[serde(default)]
    pub created_dns_record_ids: Vec<DnsRecordId>,
    /// DNS-challenge integration used for certificates when no tunnel fronts the server.
    #[serde(default)]
    pub traefik_dns_integration: Option<IntegrationId>,
    #[serde(default)]
    pub backup: Option<BackupIntegration>,
    /// Backup variables last built for `backup`; handed to the secrets step.
    #[serde(default)]
    pub backup_env: BTreeMap<String, String>,
    #[serde(default)]
    pub repository: Option<Repository>,
    /// Last production env file pushed as deployment secrets.
    #[serde(default)]
    pub production_env_backup: Option<String>,
    #[serde(default)]
    pub pending_repository_rename: Option<RepositoryRename>,
    #[serde(default)]
    pub status: ProjectDeploymentStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DeployedProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            name: name.into(),
            local_project: None,
            server: None,
            domain: None,
            dns_zone: None,
            created_dns_record_ids: Vec::new(),
            traefik_dns_integration: None,
            backup: None,
            backup_env: BTreeMap::new(),
            repository: None,
            production_env_backup: None,
            pending_repository_rename: None,
            status: ProjectDeploymentStatus::NotDeployed,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn tracks_record(&self, id: &DnsRecordId) -> bool {
        self.created_dns_record_ids.contains(id)
    }

    /// Append a created record id, ignoring duplicates.
    pub fn track_record(&mut self, id: DnsRecordId) {
        if !self.tracks_record(&id) {
            self.created_dns_record_ids.push(id);
        }
    }

    pub fn untrack_record(&mut self, id: &DnsRecordId) {
        self.created_dns_record_ids.retain(|r| r != id);
    }

    pub fn mark_deploying(&mut self) {
        self.status = ProjectDeploymentStatus::Deploying;
        self.error = None;
        self.touch();
    }

    pub fn mark_deployed(&mut self) {
        self.status = ProjectDeploymentStatus::Deployed;
        self.error = None;
        self.pending_repository_rename = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ProjectDeploymentStatus::Failed;
        self.error = Some(message.into());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
