// ABOUTME: Ordered destruction of projects and servers with a per-phase report.
// ABOUTME: Remote cleanup is best-effort; authorization failures stop before local deletion.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::context::AppContext;
use super::dns::{RecordDeletion, delete_tracked_records};
use super::error::OrchestrationError;
use crate::model::{DeployedProject, IntegrationSecret, Server, Tunnel};
use crate::providers::{ProviderError, ProviderErrorKind};
use crate::types::{IntegrationId, ProjectId, ServerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPhase {
    Secrets,
    DnsRecords,
    TunnelRoute,
    Tunnel,
    ProviderServer,
    SshKey,
    LocalEntity,
}

impl fmt::Display for TeardownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeardownPhase::Secrets => "deployment secrets",
            TeardownPhase::DnsRecords => "DNS records",
            TeardownPhase::TunnelRoute => "tunnel route",
            TeardownPhase::Tunnel => "tunnel",
            TeardownPhase::ProviderServer => "provider server",
            TeardownPhase::SshKey => "SSH key",
            TeardownPhase::LocalEntity => "local record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownFailureKind {
    Network,
    Authorization,
    Provider,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub kind: TeardownFailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Succeeded,
    /// The remote resource was already gone.
    SkippedAlreadyAbsent,
    /// Nothing to do for this phase.
    Skipped(String),
    Failed(TeardownFailure),
}

impl PhaseOutcome {
    fn from_provider_error(err: &ProviderError) -> Self {
        let kind = match err.kind() {
            ProviderErrorKind::NotFound => return PhaseOutcome::SkippedAlreadyAbsent,
            ProviderErrorKind::Network => TeardownFailureKind::Network,
            ProviderErrorKind::Authorization => TeardownFailureKind::Authorization,
            ProviderErrorKind::Provider => TeardownFailureKind::Provider,
        };
        PhaseOutcome::Failed(TeardownFailure {
            kind,
            message: err.to_string(),
        })
    }

    fn skipped(reason: impl Into<String>) -> Self {
        PhaseOutcome::Skipped(reason.into())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    /// What the phase acted on, e.g. `project shop` or `record abc123`.
    pub subject: String,
    pub phase: TeardownPhase,
    pub outcome: PhaseOutcome,
}

/// Every phase a teardown went through, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub phases: Vec<PhaseRecord>,
}

impl TeardownReport {
    /// First recorded outcome for `phase`.
    pub fn outcome(&self, phase: TeardownPhase) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|record| record.phase == phase)
            .map(|record| &record.outcome)
    }

    pub fn outcomes(&self, phase: TeardownPhase) -> impl Iterator<Item = &PhaseOutcome> {
        self.phases
            .iter()
            .filter(move |record| record.phase == phase)
            .map(|record| &record.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.phases.iter().filter(|record| record.outcome.is_failed())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    fn push(&mut self, subject: &str, phase: TeardownPhase, outcome: PhaseOutcome) {
        match &outcome {
            PhaseOutcome::Failed(failure) => {
                warn!(subject, %phase, kind = ?failure.kind, "teardown phase failed: {}", failure.message)
            }
            other => info!(subject, %phase, outcome = ?other, "teardown phase finished"),
        }
        self.phases.push(PhaseRecord {
            subject: subject.to_string(),
            phase,
            outcome,
        });
    }

    /// Record a remote call's result. Authorization failures abort the teardown.
    fn settle(
        &mut self,
        subject: &str,
        phase: TeardownPhase,
        result: Result<(), ProviderError>,
    ) -> Result<PhaseOutcome, OrchestrationError> {
        let outcome = match &result {
            Ok(()) => PhaseOutcome::Succeeded,
            Err(e) => PhaseOutcome::from_provider_error(e),
        };
        self.push(subject, phase, outcome.clone());
        match result {
            Err(source) if source.is_authorization() => {
                Err(OrchestrationError::TeardownAborted { phase, source })
            }
            _ => Ok(outcome),
        }
    }
}

/// How much of a project to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectTeardownMode {
    /// Remote resources first, then the local record.
    Full,
    /// Drop only the local record; remote resources are left as they are.
    LocalOnly,
}

#[derive(Clone)]
pub struct TeardownOrchestrator {
    ctx: Arc<AppContext>,
}

impl TeardownOrchestrator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Cancel the project's deployment and remove it.
    pub async fn delete_project(
        &self,
        id: &ProjectId,
        mode: ProjectTeardownMode,
    ) -> Result<TeardownReport, OrchestrationError> {
        if self.ctx.project_tasks.cancel_and_wait(id).await {
            info!(project_id = %id, "cancelled running deployment before teardown");
        }
        let project = self.ctx.load_project(id).await?;

        let mut report = TeardownReport::default();
        self.teardown_project(&project, mode, &mut report).await?;
        Ok(report)
    }

    /// Cancel provisioning and remove the server with everything on it.
    ///
    /// Order: projects, tunnel, provider server, SSH key, local record.
    pub async fn delete_server(&self, id: &ServerId) -> Result<TeardownReport, OrchestrationError> {
        if self.ctx.server_tasks.cancel_and_wait(id).await {
            info!(server_id = %id, "cancelled running provisioning before teardown");
        }
        let server = self.ctx.load_server(id).await?;
        let subject = format!("server {}", server.display_name());
        let mut report = TeardownReport::default();

        for project in self.ctx.store.projects_on_server(id).await? {
            self.ctx.project_tasks.cancel_and_wait(&project.id).await;
            self.teardown_project(&project, ProjectTeardownMode::Full, &mut report)
                .await?;
        }

        match &server.tunnel {
            Some(tunnel_id) => match self.ctx.store.tunnel(tunnel_id).await? {
                Some(tunnel) => self.teardown_tunnel(&tunnel, &mut report).await?,
                None => report.push(
                    &subject,
                    TeardownPhase::Tunnel,
                    PhaseOutcome::skipped("tunnel record missing"),
                ),
            },
            None => report.push(&subject, TeardownPhase::Tunnel, PhaseOutcome::skipped("no tunnel")),
        }

        self.teardown_provider_server(&server, &subject, &mut report)
            .await?;

        self.ctx.store.delete_server(id).await?;
        report.push(&subject, TeardownPhase::LocalEntity, PhaseOutcome::Succeeded);
        Ok(report)
    }

    async fn teardown_project(
        &self,
        project: &DeployedProject,
        mode: ProjectTeardownMode,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let subject = format!("project {}", project.name);

        if mode == ProjectTeardownMode::Full {
            self.delete_secrets(project, &subject, report).await?;
            self.delete_project_records(project, &subject, report)
                .await?;
            self.remove_project_route(project, &subject, report).await?;
        } else {
            for phase in [
                TeardownPhase::Secrets,
                TeardownPhase::DnsRecords,
                TeardownPhase::TunnelRoute,
            ] {
                report.push(&subject, phase, PhaseOutcome::skipped("local-only deletion"));
            }
        }

        self.ctx.store.delete_project(&project.id).await?;
        report.push(&subject, TeardownPhase::LocalEntity, PhaseOutcome::Succeeded);
        Ok(())
    }

    async fn delete_secrets(
        &self,
        project: &DeployedProject,
        subject: &str,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let Some(repository) = &project.repository else {
            report.push(subject, TeardownPhase::Secrets, PhaseOutcome::skipped("no repository"));
            return Ok(());
        };
        let Some(creds) = self
            .credentials(&repository.integration, subject, TeardownPhase::Secrets, report)
            .await?
        else {
            return Ok(());
        };
        let result = self
            .ctx
            .secrets
            .delete_deployment_secrets(repository, &creds)
            .await;
        report.settle(subject, TeardownPhase::Secrets, result)?;
        Ok(())
    }

    async fn delete_project_records(
        &self,
        project: &DeployedProject,
        subject: &str,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let Some(zone) = &project.dns_zone else {
            report.push(subject, TeardownPhase::DnsRecords, PhaseOutcome::skipped("no DNS zone"));
            return Ok(());
        };
        if project.created_dns_record_ids.is_empty() {
            report.push(
                subject,
                TeardownPhase::DnsRecords,
                PhaseOutcome::skipped("no tracked records"),
            );
            return Ok(());
        }
        self.delete_records(zone, &project.created_dns_record_ids, subject, report)
            .await
    }

    async fn delete_records(
        &self,
        zone: &crate::model::DnsZone,
        tracked: &[crate::types::DnsRecordId],
        subject: &str,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let Some(creds) = self
            .credentials(&zone.integration, subject, TeardownPhase::DnsRecords, report)
            .await?
        else {
            return Ok(());
        };

        let results =
            match delete_tracked_records(self.ctx.dns.as_ref(), zone, tracked, &creds).await {
                Ok(results) => results,
                Err(e) => {
                    report.settle(subject, TeardownPhase::DnsRecords, Err(e))?;
                    return Ok(());
                }
            };

        for (id, deletion) in results {
            let record_subject = format!("record {id}");
            match deletion {
                RecordDeletion::Deleted => {
                    report.push(&record_subject, TeardownPhase::DnsRecords, PhaseOutcome::Succeeded)
                }
                RecordDeletion::AlreadyAbsent => report.push(
                    &record_subject,
                    TeardownPhase::DnsRecords,
                    PhaseOutcome::SkippedAlreadyAbsent,
                ),
                RecordDeletion::Protected(record_type) => report.push(
                    &record_subject,
                    TeardownPhase::DnsRecords,
                    PhaseOutcome::skipped(format!("{record_type} records are never deleted")),
                ),
                RecordDeletion::Failed(e) => {
                    report.settle(&record_subject, TeardownPhase::DnsRecords, Err(e))?;
                }
            }
        }
        Ok(())
    }

    async fn remove_project_route(
        &self,
        project: &DeployedProject,
        subject: &str,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let Some(hostname) = &project.domain else {
            report.push(subject, TeardownPhase::TunnelRoute, PhaseOutcome::skipped("no domain"));
            return Ok(());
        };
        let tunnel = match &project.server {
            Some(server_id) => match self.ctx.store.server(server_id).await? {
                Some(Server {
                    tunnel: Some(tunnel_id),
                    ..
                }) => self.ctx.store.tunnel(&tunnel_id).await?,
                _ => None,
            },
            None => None,
        };
        let Some(tunnel) = tunnel else {
            report.push(subject, TeardownPhase::TunnelRoute, PhaseOutcome::skipped("no tunnel"));
            return Ok(());
        };

        let Some(creds) = self
            .credentials(&tunnel.integration, subject, TeardownPhase::TunnelRoute, report)
            .await?
        else {
            return Ok(());
        };
        let result = self
            .ctx
            .tunnels
            .remove_http_route(&tunnel.remote_id, hostname.as_str(), &creds)
            .await;
        report.settle(subject, TeardownPhase::TunnelRoute, result)?;
        Ok(())
    }

    /// SSH route, SSH hostname record, then the tunnel itself. A tunnel that
    /// could not be deleted is kept locally, detached from its server.
    async fn teardown_tunnel(
        &self,
        tunnel: &Tunnel,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let subject = format!("tunnel {}", tunnel.ssh_hostname);

        let deleted = match self
            .credentials(&tunnel.integration, &subject, TeardownPhase::Tunnel, report)
            .await?
        {
            Some(creds) => {
                let route = self
                    .ctx
                    .tunnels
                    .remove_http_route(&tunnel.remote_id, tunnel.ssh_hostname.as_str(), &creds)
                    .await;
                report.settle(&subject, TeardownPhase::TunnelRoute, route)?;

                if let Some(record) = &tunnel.ssh_record {
                    self.delete_records(&tunnel.zone, std::slice::from_ref(record), &subject, report)
                        .await?;
                }

                let result = self
                    .ctx
                    .tunnels
                    .delete_tunnel(&tunnel.remote_id, &creds)
                    .await;
                !report
                    .settle(&subject, TeardownPhase::Tunnel, result)?
                    .is_failed()
            }
            None => false,
        };

        if deleted {
            self.ctx.store.delete_tunnel(&tunnel.id).await?;
        } else {
            let mut detached = tunnel.clone();
            detached.server = None;
            self.ctx.store.save_tunnel(&detached).await?;
            warn!(tunnel_id = %tunnel.id, remote_id = %tunnel.remote_id, "tunnel kept locally, detached from its server");
        }
        Ok(())
    }

    async fn teardown_provider_server(
        &self,
        server: &Server,
        subject: &str,
        report: &mut TeardownReport,
    ) -> Result<(), OrchestrationError> {
        let Some(link) = &server.provider else {
            report.push(
                subject,
                TeardownPhase::ProviderServer,
                PhaseOutcome::skipped("custom server"),
            );
            return Ok(());
        };

        let Some(creds) = self
            .credentials(&link.integration, subject, TeardownPhase::ProviderServer, report)
            .await?
        else {
            return Ok(());
        };

        let result = self.ctx.cloud.delete_server(&link.remote_id, &creds).await;
        report.settle(subject, TeardownPhase::ProviderServer, result)?;

        match &link.ssh_key {
            Some(key) => {
                let result = self.ctx.cloud.delete_ssh_key(key, &creds).await;
                report.settle(subject, TeardownPhase::SshKey, result)?;
            }
            None => report.push(subject, TeardownPhase::SshKey, PhaseOutcome::skipped("no SSH key")),
        }
        Ok(())
    }

    /// Resolve credentials for a phase. A missing secret aborts; other
    /// failures are recorded and the phase is skipped.
    async fn credentials(
        &self,
        integration: &IntegrationId,
        subject: &str,
        phase: TeardownPhase,
        report: &mut TeardownReport,
    ) -> Result<Option<IntegrationSecret>, OrchestrationError> {
        match self.ctx.secret(integration).await {
            Ok(creds) => Ok(Some(creds)),
            Err(e) => {
                report.settle(subject, phase, Err(e))?;
                Ok(None)
            }
        }
    }
}
