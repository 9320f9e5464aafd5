// ABOUTME: Deployment configuration for a project on a server.
// ABOUTME: Idempotent steps, persisted as they go, resumable after a restart.

use futures::future::join_all;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backup::prepare_backup_env;
use super::cancel::{cancellable, ensure_active, sleep};
use super::context::AppContext;
use super::dns::delete_tracked_records;
use super::error::{AlreadyRunningSnafu, OrchestrationError, ProviderSnafu, RunnerSnafu};
use super::outcome::{Failure, WorkflowOutcome};
use crate::model::{
    BackupIntegration, DeployedProject, DnsZone, IntegrationSecret, ProjectDeploymentStatus,
    Repository, RepositoryRename, Server, Tunnel,
};
use crate::providers::{
    DnsRecord, EnvSection, IngressRule, NewDnsRecord, RecordType, SecretsError, SecretsRequest,
};
use crate::runner::{DnsChallengeProvider, DnsChallengeVars};
use crate::types::{Hostname, HostnameError, IntegrationId, ProjectId, ServerId};

/// The production hostname for a project and the zone it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainTarget {
    pub zone: DnsZone,
    pub hostname: Hostname,
}

impl DomainTarget {
    /// `subdomain` under the zone apex; empty or `@` means the apex itself.
    pub fn new(zone: DnsZone, subdomain: &str) -> Result<Self, HostnameError> {
        let hostname = Hostname::join(subdomain, &zone.zone_name)?;
        Ok(Self { zone, hostname })
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub project: ProjectId,
    pub server: ServerId,
    pub domain: Option<DomainTarget>,
    /// `None` clears any backup configuration.
    pub backup: Option<BackupIntegration>,
}

/// Where the project was linked before this run.
struct PreviousPlacement {
    same_server: bool,
    tunnel: Option<Tunnel>,
}

enum Flow {
    Done,
    Paused(RepositoryRename),
}

#[derive(Clone)]
pub struct DeploymentOrchestrator {
    ctx: Arc<AppContext>,
}

impl DeploymentOrchestrator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Run the deployment steps for `request.project`.
    ///
    /// Returns `Err` only when the run could not start: another unit owns
    /// the project, or the project is unknown. Everything after that is
    /// reported as a [`WorkflowOutcome`] and persisted on the project.
    pub async fn configure(
        &self,
        request: DeployRequest,
    ) -> Result<WorkflowOutcome, OrchestrationError> {
        let ticket = self
            .ctx
            .project_tasks
            .try_register(&request.project)
            .ok_or_else(|| {
                AlreadyRunningSnafu {
                    id: request.project.to_string(),
                }
                .build()
            })?;

        let mut project = self.ctx.load_project(&request.project).await?;
        project.mark_deploying();
        project.pending_repository_rename = None;
        self.ctx.store.save_project(&project).await?;
        info!(project = %project.name, server_id = %request.server, "deployment started");

        let result = self.run_steps(&mut project, &request, ticket.token()).await;
        let outcome = self.finish(&mut project, result).await;
        ticket.complete();
        Ok(outcome)
    }

    /// Resume a deployment paused on a repository rename, using `repository`
    /// as the confirmed target.
    pub async fn continue_with_resolved_repo(
        &self,
        project_id: &ProjectId,
        repository: Repository,
    ) -> Result<WorkflowOutcome, OrchestrationError> {
        let ticket = self
            .ctx
            .project_tasks
            .try_register(project_id)
            .ok_or_else(|| {
                AlreadyRunningSnafu {
                    id: project_id.to_string(),
                }
                .build()
            })?;

        let mut project = self.ctx.load_project(project_id).await?;
        let Some(pending) = project.pending_repository_rename.take() else {
            return Err(OrchestrationError::precondition(format!(
                "project {} is not waiting on a repository rename",
                project.name
            )));
        };
        info!(project = %project.name, from = %pending.old, to = %repository, "repository rename resolved");
        project.repository = Some(repository.clone());
        project.touch();
        self.ctx.store.save_project(&project).await?;

        let result = async {
            let server_id = project
                .server
                .clone()
                .ok_or_else(|| OrchestrationError::precondition("project has no linked server"))?;
            let server = self.ctx.load_server(&server_id).await?;
            match self
                .push_secrets(&mut project, &server, &repository, ticket.token())
                .await?
            {
                Some(rename) => Ok(Flow::Paused(rename)),
                None => Ok(Flow::Done),
            }
        }
        .await;

        let outcome = self.finish(&mut project, result).await;
        ticket.complete();
        Ok(outcome)
    }

    /// Re-run every project left in `Deploying` without a live unit.
    ///
    /// Projects paused on a repository rename stay paused and are reported
    /// as such without running any step.
    pub async fn resume_incomplete_deployments(
        &self,
    ) -> Result<Vec<(ProjectId, WorkflowOutcome)>, OrchestrationError> {
        let candidates = self
            .ctx
            .store
            .projects_with_status(ProjectDeploymentStatus::Deploying)
            .await?;

        let runs = candidates
            .into_iter()
            .filter(|project| !self.ctx.project_tasks.is_running(&project.id))
            .map(|project| {
                let this = self.clone();
                async move {
                    let id = project.id.clone();
                    this.resume_one(project).await.map(|outcome| (id, outcome))
                }
            });

        let results = join_all(runs).await;
        Ok(results.into_iter().flatten().collect())
    }

    /// Remove the project's domain: tracked records and tunnel route.
    pub async fn detach_domain(&self, project_id: &ProjectId) -> Result<(), OrchestrationError> {
        let ticket = self
            .ctx
            .project_tasks
            .try_register(project_id)
            .ok_or_else(|| {
                AlreadyRunningSnafu {
                    id: project_id.to_string(),
                }
                .build()
            })?;

        let mut project = self.ctx.load_project(project_id).await?;
        let tunnel = match &project.server {
            Some(server_id) => match self.ctx.store.server(server_id).await? {
                Some(server) => self.tunnel_of(&server).await?,
                None => None,
            },
            None => None,
        };
        self.cleanup_domain(&mut project, tunnel.as_ref(), ticket.token())
            .await?;
        ticket.complete();
        Ok(())
    }

    /// Clear a failed project's error so the operator can try again.
    pub async fn clear_error(&self, project_id: &ProjectId) -> Result<(), OrchestrationError> {
        let mut project = self.ctx.load_project(project_id).await?;
        if project.error.take().is_some() {
            if project.status == ProjectDeploymentStatus::Failed {
                project.status = ProjectDeploymentStatus::NotDeployed;
            }
            project.touch();
            self.ctx.store.save_project(&project).await?;
        }
        Ok(())
    }

    pub fn cancel(&self, project_id: &ProjectId) -> bool {
        self.ctx.project_tasks.cancel(project_id)
    }

    pub fn is_running(&self, project_id: &ProjectId) -> bool {
        self.ctx.project_tasks.is_running(project_id)
    }

    async fn resume_one(&self, project: DeployedProject) -> Option<WorkflowOutcome> {
        if let Some(rename) = project.pending_repository_rename.clone() {
            debug!(project = %project.name, "still waiting on repository rename");
            return Some(WorkflowOutcome::PausedForConflict(rename));
        }

        let Some(server) = project.server.clone() else {
            let err = OrchestrationError::precondition("project has no linked server");
            let mut project = project;
            project.mark_failed(err.to_string());
            if let Err(store_err) = self.ctx.store.save_project(&project).await {
                error!(project = %project.name, "could not persist failure: {}", store_err);
            }
            return Some(WorkflowOutcome::Failed(Failure::from(&err)));
        };

        let domain = match (project.domain.clone(), project.dns_zone.clone()) {
            (Some(hostname), Some(zone)) => Some(DomainTarget { zone, hostname }),
            _ => None,
        };
        info!(project = %project.name, "resuming deployment");

        let request = DeployRequest {
            project: project.id.clone(),
            server,
            domain,
            backup: project.backup.clone(),
        };
        match self.configure(request).await {
            Ok(outcome) => Some(outcome),
            Err(OrchestrationError::AlreadyRunning { .. }) => None,
            Err(e) => Some(WorkflowOutcome::Failed(Failure::from(&e))),
        }
    }

    async fn finish(
        &self,
        project: &mut DeployedProject,
        result: Result<Flow, OrchestrationError>,
    ) -> WorkflowOutcome {
        let outcome = match result {
            Ok(Flow::Done) => {
                project.mark_deployed();
                info!(project = %project.name, "deployment complete");
                WorkflowOutcome::Completed
            }
            Ok(Flow::Paused(rename)) => {
                project.pending_repository_rename = Some(rename.clone());
                project.touch();
                warn!(project = %project.name, from = %rename.old, to = %rename.new, "repository renamed; waiting for confirmation");
                WorkflowOutcome::PausedForConflict(rename)
            }
            Err(e) => {
                if e.is_cancelled() {
                    warn!(project = %project.name, "deployment cancelled");
                } else {
                    error!(project = %project.name, kind = ?e.kind(), "deployment failed: {}", e);
                }
                project.mark_failed(e.to_string());
                WorkflowOutcome::from_error(&e)
            }
        };

        match self.ctx.store.save_project(project).await {
            Ok(()) => outcome,
            Err(store_err) => {
                error!(project = %project.name, "could not persist deployment result: {}", store_err);
                WorkflowOutcome::from_error(&store_err.into())
            }
        }
    }

    async fn run_steps(
        &self,
        project: &mut DeployedProject,
        request: &DeployRequest,
        token: &CancellationToken,
    ) -> Result<Flow, OrchestrationError> {
        let server = self.ctx.load_server(&request.server).await?;
        let tunnel = self.tunnel_of(&server).await?;

        ensure_active(token)?;
        // The link to the new server is committed only after the domain
        // points at it, so an interrupted move is still seen as a move.
        let previous_server = project.server.clone();

        if let Some(target) = &request.domain {
            let previous = match previous_server.clone() {
                Some(id) if id == server.id => PreviousPlacement {
                    same_server: true,
                    tunnel: tunnel.clone(),
                },
                Some(id) => PreviousPlacement {
                    same_server: false,
                    tunnel: match self.ctx.store.server(&id).await? {
                        Some(previous) => self.tunnel_of(&previous).await?,
                        None => None,
                    },
                },
                None => PreviousPlacement {
                    same_server: false,
                    tunnel: None,
                },
            };
            self.ensure_domain(project, &server, tunnel.as_ref(), previous, target, token)
                .await?;
        }

        if previous_server.as_ref() != Some(&server.id) {
            ensure_active(token)?;
            project.server = Some(server.id.clone());
            project.touch();
            self.ctx.store.save_project(project).await?;
            info!(project = %project.name, server_id = %server.id, "project linked to server");
        }

        if let Some(hostname) = project.domain.clone() {
            match &tunnel {
                Some(tunnel) => self.ensure_ingress(tunnel, &hostname, token).await?,
                None => self.ensure_dns_challenge(project, &server.id, token).await?,
            }
        }

        self.configure_backup(project, request.backup.as_ref(), token)
            .await?;

        if let Some(repository) = project.repository.clone()
            && let Some(rename) = self
                .push_secrets(project, &server, &repository, token)
                .await?
        {
            return Ok(Flow::Paused(rename));
        }

        ensure_active(token)?;
        Ok(Flow::Done)
    }

    async fn tunnel_of(&self, server: &Server) -> Result<Option<Tunnel>, OrchestrationError> {
        match &server.tunnel {
            Some(id) => Ok(self.ctx.store.tunnel(id).await?),
            None => Ok(None),
        }
    }

    async fn ensure_domain(
        &self,
        project: &mut DeployedProject,
        server: &Server,
        tunnel: Option<&Tunnel>,
        previous: PreviousPlacement,
        target: &DomainTarget,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let same_server = previous.same_server;
        let same_domain = project.domain.as_ref() == Some(&target.hostname)
            && project.dns_zone.as_ref() == Some(&target.zone);

        if same_domain && same_server && !project.created_dns_record_ids.is_empty() {
            debug!(project = %project.name, hostname = %target.hostname, "domain unchanged");
            return Ok(());
        }
        if project.domain.is_some() && !(same_domain && same_server) {
            self.cleanup_domain(project, previous.tunnel.as_ref(), token)
                .await?;
        }

        ensure_active(token)?;
        let creds = self
            .ctx
            .secret_for(&target.zone.integration, "resolve DNS credentials")
            .await?;

        let desired = match tunnel {
            Some(tunnel) => NewDnsRecord {
                record_type: RecordType::Cname,
                name: target.hostname.to_string(),
                content: self.ctx.tunnels.route_target(&tunnel.remote_id),
                proxied: true,
            },
            None => NewDnsRecord {
                record_type: RecordType::A,
                name: target.hostname.to_string(),
                content: server
                    .host
                    .clone()
                    .ok_or_else(|| OrchestrationError::precondition("server has no address"))?,
                proxied: false,
            },
        };

        let existing = cancellable(
            token,
            self.ctx
                .dns
                .list_records(&target.zone, None, Some(&desired.name), &creds),
        )
        .await?
        .context(ProviderSnafu {
            step: "list DNS records",
        })?;

        let record = match choose_record(project, &existing, &desired)? {
            Some(record) => {
                debug!(record_id = %record.id, "reusing DNS record");
                record
            }
            None => cancellable(
                token,
                self.ctx.dns.create_record(&target.zone, &desired, &creds),
            )
            .await?
            .context(ProviderSnafu {
                step: "create DNS record",
            })?,
        };

        project.track_record(record.id.clone());
        project.domain = Some(target.hostname.clone());
        project.dns_zone = Some(target.zone.clone());
        project.touch();
        self.ctx.store.save_project(project).await?;
        info!(project = %project.name, hostname = %target.hostname, record_type = %record.record_type, "DNS record in place");

        self.wait_for_propagation(&target.zone, &record, &creds, token)
            .await
    }

    async fn wait_for_propagation(
        &self,
        zone: &DnsZone,
        record: &DnsRecord,
        creds: &IntegrationSecret,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let config = &self.ctx.config.deployment;
        for attempt in 1..=config.propagation_attempts {
            ensure_active(token)?;
            let listed = cancellable(
                token,
                self.ctx.dns.list_records(
                    zone,
                    Some(record.record_type),
                    Some(&record.name),
                    creds,
                ),
            )
            .await?;
            match listed {
                Ok(records) if records.iter().any(|r| r.id == record.id) => return Ok(()),
                Ok(_) => debug!(attempt, name = %record.name, "record not visible yet"),
                Err(e) => debug!(attempt, name = %record.name, "propagation check failed: {}", e),
            }
            if attempt < config.propagation_attempts {
                sleep(token, config.propagation_interval).await?;
            }
        }

        warn!(name = %record.name, "DNS record not confirmed after {} checks; continuing", config.propagation_attempts);
        Ok(())
    }

    /// Delete the project's tracked records and its tunnel route.
    async fn cleanup_domain(
        &self,
        project: &mut DeployedProject,
        tunnel: Option<&Tunnel>,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        ensure_active(token)?;

        if let Some(zone) = project.dns_zone.clone()
            && !project.created_dns_record_ids.is_empty()
        {
            let creds = self
                .ctx
                .secret_for(&zone.integration, "resolve DNS credentials")
                .await?;
            let tracked = project.created_dns_record_ids.clone();
            let results = cancellable(
                token,
                delete_tracked_records(self.ctx.dns.as_ref(), &zone, &tracked, &creds),
            )
            .await?
            .context(ProviderSnafu {
                step: "list DNS records",
            })?;

            let mut first_failure = None;
            for (id, deletion) in results {
                if deletion.is_settled() {
                    project.untrack_record(&id);
                } else if let super::dns::RecordDeletion::Failed(e) = deletion {
                    first_failure.get_or_insert(e);
                }
            }
            project.touch();
            self.ctx.store.save_project(project).await?;

            if let Some(source) = first_failure {
                return Err(OrchestrationError::Provider {
                    step: "delete previous DNS record",
                    source,
                });
            }
        }

        if let (Some(tunnel), Some(hostname)) = (tunnel, &project.domain) {
            let creds = self
                .ctx
                .secret_for(&tunnel.integration, "resolve tunnel credentials")
                .await?;
            match cancellable(
                token,
                self.ctx
                    .tunnels
                    .remove_http_route(&tunnel.remote_id, hostname.as_str(), &creds),
            )
            .await?
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(source) => {
                    return Err(OrchestrationError::Provider {
                        step: "remove previous tunnel route",
                        source,
                    });
                }
            }
        }

        info!(project = %project.name, domain = ?project.domain, "previous domain removed");
        project.domain = None;
        project.dns_zone = None;
        project.touch();
        self.ctx.store.save_project(project).await?;
        Ok(())
    }

    async fn ensure_ingress(
        &self,
        tunnel: &Tunnel,
        hostname: &Hostname,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        ensure_active(token)?;
        let creds = self
            .ctx
            .secret_for(&tunnel.integration, "resolve tunnel credentials")
            .await?;
        let rule = IngressRule {
            hostname: hostname.to_string(),
            service: self.ctx.config.deployment.local_origin.clone(),
            no_tls_verify: true,
            origin_server_name: Some(hostname.to_string()),
        };

        let current = cancellable(
            token,
            self.ctx.tunnels.configuration(&tunnel.remote_id, &creds),
        )
        .await?
        .context(ProviderSnafu {
            step: "read tunnel configuration",
        })?;
        if current.route(hostname.as_str()) == Some(&rule) {
            debug!(%hostname, "tunnel route already present");
            return Ok(());
        }

        cancellable(
            token,
            self.ctx.tunnels.add_http_route(&tunnel.remote_id, &rule, &creds),
        )
        .await?
        .context(ProviderSnafu {
            step: "add tunnel route",
        })?;
        info!(%hostname, "tunnel route added");
        Ok(())
    }

    async fn ensure_dns_challenge(
        &self,
        project: &mut DeployedProject,
        server_id: &ServerId,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let Some(zone) = project.dns_zone.clone() else {
            return Ok(());
        };
        ensure_active(token)?;

        if project.traefik_dns_integration.as_ref() != Some(&zone.integration) {
            project.traefik_dns_integration = Some(zone.integration.clone());
            project.touch();
            self.ctx.store.save_project(project).await?;
        }

        let mut server = self.ctx.load_server(server_id).await?;
        if server.dns_challenge_providers.contains(&zone.integration) {
            debug!(server_id = %server.id, integration = %zone.integration, "DNS challenge provider already configured");
            return Ok(());
        }

        let mut integrations = server.dns_challenge_providers.clone();
        integrations.insert(zone.integration.clone());
        let vars = self.challenge_vars(integrations.iter()).await?;

        cancellable(
            token,
            self.ctx
                .runner
                .configure_dns_challenge_provider(&server, &vars),
        )
        .await?
        .context(RunnerSnafu {
            step: "configure DNS challenge provider",
        })?;

        server.dns_challenge_providers = integrations;
        self.ctx.store.save_server(&server).await?;
        info!(server_id = %server.id, providers = vars.providers.len(), "DNS challenge providers configured");
        Ok(())
    }

    async fn challenge_vars(
        &self,
        integrations: impl Iterator<Item = &IntegrationId>,
    ) -> Result<DnsChallengeVars, OrchestrationError> {
        let mut providers = Vec::new();
        for integration in integrations {
            let secret = self
                .ctx
                .secret_for(integration, "resolve DNS challenge credentials")
                .await?;
            providers.push(DnsChallengeProvider {
                integration: integration.clone(),
                secret,
            });
        }
        Ok(DnsChallengeVars::new(providers))
    }

    async fn configure_backup(
        &self,
        project: &mut DeployedProject,
        backup: Option<&BackupIntegration>,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        ensure_active(token)?;
        match backup {
            Some(target) => {
                let creds = self
                    .ctx
                    .secret_for(&target.integration, "resolve backup credentials")
                    .await?;
                let env = cancellable(
                    token,
                    prepare_backup_env(self.ctx.backups.as_ref(), target, &creds, &project.name),
                )
                .await?
                .context(ProviderSnafu {
                    step: "prepare backup storage",
                })?;
                project.backup = Some(target.clone());
                project.backup_env = env;
            }
            None => {
                if project.backup.is_none() && project.backup_env.is_empty() {
                    return Ok(());
                }
                debug!(project = %project.name, "clearing backup configuration");
                project.backup = None;
                project.backup_env.clear();
            }
        }
        project.touch();
        self.ctx.store.save_project(project).await?;
        Ok(())
    }

    /// Push deployment secrets. Returns the rename when the repository moved.
    async fn push_secrets(
        &self,
        project: &mut DeployedProject,
        server: &Server,
        repository: &Repository,
        token: &CancellationToken,
    ) -> Result<Option<RepositoryRename>, OrchestrationError> {
        ensure_active(token)?;
        let creds = self
            .ctx
            .secret_for(&repository.integration, "resolve source control credentials")
            .await?;

        let result = {
            let sections = env_sections(project, server);
            let request = SecretsRequest {
                project: &*project,
                server,
                repository,
                sections: &sections,
            };
            cancellable(
                token,
                self.ctx
                    .secrets
                    .configure_deployment_secrets(&request, &creds),
            )
            .await?
        };

        match result {
            Ok(env) => {
                project.production_env_backup = Some(env);
                project.touch();
                self.ctx.store.save_project(project).await?;
                info!(project = %project.name, %repository, "deployment secrets configured");
                Ok(None)
            }
            Err(SecretsError::Renamed(rename)) => Ok(Some(rename)),
            Err(SecretsError::Provider(source)) => Err(OrchestrationError::Provider {
                step: "configure deployment secrets",
                source,
            }),
        }
    }
}

/// Pick an existing record for `desired`.
///
/// A tracked record is reused. An untracked record identical to `desired`
/// is adopted, since it is what an earlier run created before its id was
/// persisted. Any other address record at the name is a conflict.
fn choose_record(
    project: &DeployedProject,
    existing: &[DnsRecord],
    desired: &NewDnsRecord,
) -> Result<Option<DnsRecord>, OrchestrationError> {
    let address_records = existing.iter().filter(|r| {
        matches!(
            r.record_type,
            RecordType::A | RecordType::Aaaa | RecordType::Cname
        )
    });

    let mut chosen = None;
    for record in address_records {
        let matches_desired =
            record.record_type == desired.record_type && record.content == desired.content;
        if matches_desired && (project.tracks_record(&record.id) || chosen.is_none()) {
            chosen = Some(record.clone());
        } else if !matches_desired && !project.tracks_record(&record.id) {
            return Err(OrchestrationError::precondition(format!(
                "{} already has a {} record pointing at {} that harbormaster did not create",
                record.name, record.record_type, record.content
            )));
        }
    }
    Ok(chosen)
}

fn env_sections(project: &DeployedProject, server: &Server) -> Vec<EnvSection> {
    let mut deployment = BTreeMap::from([
        ("PROJECT_NAME".to_string(), project.name.clone()),
        ("DEPLOY_USER".to_string(), server.user.clone()),
        ("DEPLOY_PORT".to_string(), server.port.to_string()),
    ]);
    if let Some(host) = &server.host {
        deployment.insert("DEPLOY_HOST".to_string(), host.clone());
    }
    if let Some(domain) = &project.domain {
        deployment.insert("DOMAIN".to_string(), domain.to_string());
    }

    let mut sections = vec![EnvSection {
        name: "deployment".to_string(),
        vars: deployment,
    }];
    if !project.backup_env.is_empty() {
        sections.push(EnvSection {
            name: "backup".to_string(),
            vars: project.backup_env.clone(),
        });
    }
    sections
}
