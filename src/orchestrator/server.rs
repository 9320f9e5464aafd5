// ABOUTME: Server lifecycle: create, register, and drive provisioning to Ready.
// ABOUTME: One cancellable unit per server; every step is persisted before the next.

use snafu::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cancel::{cancellable, ensure_active, sleep};
use super::context::AppContext;
use super::error::{
    AlreadyRunningSnafu, OrchestrationError, ProviderSnafu, RunnerSnafu, ShellSnafu,
};
use super::outcome::WorkflowOutcome;
use super::progress::{ProgressSink, ProvisionProgress};
use super::registry::TaskTicket;
use crate::model::{
    Credentials, DnsZone, ProviderLink, ProvisionStep, Server, ServerStatus, Tunnel, TunnelVars,
};
use crate::providers::{CreateServerRequest, IngressRule, NewDnsRecord, RecordType};
use crate::runner::RunnerError;
use crate::types::{
    ARCHITECTURE_COMMAND, Architecture, Hostname, IntegrationId, ServerId, ServerMarker,
    SshKeyId, TunnelId,
};

/// Service the SSH hostname routes to on a tunneled server.
const TUNNEL_SSH_SERVICE: &str = "ssh://localhost:22";

/// A provider server to create.
#[derive(Debug, Clone)]
pub struct NewServer {
    pub name: String,
    pub integration: IntegrationId,
    pub region: Option<String>,
    pub size: Option<String>,
    pub tunnel: Option<TunnelOptions>,
}

/// Opt-in tunnel for a new provider server.
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub integration: IntegrationId,
    pub zone: DnsZone,
    /// Label under `zone` for the SSH hostname, e.g. `ssh-web1`.
    pub ssh_subdomain: String,
}

/// A pre-existing host to register.
#[derive(Debug, Clone)]
pub struct NewCustomServer {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Credentials,
}

/// What `start_if_needed` did.
#[derive(Debug)]
pub enum StartDecision {
    Started(JoinHandle<WorkflowOutcome>),
    AlreadyRunning,
    /// Ready or Failed servers are left alone; retry explicitly.
    Settled(ServerStatus),
    MissingCredentials,
}

impl StartDecision {
    pub fn is_started(&self) -> bool {
        matches!(self, StartDecision::Started(_))
    }

    /// Wait for the started unit, if any.
    pub async fn join(self) -> Option<WorkflowOutcome> {
        match self {
            StartDecision::Started(handle) => match handle.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!("provisioning task ended abnormally: {}", e);
                    None
                }
            },
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ServerLifecycle {
    ctx: Arc<AppContext>,
    progress: Option<ProgressSink>,
}

impl ServerLifecycle {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Create a server at the cloud provider and start provisioning it.
    ///
    /// The uploaded SSH key is removed again when server creation fails.
    pub async fn create_server(
        &self,
        request: NewServer,
    ) -> Result<(Server, StartDecision), OrchestrationError> {
        let creds = self
            .ctx
            .secret_for(&request.integration, "resolve cloud credentials")
            .await?;

        let key_label = format!("harbormaster-{}", request.name);
        let key_pair = self
            .ctx
            .keys
            .generate(&key_label)
            .await
            .context(ProviderSnafu {
                step: "generate SSH key",
            })?;
        let ssh_key = self
            .ctx
            .cloud
            .upload_ssh_key(&key_label, &key_pair.public_key, &creds)
            .await
            .context(ProviderSnafu {
                step: "upload SSH key",
            })?;

        let provisioning = &self.ctx.config.provisioning;
        let region = request
            .region
            .as_deref()
            .unwrap_or(&provisioning.default_region);
        let size = request.size.as_deref().unwrap_or(&provisioning.default_size);

        let created = async {
            let image = self
                .ctx
                .cloud
                .latest_base_image(&creds)
                .await
                .context(ProviderSnafu {
                    step: "look up base image",
                })?;
            self.ctx
                .cloud
                .create_server(
                    &CreateServerRequest {
                        name: &request.name,
                        region,
                        size,
                        image: &image,
                        ssh_key: &ssh_key,
                    },
                    &creds,
                )
                .await
                .context(ProviderSnafu {
                    step: "create server",
                })
        }
        .await;

        let remote = match created {
            Ok(remote) => remote,
            Err(e) => {
                self.discard_ssh_key(&ssh_key, &request.integration).await;
                return Err(e);
            }
        };
        info!(name = %request.name, remote_id = %remote.remote_id, "server created at provider");

        let mut server = Server::provider_managed(
            request.name,
            ProviderLink {
                integration: request.integration,
                remote_id: remote.remote_id,
                ssh_key: Some(ssh_key),
            },
            Credentials::KeyPair {
                private_key: key_pair.private_key,
                public_key: key_pair.public_key,
            },
        );
        self.ctx.store.save_server(&server).await?;

        if let Some(options) = request.tunnel
            && let Err(e) = self.attach_tunnel(&mut server, options).await
        {
            error!(server_id = %server.id, "tunnel setup failed: {}", e);
            server.mark_failed(e.to_string());
            self.ctx.store.save_server(&server).await?;
            return Err(e);
        }

        let decision = self.start_if_needed(&server.id).await?;
        Ok((server, decision))
    }

    /// Register a pre-existing host and start provisioning it.
    pub async fn add_custom_server(
        &self,
        request: NewCustomServer,
    ) -> Result<(Server, StartDecision), OrchestrationError> {
        let mut server = Server::custom(request.host, request.port, request.user, request.credentials);
        server.name = request.name;
        self.ctx.store.save_server(&server).await?;
        info!(server_id = %server.id, host = ?server.host, "custom server registered");

        let decision = self.start_if_needed(&server.id).await?;
        Ok((server, decision))
    }

    /// Start provisioning unless a unit already runs or the server is settled.
    pub async fn start_if_needed(&self, id: &ServerId) -> Result<StartDecision, OrchestrationError> {
        let Some(ticket) = self.ctx.server_tasks.try_register(id) else {
            debug!(server_id = %id, "provisioning already running");
            return Ok(StartDecision::AlreadyRunning);
        };

        let server = self.ctx.load_server(id).await?;
        if server.status.is_settled() {
            return Ok(StartDecision::Settled(server.status));
        }
        if server.credentials.is_none() {
            warn!(server_id = %id, "server has no credentials; not provisioning");
            return Ok(StartDecision::MissingCredentials);
        }

        Ok(StartDecision::Started(self.spawn(ticket)))
    }

    /// Cancel any running unit, reset the status, and provision again.
    pub async fn retry_provisioning(
        &self,
        id: &ServerId,
    ) -> Result<StartDecision, OrchestrationError> {
        if self.ctx.server_tasks.cancel_and_wait(id).await {
            info!(server_id = %id, "cancelled running provisioning before retry");
        }

        let ticket = self
            .ctx
            .server_tasks
            .try_register(id)
            .ok_or_else(|| AlreadyRunningSnafu { id: id.to_string() }.build())?;

        let mut server = self.ctx.load_server(id).await?;
        if server.credentials.is_none() {
            return Ok(StartDecision::MissingCredentials);
        }
        server.status = server.restart_status();
        server.error = None;
        self.ctx.store.save_server(&server).await?;

        Ok(StartDecision::Started(self.spawn(ticket)))
    }

    /// Signal the running unit to stop. Returns false when none is running.
    pub fn cancel(&self, id: &ServerId) -> bool {
        self.ctx.server_tasks.cancel(id)
    }

    pub fn is_running(&self, id: &ServerId) -> bool {
        self.ctx.server_tasks.is_running(id)
    }

    pub fn running(&self) -> Vec<ServerId> {
        self.ctx.server_tasks.running()
    }

    /// Start provisioning for every stored server that stopped mid-way.
    pub async fn resume_incomplete(&self) -> Result<Vec<ServerId>, OrchestrationError> {
        let mut started = Vec::new();
        for server in self.ctx.store.servers().await? {
            if server.status.is_settled() {
                continue;
            }
            if self.start_if_needed(&server.id).await?.is_started() {
                started.push(server.id);
            }
        }
        Ok(started)
    }

    fn spawn(&self, ticket: TaskTicket<ServerMarker>) -> JoinHandle<WorkflowOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run(ticket).await })
    }

    async fn run(&self, ticket: TaskTicket<ServerMarker>) -> WorkflowOutcome {
        let id = ticket.id().clone();
        info!(server_id = %id, "provisioning started");

        let outcome = match self.provision(&id, ticket.token()).await {
            Ok(()) => {
                info!(server_id = %id, "server ready");
                WorkflowOutcome::Completed
            }
            Err(e) => {
                if e.is_cancelled() {
                    warn!(server_id = %id, "provisioning cancelled");
                } else {
                    error!(server_id = %id, kind = ?e.kind(), "provisioning failed: {}", e);
                }
                if let Err(store_err) = self.persist_failure(&id, &e).await {
                    error!(server_id = %id, "could not persist failure: {}", store_err);
                }
                WorkflowOutcome::from_error(&e)
            }
        };

        ticket.complete();
        outcome
    }

    async fn persist_failure(
        &self,
        id: &ServerId,
        err: &OrchestrationError,
    ) -> Result<(), OrchestrationError> {
        // Deleted while running: nothing left to mark.
        let Some(mut server) = self.ctx.store.server(id).await? else {
            return Ok(());
        };
        server.mark_failed(err.to_string());
        self.ctx.store.save_server(&server).await?;
        Ok(())
    }

    async fn provision(
        &self,
        id: &ServerId,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let mut server = self.ctx.load_server(id).await?;

        if server.host.is_none() {
            self.wait_for_address(&mut server, token).await?;
        }

        ensure_active(token)?;
        server.status = ServerStatus::Provisioning;
        self.ctx.store.save_server(&server).await?;

        self.wait_for_ssh(&server, token).await?;
        self.complete_step(&mut server, ProvisionStep::SshReachable).await?;

        // Operator-supplied credentials are checked before anything runs as them.
        if server.custom {
            cancellable(token, self.ctx.runner.test_connection(&server))
                .await?
                .context(RunnerSnafu {
                    step: "test connection",
                })?;
        }

        ensure_active(token)?;
        let architecture = self.detect_architecture(&server, token).await?;
        info!(server_id = %id, %architecture, "architecture detected");
        server.architecture = Some(architecture);
        self.complete_step(&mut server, ProvisionStep::ArchitectureDetected)
            .await?;

        let public_key = server
            .credentials
            .as_ref()
            .and_then(Credentials::public_key)
            .map(str::to_string);

        if server.is_root() && !server.custom {
            ensure_active(token)?;
            let Some(public_key) = public_key.as_deref() else {
                return Err(OrchestrationError::precondition(
                    "preparing a non-root user requires key pair credentials",
                ));
            };
            let target_user = self.ctx.config.provisioning.target_user.clone();
            cancellable(
                token,
                self.ctx.runner.prepare_user(&server, &target_user, public_key),
            )
            .await?
            .context(RunnerSnafu {
                step: "prepare user",
            })?;
            server.user = target_user;
            self.complete_step(&mut server, ProvisionStep::UserPrepared)
                .await?;
        }

        let tunnel = self.tunnel_of(&server).await?;
        let tunnel_vars = tunnel.as_ref().map(Tunnel::vars);

        ensure_active(token)?;
        cancellable(
            token,
            self.ctx.runner.provision_server(
                &server,
                &server.user,
                public_key.as_deref(),
                tunnel_vars.as_ref(),
            ),
        )
        .await?
        .context(RunnerSnafu {
            step: "configure server",
        })?;
        self.complete_step(&mut server, ProvisionStep::Configured)
            .await?;

        if let Some(vars) = &tunnel_vars {
            self.verify_tunnel(&server, token).await?;
            self.complete_step(&mut server, ProvisionStep::TunnelVerified)
                .await?;
            self.close_direct_port(&server, vars, token).await?;
            self.complete_step(&mut server, ProvisionStep::SshPortClosed)
                .await?;
        }

        ensure_active(token)?;
        server
            .mark_ready()
            .map_err(OrchestrationError::precondition)?;
        self.ctx.store.save_server(&server).await?;
        Ok(())
    }

    async fn wait_for_address(
        &self,
        server: &mut Server,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let Some(link) = server.provider.clone() else {
            return Err(OrchestrationError::precondition(
                "server has neither an address nor a provider",
            ));
        };

        server.status = ServerStatus::WaitingForIp;
        self.ctx.store.save_server(server).await?;

        let creds = self
            .ctx
            .secret_for(&link.integration, "resolve cloud credentials")
            .await?;

        let progress = self.progress.clone();
        let server_id = server.id.clone();
        let on_progress = move |elapsed: Duration| {
            debug!(server_id = %server_id, ?elapsed, "waiting for provider");
            if let Some(sink) = &progress {
                sink(&server_id, ProvisionProgress::WaitingForProvider { elapsed });
            }
        };

        let active = cancellable(
            token,
            self.ctx.cloud.wait_for_server_active(
                &link.remote_id,
                &creds,
                self.ctx.config.provisioning.server_active_timeout,
                &on_progress,
            ),
        )
        .await?
        .context(ProviderSnafu {
            step: "wait for server to become active",
        })?;

        info!(server_id = %server.id, ip = %active.public_ipv4, "address assigned");
        server.host = Some(active.public_ipv4);
        self.complete_step(server, ProvisionStep::AddressAssigned)
            .await
    }

    async fn wait_for_ssh(
        &self,
        server: &Server,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let config = &self.ctx.config.provisioning;
        let host = server
            .host
            .as_deref()
            .ok_or_else(|| OrchestrationError::precondition("server has no address"))?;

        for attempt in 1..=config.ssh_attempts {
            ensure_active(token)?;
            self.emit(
                &server.id,
                ProvisionProgress::WaitingForSsh {
                    attempt,
                    of: config.ssh_attempts,
                },
            );

            let open = cancellable(
                token,
                self.ctx
                    .port_check
                    .is_open(host, server.port, config.ssh_connect_timeout),
            )
            .await?;
            if open {
                return Ok(());
            }

            debug!(server_id = %server.id, attempt, "SSH port not open yet");
            if attempt < config.ssh_attempts {
                sleep(token, config.ssh_interval).await?;
            }
        }

        Err(OrchestrationError::SshUnreachable {
            host: host.to_string(),
            port: server.port,
            attempts: config.ssh_attempts,
        })
    }

    async fn detect_architecture(
        &self,
        server: &Server,
        token: &CancellationToken,
    ) -> Result<Architecture, OrchestrationError> {
        let output = cancellable(
            token,
            self.ctx.shell.exec(server, ARCHITECTURE_COMMAND),
        )
        .await?
        .context(ShellSnafu {
            step: "detect architecture",
        })?;

        if !output.success() {
            return Err(OrchestrationError::precondition(format!(
                "architecture detection exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(Architecture::parse(&output.stdout)?)
    }

    async fn tunnel_of(&self, server: &Server) -> Result<Option<Tunnel>, OrchestrationError> {
        let Some(tunnel_id) = &server.tunnel else {
            return Ok(None);
        };
        let tunnel = self.ctx.store.tunnel(tunnel_id).await?;
        if tunnel.is_none() {
            warn!(server_id = %server.id, tunnel_id = %tunnel_id, "tunnel record missing; provisioning without it");
        }
        Ok(tunnel)
    }

    async fn verify_tunnel(
        &self,
        server: &Server,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let config = &self.ctx.config.provisioning;
        sleep(token, config.settle_delay).await?;

        let mut last_error = None;
        for attempt in 1..=config.tunnel_attempts {
            ensure_active(token)?;
            self.emit(
                &server.id,
                ProvisionProgress::VerifyingTunnel {
                    attempt,
                    of: config.tunnel_attempts,
                },
            );

            match cancellable(token, self.ctx.runner.test_tunnel(server)).await? {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(server_id = %server.id, attempt, "tunnel not reachable yet: {}", e);
                    last_error = Some(e);
                }
            }
            if attempt < config.tunnel_attempts {
                sleep(token, config.tunnel_interval).await?;
            }
        }

        Err(OrchestrationError::TunnelUnverified {
            attempts: config.tunnel_attempts,
            source: last_error
                .unwrap_or_else(|| RunnerError::failed("test tunnel", "no attempts configured")),
        })
    }

    async fn close_direct_port(
        &self,
        server: &Server,
        vars: &TunnelVars,
        token: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        ensure_active(token)?;
        cancellable(token, self.ctx.runner.close_direct_port(server, vars))
            .await?
            .context(RunnerSnafu {
                step: "close direct SSH port",
            })
    }

    async fn complete_step(
        &self,
        server: &mut Server,
        step: ProvisionStep,
    ) -> Result<(), OrchestrationError> {
        server.last_step = Some(step);
        self.ctx.store.save_server(server).await?;
        debug!(server_id = %server.id, ?step, "step completed");
        self.emit(&server.id, ProvisionProgress::StepCompleted(step));
        Ok(())
    }

    fn emit(&self, id: &ServerId, progress: ProvisionProgress) {
        if let Some(sink) = &self.progress {
            sink(id, progress);
        }
    }

    async fn attach_tunnel(
        &self,
        server: &mut Server,
        options: TunnelOptions,
    ) -> Result<(), OrchestrationError> {
        let creds = self
            .ctx
            .secret_for(&options.integration, "resolve tunnel credentials")
            .await?;
        let ssh_hostname = Hostname::join(&options.ssh_subdomain, &options.zone.zone_name)
            .map_err(|e| OrchestrationError::precondition(e.to_string()))?;

        let remote = self
            .ctx
            .tunnels
            .get_or_create_tunnel(&format!("harbormaster-{}", server.id), &creds)
            .await
            .context(ProviderSnafu {
                step: "create tunnel",
            })?;
        let token = self
            .ctx
            .tunnels
            .tunnel_token(&remote.remote_id, &creds)
            .await
            .context(ProviderSnafu {
                step: "fetch tunnel token",
            })?;

        let mut tunnel = Tunnel {
            id: TunnelId::generate(),
            integration: options.integration,
            remote_id: remote.remote_id,
            token,
            zone: options.zone,
            ssh_hostname,
            ssh_record: None,
            server: Some(server.id.clone()),
        };
        // Persist before touching DNS so teardown can find the remote tunnel.
        self.ctx.store.save_tunnel(&tunnel).await?;
        server.tunnel = Some(tunnel.id.clone());
        self.ctx.store.save_server(server).await?;

        self.ctx
            .tunnels
            .add_http_route(
                &tunnel.remote_id,
                &IngressRule {
                    hostname: tunnel.ssh_hostname.to_string(),
                    service: TUNNEL_SSH_SERVICE.to_string(),
                    no_tls_verify: false,
                    origin_server_name: None,
                },
                &creds,
            )
            .await
            .context(ProviderSnafu {
                step: "route SSH hostname",
            })?;

        let dns_creds = self
            .ctx
            .secret_for(&tunnel.zone.integration, "resolve DNS credentials")
            .await?;
        let record = self
            .ctx
            .dns
            .create_record(
                &tunnel.zone,
                &NewDnsRecord {
                    record_type: RecordType::Cname,
                    name: tunnel.ssh_hostname.to_string(),
                    content: self.ctx.tunnels.route_target(&tunnel.remote_id),
                    proxied: true,
                },
                &dns_creds,
            )
            .await
            .context(ProviderSnafu {
                step: "create SSH hostname record",
            })?;

        tunnel.ssh_record = Some(record.id);
        self.ctx.store.save_tunnel(&tunnel).await?;
        info!(server_id = %server.id, ssh_hostname = %tunnel.ssh_hostname, "tunnel attached");
        Ok(())
    }

    async fn discard_ssh_key(&self, key: &SshKeyId, integration: &IntegrationId) {
        let result = match self.ctx.secret(integration).await {
            Ok(creds) => self.ctx.cloud.delete_ssh_key(key, &creds).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!(key = %key, "removed SSH key after failed create"),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(key = %key, "could not remove SSH key after failed create: {}", e),
        }
    }
}
