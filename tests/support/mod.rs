// ABOUTME: Test support utilities.
// ABOUTME: In-memory fakes for every collaborator plus a harness wiring them into an AppContext.

#![allow(dead_code)]

pub mod fakes;

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use harbormaster::config::OrchestratorConfig;
use harbormaster::model::{
    Credentials, DeployedProject, DnsZone, IntegrationSecret, Repository, Server, ServerStatus,
};
use harbormaster::orchestrator::AppContext;
use harbormaster::store::{EntityStore, MemoryStore};
use harbormaster::types::IntegrationId;

use fakes::*;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("harbormaster=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const CLOUD: &str = "do";
pub const DNS: &str = "cf-dns";
pub const TUNNEL: &str = "cf-tunnel";
pub const REPO: &str = "gh";
pub const STORAGE: &str = "s3";

/// Config with every wait shrunk to milliseconds.
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    let provisioning = &mut config.provisioning;
    provisioning.server_active_timeout = Duration::from_secs(5);
    provisioning.ssh_attempts = 3;
    provisioning.ssh_interval = Duration::from_millis(1);
    provisioning.ssh_connect_timeout = Duration::from_millis(10);
    provisioning.settle_delay = Duration::from_millis(1);
    provisioning.tunnel_attempts = 3;
    provisioning.tunnel_interval = Duration::from_millis(1);
    config.deployment.propagation_attempts = 2;
    config.deployment.propagation_interval = Duration::from_millis(1);
    config
}

pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub store: Arc<MemoryStore>,
    pub credentials: Arc<FakeCredentials>,
    pub cloud: Arc<FakeCloud>,
    pub dns: Arc<FakeDns>,
    pub tunnels: Arc<FakeTunnels>,
    pub secrets: Arc<FakeSecrets>,
    pub backups: Arc<FakeBackups>,
    pub runner: Arc<FakeRunner>,
    pub shell: Arc<FakeShell>,
    pub port_check: Arc<FakePortCheck>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let credentials = Arc::new(FakeCredentials::new(HashMap::from([
            (CLOUD, IntegrationSecret::token("do-token")),
            (DNS, IntegrationSecret::token("dns-token")),
            (TUNNEL, IntegrationSecret::token("tunnel-token")),
            (REPO, IntegrationSecret::token("gh-token")),
            (STORAGE, IntegrationSecret::key_pair("AKID", "storage-secret")),
        ])));
        let cloud = Arc::new(FakeCloud::default());
        let dns = Arc::new(FakeDns::default());
        let tunnels = Arc::new(FakeTunnels::default());
        let secrets = Arc::new(FakeSecrets::default());
        let backups = Arc::new(FakeBackups::default());
        let runner = Arc::new(FakeRunner::default());
        let shell = Arc::new(FakeShell::default());
        let port_check = Arc::new(FakePortCheck::default());

        let ctx = AppContext::builder(config)
            .store(store.clone())
            .credentials(credentials.clone())
            .key_generator(Arc::new(FakeKeys))
            .cloud(cloud.clone())
            .dns(dns.clone())
            .tunnels(tunnels.clone())
            .secrets(secrets.clone())
            .backups(backups.clone())
            .runner(runner.clone())
            .shell(shell.clone())
            .port_check(port_check.clone())
            .build()
            .expect("all collaborators provided");

        Self {
            ctx,
            store,
            credentials,
            cloud,
            dns,
            tunnels,
            secrets,
            backups,
            runner,
            shell,
            port_check,
        }
    }

    /// A custom server already provisioned at 203.0.113.7.
    pub async fn ready_server(&self) -> Server {
        let mut server = Server::custom(
            "203.0.113.7",
            22,
            "deploy",
            Credentials::Password {
                password: "pw".to_string(),
            },
        );
        server.status = ServerStatus::Ready;
        self.store.save_server(&server).await.unwrap();
        server
    }

    /// A project linked to a repository, not deployed yet.
    pub async fn project(&self, name: &str) -> DeployedProject {
        let mut project = DeployedProject::new(name);
        project.repository = Some(repository("acme", name));
        self.store.save_project(&project).await.unwrap();
        project
    }

    pub async fn server(&self, server: &Server) -> Server {
        self.store.server(&server.id).await.unwrap().expect("server stored")
    }

    pub async fn reload(&self, project: &DeployedProject) -> DeployedProject {
        self.store
            .project(&project.id)
            .await
            .unwrap()
            .expect("project stored")
    }
}

pub fn zone() -> DnsZone {
    DnsZone {
        integration: IntegrationId::new(DNS),
        zone_id: "zone-1".to_string(),
        zone_name: "example.com".to_string(),
    }
}

pub fn repository(owner: &str, name: &str) -> Repository {
    Repository::new(IntegrationId::new(REPO), owner, name)
}

/// Poll `condition` until it holds, failing the test after a second.
pub async fn eventually(mut condition: impl AsyncFnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}
