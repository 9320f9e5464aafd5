// ABOUTME: Persisted entities: servers, tunnels, deployed projects, integrations.
// ABOUTME: These records are the only state that survives a host process restart.

mod integration;
mod project;
mod server;

pub use integration::{BackupIntegration, BackupProvider, DnsZone, IntegrationSecret, KeyPair};
pub use project::{DeployedProject, ProjectDeploymentStatus, Repository, RepositoryRename};
pub use server::{
    Credentials, ProviderLink, ProvisionStep, Server, ServerStatus, Tunnel, TunnelVars,
};
