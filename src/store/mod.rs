// ABOUTME: Durable entity storage contract plus in-memory and JSON-file backends.
// ABOUTME: Every orchestration step persists through this trait.

mod error;
mod json;
mod memory;

pub use error::StoreError;
pub use json::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::model::{DeployedProject, ProjectDeploymentStatus, Server, Tunnel};
use crate::types::{ProjectId, ServerId, TunnelId};

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn server(&self, id: &ServerId) -> Result<Option<Server>, StoreError>;
    async fn servers(&self) -> Result<Vec<Server>, StoreError>;
    async fn save_server(&self, server: &Server) -> Result<(), StoreError>;
    async fn delete_server(&self, id: &ServerId) -> Result<(), StoreError>;

    async fn tunnel(&self, id: &TunnelId) -> Result<Option<Tunnel>, StoreError>;
    async fn save_tunnel(&self, tunnel: &Tunnel) -> Result<(), StoreError>;
    async fn delete_tunnel(&self, id: &TunnelId) -> Result<(), StoreError>;

    async fn project(&self, id: &ProjectId) -> Result<Option<DeployedProject>, StoreError>;
    async fn projects(&self) -> Result<Vec<DeployedProject>, StoreError>;
    async fn save_project(&self, project: &DeployedProject) -> Result<(), StoreError>;
    async fn delete_project(&self, id: &ProjectId) -> Result<(), StoreError>;

    async fn projects_with_status(
        &self,
        status: ProjectDeploymentStatus,
    ) -> Result<Vec<DeployedProject>, StoreError> {
        Ok(self
            .projects()
            .await?
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    async fn projects_on_server(
        &self,
        server: &ServerId,
    ) -> Result<Vec<DeployedProject>, StoreError> {
        Ok(self
            .projects()
            .await?
            .into_iter()
            .filter(|p| p.server.as_ref() == Some(server))
            .collect())
    }
}
