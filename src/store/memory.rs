// ABOUTME: In-memory entity store for tests and embedding.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{EntityStore, StoreError};
use crate::model::{DeployedProject, Server, Tunnel};
use crate::types::{ProjectId, ServerId, TunnelId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    servers: Mutex<HashMap<ServerId, Server>>,
    tunnels: Mutex<HashMap<TunnelId, Tunnel>>,
    projects: Mutex<HashMap<ProjectId, DeployedProject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn server(&self, id: &ServerId) -> Result<Option<Server>, StoreError> {
        Ok(self.servers.lock().get(id).cloned())
    }

    async fn servers(&self) -> Result<Vec<Server>, StoreError> {
        Ok(self.servers.lock().values().cloned().collect())
    }

    async fn save_server(&self, server: &Server) -> Result<(), StoreError> {
        self.servers
            .lock()
            .insert(server.id.clone(), server.clone());
        Ok(())
    }

    async fn delete_server(&self, id: &ServerId) -> Result<(), StoreError> {
        self.servers.lock().remove(id);
        Ok(())
    }

    async fn tunnel(&self, id: &TunnelId) -> Result<Option<Tunnel>, StoreError> {
        Ok(self.tunnels.lock().get(id).cloned())
    }

    async fn save_tunnel(&self, tunnel: &Tunnel) -> Result<(), StoreError> {
        self.tunnels
            .lock()
            .insert(tunnel.id.clone(), tunnel.clone());
        Ok(())
    }

    async fn delete_tunnel(&self, id: &TunnelId) -> Result<(), StoreError> {
        self.tunnels.lock().remove(id);
        Ok(())
    }

    async fn project(&self, id: &ProjectId) -> Result<Option<DeployedProject>, StoreError> {
        Ok(self.projects.lock().get(id).cloned())
    }

    async fn projects(&self) -> Result<Vec<DeployedProject>, StoreError> {
        Ok(self.projects.lock().values().cloned().collect())
    }

    async fn save_project(&self, project: &DeployedProject) -> Result<(), StoreError> {
        self.projects
            .lock()
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<(), StoreError> {
        self.projects.lock().remove(id);
        Ok(())
    }
}
