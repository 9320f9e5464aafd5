// ABOUTME: Durable entity store backed by a single JSON snapshot file.
// ABOUTME: Rewrites the file atomically (temp file + rename) after each mutation.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{EntityStore, StoreError};
use crate::model::{DeployedProject, Server, Tunnel};
use crate::types::{ProjectId, ServerId, TunnelId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    servers: BTreeMap<ServerId, Server>,
    #[serde(default)]
    tunnels: BTreeMap<TunnelId, Tunnel>,
    #[serde(default)]
    projects: BTreeMap<ProjectId, DeployedProject>,
}

/// File-backed store. Reads are served from memory; writes go to disk before returning.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
    /// Serializes writers; readers only ever take `snapshot`.
    writer: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty one if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy, flush it, then publish it. A failed write
    /// leaves both memory and disk at the previous state.
    async fn mutate(&self, change: impl FnOnce(&mut Snapshot)) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        let mut next = self.snapshot.lock().clone();
        change(&mut next);
        let content = serde_json::to_vec_pretty(&next)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })??;

        *self.snapshot.lock() = next;
        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

#[async_trait]
impl EntityStore for JsonFileStore {
    async fn server(&self, id: &ServerId) -> Result<Option<Server>, StoreError> {
        Ok(self.snapshot.lock().servers.get(id).cloned())
    }

    async fn servers(&self) -> Result<Vec<Server>, StoreError> {
        Ok(self.snapshot.lock().servers.values().cloned().collect())
    }

    async fn save_server(&self, server: &Server) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.servers.insert(server.id.clone(), server.clone());
        })
        .await
    }

    async fn delete_server(&self, id: &ServerId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.servers.remove(id);
        })
        .await
    }

    async fn tunnel(&self, id: &TunnelId) -> Result<Option<Tunnel>, StoreError> {
        Ok(self.snapshot.lock().tunnels.get(id).cloned())
    }

    async fn save_tunnel(&self, tunnel: &Tunnel) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.tunnels.insert(tunnel.id.clone(), tunnel.clone());
        })
        .await
    }

    async fn delete_tunnel(&self, id: &TunnelId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.tunnels.remove(id);
        })
        .await
    }

    async fn project(&self, id: &ProjectId) -> Result<Option<DeployedProject>, StoreError> {
        Ok(self.snapshot.lock().projects.get(id).cloned())
    }

    async fn projects(&self) -> Result<Vec<DeployedProject>, StoreError> {
        Ok(self.snapshot.lock().projects.values().cloned().collect())
    }

    async fn save_project(&self, project: &DeployedProject) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.projects.insert(project.id.clone(), project.clone());
        })
        .await
    }

    async fn delete_project(&self, id: &ProjectId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.projects.remove(id);
        })
        .await
    }
}
