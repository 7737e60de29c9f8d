//! Session persistence backends.

use async_trait::async_trait;
use kestrel_core::{BackendError, BackendKind, BackendResult, IdValidator};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::Session;

/// Durable storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Save or replace a session.
    async fn save(&self, session: &Session) -> BackendResult<()>;

    async fn load(&self, session_id: &str) -> BackendResult<Option<Session>>;

    /// Delete a session; returns whether it existed.
    async fn delete(&self, session_id: &str) -> BackendResult<bool>;

    async fn list_ids(&self) -> BackendResult<Vec<String>>;
}

/// Store keeping sessions in a map. Useful in tests and as a process-local cache.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> BackendResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> BackendResult<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> BackendResult<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn list_ids(&self) -> BackendResult<Vec<String>> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One JSON document per session under a directory.
///
/// Writes go to a temporary file that is then renamed over the target.
/// Session ids must pass [`IdValidator`] before they are turned into paths.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    /// Open a store, creating the directory if needed.
    pub fn new(directory: impl Into<PathBuf>) -> BackendResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(persistence_io)?;
        info!(directory = %directory.display(), "Opened file session store");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn session_path(&self, session_id: &str) -> BackendResult<PathBuf> {
        IdValidator::validate(session_id).map_err(|e| BackendError::InvalidKey {
            backend: BackendKind::Persistence,
            key: session_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.directory.join(format!("{session_id}.json")))
    }
}

fn persistence_io(err: std::io::Error) -> BackendError {
    BackendError::io(BackendKind::Persistence, err)
}

fn join_error(err: tokio::task::JoinError) -> BackendError {
    BackendError::operation(BackendKind::Persistence, format!("blocking task failed: {err}"))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> BackendResult<()> {
        let path = self.session_path(&session.id)?;
        let content = serde_json::to_vec_pretty(session)
            .map_err(|e| BackendError::serialization(BackendKind::Persistence, e))?;

        let temp_path = path.with_extension("json.tmp");
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::write(&temp_path, &content)?;
            std::fs::rename(&temp_path, &target)
        })
        .await
        .map_err(join_error)?
        .map_err(persistence_io)?;

        debug!(session_id = %session.id, path = %path.display(), "Persisted session");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> BackendResult<Option<Session>> {
        let path = self.session_path(session_id)?;
        let content = tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .map_err(join_error)?
        .map_err(persistence_io)?;

        content
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| BackendError::serialization(BackendKind::Persistence, e))
            })
            .transpose()
    }

    async fn delete(&self, session_id: &str) -> BackendResult<bool> {
        let path = self.session_path(session_id)?;
        let removed = tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        })
        .await
        .map_err(join_error)?
        .map_err(persistence_io)?;

        if removed {
            debug!(session_id = %session_id, "Deleted persisted session");
        }
        Ok(removed)
    }

    async fn list_ids(&self) -> BackendResult<Vec<String>> {
        let directory = self.directory.clone();
        let mut ids = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<String>> {
            let mut ids = Vec::new();
            for entry in std::fs::read_dir(&directory)?.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    ids.push(stem.to_string());
                }
            }
            Ok(ids)
        })
        .await
        .map_err(join_error)?
        .map_err(persistence_io)?;
        ids.sort();
        Ok(ids)
    }
}
