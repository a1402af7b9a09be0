//! Collaborator seams: artifact storage and audit logging.
//!
//! The surrounding application provides the real implementations. The
//! in-memory and filesystem versions here back the binary and the tests.

use crate::error::{ArchiveError, IntegrationError};
use crate::models::AuditEvent;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid artifact reference: {0}")]
    InvalidReference(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<StoreError> for IntegrationError {
    fn from(err: StoreError) -> Self {
        IntegrationError::Store {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ArchiveError {
    fn from(err: StoreError) -> Self {
        ArchiveError::Store {
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// `Ok(None)` when nothing is stored under `reference`.
    async fn read_artifact(&self, reference: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `bytes` and return the location they were written to.
    async fn write_artifact(&self, reference: &str, bytes: Bytes) -> Result<String, StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Bytes>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: impl Into<String>, bytes: impl Into<Bytes>) {
        self.artifacts.lock().insert(reference.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn read_artifact(&self, reference: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.artifacts.lock().get(reference).cloned())
    }

    async fn write_artifact(&self, reference: &str, bytes: Bytes) -> Result<String, StoreError> {
        self.artifacts.lock().insert(reference.to_string(), bytes);
        Ok(format!("memory://{}", reference))
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.events.lock().push(event);
        Ok(())
    }
}

// ============================================================================
// FILESYSTEM STORE
// ============================================================================

/// Artifacts as files below a root directory; references are relative paths.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if reference.is_empty() || escapes {
            return Err(StoreError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read_artifact(&self, reference: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("🔍 Artifact not found: {:?}", path);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_artifact(&self, reference: &str, bytes: Bytes) -> Result<String, StoreError> {
        let path = self.resolve(reference)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}
