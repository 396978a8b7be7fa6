/*!
 * Sandbox Storage
 * Durable and ephemeral directories plus the infra root filesystem
 */

mod local;
mod simulation;

pub use local::LocalStorage;
pub use simulation::FaultyStorage;

use crate::config::IdMappings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Storage operation result
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Another sandbox already holds the name
    #[error("name {0:?} is already in use")]
    DuplicateName(String),

    #[error("container {0} not found")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Image configuration of the pause image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageConfig {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub stop_signal: String,
}

/// Parameters for allocating sandbox storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxStorageRequest {
    pub name: String,
    pub id: String,
    pub image: String,
    pub auth_file: Option<PathBuf>,
    pub container_name: String,
    pub kube_name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
    pub id_mappings: Option<IdMappings>,
    /// `key:value` SELinux options
    pub label_options: Vec<String>,
}

/// Storage record of an allocated sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    /// Durable directory
    pub dir: PathBuf,
    /// Ephemeral directory
    pub run_dir: PathBuf,
    pub config: ImageConfig,
    pub process_label: String,
    pub mount_label: String,
}

/// Storage collaborator
pub trait StorageService: Send + Sync {
    /// Reserve storage for a sandbox; a taken name yields `DuplicateName`
    fn create_pod_sandbox(&self, request: &SandboxStorageRequest) -> StorageResult<ContainerInfo>;

    /// Release everything allocated for `id`
    fn remove_pod_sandbox(&self, id: &str) -> StorageResult<()>;

    /// Mount the container's root filesystem, returning the mount point
    fn start_container(&self, id: &str) -> StorageResult<PathBuf>;
}
