/*!
 * Namespace Types
 * Kinds, ownership records and errors for sandbox namespaces
 */

use crate::spec::LinuxNamespaceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for namespace operations
pub type NamespaceResult<T> = Result<T, NamespaceError>;

/// Namespace errors
#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Namespace kind {0} cannot be managed")]
    Unsupported(NamespaceKind),

    #[error("Failed to pin {kind} namespace at {path:?}: {reason}")]
    Pin {
        kind: NamespaceKind,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to remove namespaces: {0}")]
    Teardown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Namespace kinds a sandbox can share, own, or leave to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Network,
    Ipc,
    Uts,
    Pid,
    User,
}

impl NamespaceKind {
    /// Entry name under `/proc/<pid>/ns`
    pub fn proc_name(self) -> &'static str {
        match self {
            NamespaceKind::Network => "net",
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::Uts => "uts",
            NamespaceKind::Pid => "pid",
            NamespaceKind::User => "user",
        }
    }

    /// Runtime-spec namespace type
    pub fn spec_type(self) -> LinuxNamespaceType {
        match self {
            NamespaceKind::Network => LinuxNamespaceType::Network,
            NamespaceKind::Ipc => LinuxNamespaceType::Ipc,
            NamespaceKind::Uts => LinuxNamespaceType::Uts,
            NamespaceKind::Pid => LinuxNamespaceType::Pid,
            NamespaceKind::User => LinuxNamespaceType::User,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// A namespace created and owned by this system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedNamespace {
    pub kind: NamespaceKind,
    /// Bind-mount pin keeping the namespace alive; empty means "don't configure"
    pub path: PathBuf,
    pub owned: bool,
}

impl ManagedNamespace {
    pub fn owned(kind: NamespaceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            owned: true,
        }
    }
}

/// Which host namespaces the sandbox joins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostNamespaces {
    pub network: bool,
    pub ipc: bool,
    pub pid: bool,
}

/// Per-kind decisions for one sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespacePlan {
    /// Entries dropped from the runtime spec so the process joins the host's namespace
    pub removed: Vec<NamespaceKind>,
    /// Kinds this system creates and tears down
    pub managed: Vec<NamespaceKind>,
}

impl NamespacePlan {
    pub fn manages(&self, kind: NamespaceKind) -> bool {
        self.managed.contains(&kind)
    }
}
