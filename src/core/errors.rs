/*!
 * Error Types
 * Provisioning error taxonomy with thiserror and miette diagnostics
 */

use crate::mount::MountError;
use crate::network::NetworkError;
use crate::registry::RegistryError;
use crate::runtime::RuntimeError;
use crate::sandbox::dns::DnsError;
use crate::sandbox::SandboxError;
use crate::security::cgroup::CgroupError;
use crate::security::label::LabelError;
use crate::security::namespace::NamespaceError;
use crate::security::seccomp::SeccompError;
use crate::spec::SpecError;
use crate::storage::StorageError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Coarse failure classes callers can act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Duplicate name or id; retry with a different name
    Conflict,
    /// Request or configuration rejected; never retried
    Validation,
    /// An external collaborator failed
    Collaborator,
    /// Local I/O, serialization or state bookkeeping failed
    Internal,
}

/// Error returned by the provisioning pipeline
///
/// Identifies the cause of the first failing step. Failures of compensating
/// actions during unwind are only logged and never surface here.
#[derive(Error, Debug, Diagnostic)]
pub enum ProvisionError {
    #[error("{0}")]
    #[diagnostic(
        code(sandbox::reservation_conflict),
        help("Another sandbox holds this name or id. Retry with a new attempt number.")
    )]
    Reservation(#[from] RegistryError),

    #[error("pod sandbox with name {0:?} already exists")]
    #[diagnostic(
        code(sandbox::already_exists),
        help("Storage already holds a sandbox with this name. Remove it before retrying.")
    )]
    AlreadyExists(String),

    #[error("invalid sandbox request: {0}")]
    #[diagnostic(
        code(sandbox::validation),
        help("The request or runtime configuration was rejected. Fix it and resubmit.")
    )]
    Validation(String),

    #[error("cgroup placement failed: {0}")]
    #[diagnostic(code(sandbox::cgroup))]
    Cgroup(#[from] CgroupError),

    #[error("namespace configuration failed: {0}")]
    #[diagnostic(code(sandbox::namespace))]
    Namespace(#[from] NamespaceError),

    #[error("{operation} failed for sandbox {id}: {source}")]
    #[diagnostic(code(sandbox::storage))]
    Storage {
        operation: &'static str,
        id: String,
        #[source]
        source: StorageError,
    },

    #[error("{operation} failed for sandbox {id}: {source}")]
    #[diagnostic(code(sandbox::network))]
    Network {
        operation: &'static str,
        id: String,
        #[source]
        source: NetworkError,
    },

    #[error("{operation} failed for sandbox {id}: {source}")]
    #[diagnostic(code(sandbox::runtime))]
    Runtime {
        operation: &'static str,
        id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("relabeling {path:?} failed: {source}")]
    #[diagnostic(code(sandbox::label))]
    Label {
        path: PathBuf,
        #[source]
        source: LabelError,
    },

    #[error("resolver configuration failed: {0}")]
    #[diagnostic(code(sandbox::dns))]
    Dns(#[from] DnsError),

    #[error("seccomp profile selection failed: {0}")]
    #[diagnostic(
        code(sandbox::seccomp),
        help("Use unconfined, runtime/default or localhost/<absolute path>.")
    )]
    Seccomp(#[from] SeccompError),

    #[error("mount failed: {0}")]
    #[diagnostic(code(sandbox::mount))]
    Mount(#[from] MountError),

    #[error("runtime spec error: {0}")]
    #[diagnostic(code(sandbox::spec))]
    Spec(#[from] SpecError),

    #[error("sandbox state error: {0}")]
    #[diagnostic(code(sandbox::state))]
    Sandbox(#[from] SandboxError),

    #[error("{context}: {source}")]
    #[diagnostic(
        code(sandbox::io),
        help("Filesystem operation failed. Check permissions and disk space.")
    )]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    #[diagnostic(code(sandbox::serialization))]
    Serialization {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProvisionError {
    /// Classify the error for callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Reservation(_) | ProvisionError::AlreadyExists(_) => {
                ErrorKind::Conflict
            }
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::Cgroup(e) if e.is_validation() => ErrorKind::Validation,
            ProvisionError::Namespace(NamespaceError::InvalidConfig(_)) => ErrorKind::Validation,
            ProvisionError::Dns(e) if e.is_validation() => ErrorKind::Validation,
            ProvisionError::Seccomp(e) if e.is_validation() => ErrorKind::Validation,
            ProvisionError::Namespace(_)
            | ProvisionError::Storage { .. }
            | ProvisionError::Network { .. }
            | ProvisionError::Runtime { .. }
            | ProvisionError::Label { .. }
            | ProvisionError::Mount(_) => ErrorKind::Collaborator,
            ProvisionError::Cgroup(_)
            | ProvisionError::Dns(_)
            | ProvisionError::Seccomp(_)
            | ProvisionError::Spec(_)
            | ProvisionError::Sandbox(_)
            | ProvisionError::Io { .. }
            | ProvisionError::Serialization { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ProvisionError::Validation(msg.into())
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let conflict = ProvisionError::AlreadyExists("k8s_web_default_u1_0".into());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let invalid = ProvisionError::validation("relative log directory");
        assert_eq!(invalid.kind(), ErrorKind::Validation);

        let mismatch = ProvisionError::Cgroup(CgroupError::NotASlice("foo".into()));
        assert_eq!(mismatch.kind(), ErrorKind::Validation);

        let storage = ProvisionError::Storage {
            operation: "create sandbox storage",
            id: "abc".into(),
            source: StorageError::Backend("disk full".into()),
        };
        assert_eq!(storage.kind(), ErrorKind::Collaborator);
        assert!(storage.to_string().contains("disk full"));
    }
}
