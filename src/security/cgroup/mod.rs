/*!
 * Cgroup Placement
 * Parent-path resolution for systemd and cgroupfs managers
 */

mod resolver;
mod systemd;

pub use resolver::{CgroupPlacement, CgroupResolver};
pub use systemd::{expand_slice, is_slice_name, SLICE_SUFFIX};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for cgroup operations
pub type CgroupResult<T> = Result<T, CgroupError>;

/// Scope component used in every infra cgroup path
pub const SCOPE_PREFIX: &str = "crio";

const CGROUP_ROOT: &str = "/sys/fs/cgroup";

#[derive(Error, Debug)]
pub enum CgroupError {
    #[error("configured with systemd cgroup manager, but did not receive slice as parent: {0}")]
    NotASlice(String),

    #[error("configured with cgroupfs cgroup manager, but received systemd slice as parent: {0}")]
    SliceAsCgroupfsParent(String),

    #[error("invalid slice name {slice:?}: {reason}")]
    InvalidSlice { slice: String, reason: &'static str },

    #[error("pod set memory limit {limit} too low; should be at least {min}")]
    MemoryLimitTooLow { limit: i64, min: i64 },

    #[error("error converting cgroup memory value {value:?} from {path:?} to an integer")]
    InvalidMemoryValue { path: PathBuf, value: String },

    #[error("error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CgroupError {
    /// Whether the error rejects the request rather than reporting host state
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CgroupError::NotASlice(_)
                | CgroupError::SliceAsCgroupfsParent(_)
                | CgroupError::InvalidSlice { .. }
                | CgroupError::MemoryLimitTooLow { .. }
        )
    }
}

/// Cgroup hierarchy layout of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupMode {
    /// cgroup v2
    Unified,
    /// cgroup v1
    Legacy,
}

impl CgroupMode {
    /// Detect the layout from the host's cgroup mount
    pub fn detect() -> Self {
        Self::detect_at(CGROUP_ROOT)
    }

    pub fn detect_at(root: impl AsRef<Path>) -> Self {
        if root.as_ref().join("cgroup.controllers").exists() {
            CgroupMode::Unified
        } else {
            CgroupMode::Legacy
        }
    }

    /// Directory the memory controller is mounted at
    pub fn mount_root(self) -> PathBuf {
        match self {
            CgroupMode::Unified => PathBuf::from(CGROUP_ROOT),
            CgroupMode::Legacy => Path::new(CGROUP_ROOT).join("memory"),
        }
    }

    /// File carrying a cgroup's memory ceiling
    pub fn memory_limit_file(self) -> &'static str {
        match self {
            CgroupMode::Unified => "memory.max",
            CgroupMode::Legacy => "memory.limit_in_bytes",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_mode() {
        let dir = TempDir::new().unwrap();
        assert_eq!(CgroupMode::detect_at(dir.path()), CgroupMode::Legacy);

        std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory\n").unwrap();
        assert_eq!(CgroupMode::detect_at(dir.path()), CgroupMode::Unified);
    }

    #[test]
    fn test_mode_files() {
        assert_eq!(CgroupMode::Unified.memory_limit_file(), "memory.max");
        assert_eq!(CgroupMode::Legacy.memory_limit_file(), "memory.limit_in_bytes");
        assert_eq!(
            CgroupMode::Legacy.mount_root(),
            PathBuf::from("/sys/fs/cgroup/memory")
        );
    }

    #[test]
    fn test_validation_classes() {
        assert!(CgroupError::NotASlice("foo".into()).is_validation());
        assert!(CgroupError::MemoryLimitTooLow { limit: 1, min: 2 }.is_validation());
        let io = CgroupError::Io {
            path: PathBuf::from("/x"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!io.is_validation());
    }
}
