/*!
 * Mounts
 * tmpfs mounting and detached unmounting behind a trait
 */

mod linux;
mod simulation;

pub use linux::HostMounter;
pub use simulation::SimulationMounter;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Mount operation result
pub type MountResult<T> = Result<T, MountError>;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("failed to mount {kind} at {target:?}: {reason}")]
    Mount {
        kind: &'static str,
        target: PathBuf,
        reason: String,
    },

    #[error("failed to unmount {target:?}: {reason}")]
    Unmount { target: PathBuf, reason: String },

    #[error("failed to prepare {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Mount flags used for sandbox tmpfs mounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TmpfsFlags {
    pub noexec: bool,
    pub nosuid: bool,
    pub nodev: bool,
}

impl TmpfsFlags {
    pub fn hardened() -> Self {
        Self {
            noexec: true,
            nosuid: true,
            nodev: true,
        }
    }
}

/// Host mount primitives
pub trait Mounter: Send + Sync {
    /// Mount a tmpfs named `source` at an existing directory
    fn mount_tmpfs(
        &self,
        source: &str,
        target: &Path,
        flags: TmpfsFlags,
        data: &str,
    ) -> MountResult<()>;

    /// Lazily detach whatever is mounted at `target`
    fn unmount_detached(&self, target: &Path) -> MountResult<()>;
}
