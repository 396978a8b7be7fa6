/*!
 * Simulation Mounts
 * Records mounts in memory so tests can check for leaks
 */

use super::*;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A recorded tmpfs mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedMount {
    pub source: String,
    pub flags: TmpfsFlags,
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct SimulationMounter {
    mounts: Arc<DashMap<PathBuf, SimulatedMount, RandomState>>,
    fail_mount: Arc<AtomicBool>,
}

impl SimulationMounter {
    pub fn new() -> Self {
        Self {
            mounts: Arc::new(DashMap::with_hasher(RandomState::new())),
            fail_mount: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_mount(&self, fail: bool) {
        self.fail_mount.store(fail, Ordering::SeqCst);
    }

    pub fn is_mounted(&self, target: &Path) -> bool {
        self.mounts.contains_key(target)
    }

    pub fn get(&self, target: &Path) -> Option<SimulatedMount> {
        self.mounts.get(target).map(|m| m.value().clone())
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }
}

impl Default for SimulationMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Mounter for SimulationMounter {
    fn mount_tmpfs(
        &self,
        source: &str,
        target: &Path,
        flags: TmpfsFlags,
        data: &str,
    ) -> MountResult<()> {
        if self.fail_mount.load(Ordering::SeqCst) {
            return Err(MountError::Mount {
                kind: "tmpfs",
                target: target.to_path_buf(),
                reason: "injected failure".to_string(),
            });
        }
        if !target.is_dir() {
            return Err(MountError::Mount {
                kind: "tmpfs",
                target: target.to_path_buf(),
                reason: "mount point does not exist".to_string(),
            });
        }
        self.mounts.insert(
            target.to_path_buf(),
            SimulatedMount {
                source: source.to_string(),
                flags,
                data: data.to_string(),
            },
        );
        Ok(())
    }

    fn unmount_detached(&self, target: &Path) -> MountResult<()> {
        self.mounts
            .remove(target)
            .map(|_| ())
            .ok_or_else(|| MountError::Unmount {
                target: target.to_path_buf(),
                reason: "not mounted".to_string(),
            })
    }
}
