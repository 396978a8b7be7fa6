/*!
 * Shared Memory
 * Per-sandbox /dev/shm provisioning
 */

use crate::core::guard::CompensationStack;
use crate::mount::{MountError, MountResult, Mounter, TmpfsFlags};
use crate::security::label::format_mount_label;
use anyhow::Context;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Host shared-memory path, reused when the sandbox shares host IPC
pub const DEV_SHM_PATH: &str = "/dev/shm";

/// Size of a fresh sandbox shm mount (64 MiB)
pub const DEFAULT_SHM_SIZE: u64 = 64 * 1024 * 1024;

/// Creates the shared-memory mount a sandbox's containers bind in
#[derive(Clone)]
pub struct ShmProvisioner {
    mounter: Arc<dyn Mounter>,
}

impl ShmProvisioner {
    pub fn new(mounter: Arc<dyn Mounter>) -> Self {
        Self { mounter }
    }

    /// Return the shm path for a sandbox, mounting a fresh tmpfs if needed
    ///
    /// Host IPC reuses [`DEV_SHM_PATH`] and registers nothing. Otherwise a
    /// labeled tmpfs is mounted at `<run_dir>/shm` and a detached unmount is
    /// pushed onto `stack`.
    pub fn provision<'a>(
        &self,
        run_dir: &Path,
        host_ipc: bool,
        mount_label: &str,
        stack: &mut CompensationStack<'a>,
    ) -> MountResult<PathBuf> {
        if host_ipc {
            return Ok(PathBuf::from(DEV_SHM_PATH));
        }

        let shm_path = run_dir.join("shm");
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&shm_path)
            .map_err(|source| MountError::Io {
                path: shm_path.clone(),
                source,
            })?;

        let data = format_mount_label(&shm_options(), mount_label);
        self.mounter
            .mount_tmpfs("shm", &shm_path, TmpfsFlags::hardened(), &data)?;
        debug!(path = %shm_path.display(), "mounted sandbox shm");

        let mounter = Arc::clone(&self.mounter);
        let target = shm_path.clone();
        stack.push("unmount shm", move || {
            mounter
                .unmount_detached(&target)
                .with_context(|| format!("unmounting shm at {}", target.display()))
        });

        Ok(shm_path)
    }
}

fn shm_options() -> String {
    format!("mode=1777,size={}", DEFAULT_SHM_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::SimulationMounter;
    use tempfile::TempDir;

    #[test]
    fn test_host_ipc_reuses_dev_shm() {
        let mounter = Arc::new(SimulationMounter::new());
        let shm = ShmProvisioner::new(mounter.clone());
        let mut stack = CompensationStack::new();

        let path = shm
            .provision(Path::new("/nonexistent"), true, "", &mut stack)
            .unwrap();
        assert_eq!(path, PathBuf::from(DEV_SHM_PATH));
        assert!(stack.is_empty());
        assert_eq!(mounter.mount_count(), 0);
    }

    #[test]
    fn test_fresh_mount_and_unwind() {
        let dir = TempDir::new().unwrap();
        let mounter = Arc::new(SimulationMounter::new());
        let shm = ShmProvisioner::new(mounter.clone());
        let mut stack = CompensationStack::new();

        let path = shm
            .provision(dir.path(), false, "system_u:object_r:container_file_t:s0:c1,c2", &mut stack)
            .unwrap();
        assert_eq!(path, dir.path().join("shm"));

        let mount = mounter.get(&path).unwrap();
        assert_eq!(mount.source, "shm");
        assert_eq!(mount.flags, TmpfsFlags::hardened());
        assert_eq!(
            mount.data,
            "mode=1777,size=67108864,context=\"system_u:object_r:container_file_t:s0:c1,c2\""
        );

        let report = stack.unwind();
        assert!(report.is_clean());
        assert!(!mounter.is_mounted(&path));
    }

    #[test]
    fn test_mount_failure_registers_nothing() {
        let dir = TempDir::new().unwrap();
        let mounter = Arc::new(SimulationMounter::new());
        mounter.fail_mount(true);
        let shm = ShmProvisioner::new(mounter);
        let mut stack = CompensationStack::new();

        assert!(shm.provision(dir.path(), false, "", &mut stack).is_err());
        assert!(stack.is_empty());
    }
}
