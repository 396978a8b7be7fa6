/*!
 * Host Mounts
 */

use super::*;
use tracing::debug;

#[cfg(target_os = "linux")]
use nix::mount::{mount, umount2, MntFlags, MsFlags};

/// Mounter issuing real mount(2) calls
#[derive(Debug, Clone, Default)]
pub struct HostMounter;

impl HostMounter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl Mounter for HostMounter {
    fn mount_tmpfs(
        &self,
        source: &str,
        target: &Path,
        flags: TmpfsFlags,
        data: &str,
    ) -> MountResult<()> {
        let mut ms = MsFlags::empty();
        ms.set(MsFlags::MS_NOEXEC, flags.noexec);
        ms.set(MsFlags::MS_NOSUID, flags.nosuid);
        ms.set(MsFlags::MS_NODEV, flags.nodev);

        mount(Some(source), target, Some("tmpfs"), ms, Some(data)).map_err(|e| {
            MountError::Mount {
                kind: "tmpfs",
                target: target.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        debug!(target = %target.display(), data, "tmpfs mounted");
        Ok(())
    }

    fn unmount_detached(&self, target: &Path) -> MountResult<()> {
        umount2(target, MntFlags::MNT_DETACH).map_err(|e| MountError::Unmount {
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(target = %target.display(), "unmounted (detached)");
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl Mounter for HostMounter {
    fn mount_tmpfs(
        &self,
        _source: &str,
        target: &Path,
        _flags: TmpfsFlags,
        _data: &str,
    ) -> MountResult<()> {
        Err(MountError::Mount {
            kind: "tmpfs",
            target: target.to_path_buf(),
            reason: "mounts require Linux".to_string(),
        })
    }

    fn unmount_detached(&self, target: &Path) -> MountResult<()> {
        Err(MountError::Unmount {
            target: target.to_path_buf(),
            reason: "mounts require Linux".to_string(),
        })
    }
}
