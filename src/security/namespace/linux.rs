/*!
 * Linux Namespace Pinning
 * Fresh namespaces created on a helper thread and kept alive by bind mounts
 */

use super::traits::NamespacePinner;
use super::types::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(target_os = "linux")]
use nix::mount::{mount, umount2, MntFlags, MsFlags};
#[cfg(target_os = "linux")]
use nix::sched::{unshare, CloneFlags};

/// Pins namespaces under `<dir>/<kind>ns/<sandbox id>`
#[derive(Debug, Clone)]
pub struct ThreadPinner {
    namespaces_dir: PathBuf,
}

impl ThreadPinner {
    pub fn new(namespaces_dir: impl Into<PathBuf>) -> Self {
        let namespaces_dir = namespaces_dir.into();
        info!(dir = %namespaces_dir.display(), "Namespace pinner initialized (Linux)");
        Self { namespaces_dir }
    }

    /// Whether the host can create namespaces at all
    pub fn is_supported() -> bool {
        cfg!(target_os = "linux") && Path::new("/proc/thread-self/ns").exists()
    }

    fn pin_path(&self, kind: NamespaceKind, sandbox_id: &str) -> PathBuf {
        pin_path(&self.namespaces_dir, kind, sandbox_id)
    }

    #[cfg(target_os = "linux")]
    fn pin_one(&self, kind: NamespaceKind, path: &Path) -> NamespaceResult<()> {
        let flag = match kind {
            NamespaceKind::Network => CloneFlags::CLONE_NEWNET,
            NamespaceKind::Ipc => CloneFlags::CLONE_NEWIPC,
            NamespaceKind::Uts => CloneFlags::CLONE_NEWUTS,
            NamespaceKind::Pid | NamespaceKind::User => {
                return Err(NamespaceError::Unsupported(kind));
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(path)?;

        let pin_err = |reason: String| NamespaceError::Pin {
            kind,
            path: path.to_path_buf(),
            reason,
        };

        // unshare only affects the calling thread, so the helper thread takes
        // the new namespace with it when it exits; the bind mount keeps it alive
        let target = path.to_path_buf();
        let result = std::thread::spawn(move || -> Result<(), String> {
            unshare(flag).map_err(|e| format!("unshare: {}", e))?;
            let source = format!("/proc/thread-self/ns/{}", kind.proc_name());
            mount(
                Some(source.as_str()),
                &target,
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|e| format!("bind mount {}: {}", source, e))
        })
        .join()
        .map_err(|_| pin_err("pinning thread panicked".to_string()))?;

        if let Err(reason) = result {
            let _ = std::fs::remove_file(path);
            return Err(pin_err(reason));
        }

        debug!(%kind, path = %path.display(), "namespace pinned");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn pin_one(&self, kind: NamespaceKind, _path: &Path) -> NamespaceResult<()> {
        Err(NamespaceError::Unsupported(kind))
    }

    #[cfg(target_os = "linux")]
    fn unpin_one(&self, ns: &ManagedNamespace) -> NamespaceResult<()> {
        match umount2(&ns.path, MntFlags::MNT_DETACH) {
            Ok(()) | Err(nix::errno::Errno::EINVAL) | Err(nix::errno::Errno::ENOENT) => {}
            Err(e) => {
                return Err(NamespaceError::Teardown(format!(
                    "unmount {}: {}",
                    ns.path.display(),
                    e
                )))
            }
        }
        remove_pin_file(&ns.path)
    }

    #[cfg(not(target_os = "linux"))]
    fn unpin_one(&self, ns: &ManagedNamespace) -> NamespaceResult<()> {
        remove_pin_file(&ns.path)
    }
}

impl NamespacePinner for ThreadPinner {
    fn pin(
        &self,
        sandbox_id: &str,
        kinds: &[NamespaceKind],
    ) -> NamespaceResult<Vec<ManagedNamespace>> {
        let mut pinned = Vec::with_capacity(kinds.len());

        for &kind in kinds {
            let path = self.pin_path(kind, sandbox_id);
            if let Err(e) = self.pin_one(kind, &path) {
                if let Err(cleanup) = self.unpin(&pinned) {
                    warn!(error = %cleanup, "failed to release partially pinned namespaces");
                }
                return Err(e);
            }
            pinned.push(ManagedNamespace::owned(kind, path));
        }

        info!(sandbox = sandbox_id, count = pinned.len(), "namespaces pinned");
        Ok(pinned)
    }

    fn unpin(&self, namespaces: &[ManagedNamespace]) -> NamespaceResult<()> {
        let errors: Vec<String> = namespaces
            .iter()
            .filter(|ns| ns.owned && !ns.path.as_os_str().is_empty())
            .filter_map(|ns| self.unpin_one(ns).err().map(|e| e.to_string()))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NamespaceError::Teardown(errors.join("; ")))
        }
    }
}

pub(super) fn pin_path(dir: &Path, kind: NamespaceKind, sandbox_id: &str) -> PathBuf {
    dir.join(format!("{}ns", kind.proc_name())).join(sandbox_id)
}

fn remove_pin_file(path: &Path) -> NamespaceResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
