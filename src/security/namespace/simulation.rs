/*!
 * Simulation Namespace Pinning
 * In-memory pinning with failure injection, no OS-level isolation
 */

use super::linux::pin_path;
use super::traits::*;
use super::types::*;
use ahash::RandomState;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Simulation pinner tracking "live" namespaces by path
#[derive(Clone)]
pub struct SimulationPinner {
    namespaces_dir: PathBuf,
    pinned: Arc<DashMap<PathBuf, NamespaceKind, RandomState>>,
    fail_pin: Arc<AtomicBool>,
    fail_unpin: Arc<AtomicBool>,
}

impl SimulationPinner {
    pub fn new(namespaces_dir: impl Into<PathBuf>) -> Self {
        info!("Namespace pinner initialized (simulation mode)");
        Self {
            namespaces_dir: namespaces_dir.into(),
            pinned: Arc::new(DashMap::with_hasher(RandomState::new())),
            fail_pin: Arc::new(AtomicBool::new(false)),
            fail_unpin: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make subsequent `pin` calls fail
    pub fn fail_pin(&self, fail: bool) {
        self.fail_pin.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `unpin` calls fail after releasing nothing
    pub fn fail_unpin(&self, fail: bool) {
        self.fail_unpin.store(fail, Ordering::SeqCst);
    }

    pub fn pinned_count(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_pinned(&self, path: &std::path::Path) -> bool {
        self.pinned.contains_key(path)
    }
}

impl NamespacePinner for SimulationPinner {
    fn pin(
        &self,
        sandbox_id: &str,
        kinds: &[NamespaceKind],
    ) -> NamespaceResult<Vec<ManagedNamespace>> {
        if let Some(&kind) = kinds
            .iter()
            .find(|k| matches!(k, NamespaceKind::Pid | NamespaceKind::User))
        {
            return Err(NamespaceError::Unsupported(kind));
        }

        if self.fail_pin.load(Ordering::SeqCst) {
            let kind = kinds.first().copied().unwrap_or(NamespaceKind::Network);
            return Err(NamespaceError::Pin {
                kind,
                path: pin_path(&self.namespaces_dir, kind, sandbox_id),
                reason: "injected failure".to_string(),
            });
        }

        let namespaces: Vec<ManagedNamespace> = kinds
            .iter()
            .map(|&kind| {
                let path = pin_path(&self.namespaces_dir, kind, sandbox_id);
                self.pinned.insert(path.clone(), kind);
                ManagedNamespace::owned(kind, path)
            })
            .collect();

        Ok(namespaces)
    }

    fn unpin(&self, namespaces: &[ManagedNamespace]) -> NamespaceResult<()> {
        if self.fail_unpin.load(Ordering::SeqCst) {
            return Err(NamespaceError::Teardown("injected failure".to_string()));
        }
        for ns in namespaces {
            self.pinned.remove(&ns.path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_and_unpin() {
        let pinner = SimulationPinner::new("/var/run");
        let pinned = pinner
            .pin("abc", &[NamespaceKind::Network, NamespaceKind::Uts])
            .unwrap();
        assert_eq!(pinner.pinned_count(), 2);
        assert!(pinner.is_pinned(&PathBuf::from("/var/run/netns/abc")));

        pinner.unpin(&pinned).unwrap();
        assert_eq!(pinner.pinned_count(), 0);
    }

    #[test]
    fn test_pid_unsupported() {
        let pinner = SimulationPinner::new("/var/run");
        let err = pinner.pin("abc", &[NamespaceKind::Pid]).unwrap_err();
        assert!(matches!(err, NamespaceError::Unsupported(NamespaceKind::Pid)));
        assert_eq!(pinner.pinned_count(), 0);
    }
}
