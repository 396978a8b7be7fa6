/*!
 * Storage Fault Injection
 */

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wraps a storage service and fails selected operations on demand
pub struct FaultyStorage<S> {
    inner: S,
    fail_create: Arc<AtomicBool>,
    fail_remove: Arc<AtomicBool>,
    fail_start: Arc<AtomicBool>,
}

impl<S: StorageService> FaultyStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_create: Arc::new(AtomicBool::new(false)),
            fail_remove: Arc::new(AtomicBool::new(false)),
            fail_start: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }
}

fn injected(flag: &AtomicBool, op: &str) -> StorageResult<()> {
    if flag.load(Ordering::SeqCst) {
        return Err(StorageError::Backend(format!("injected {} failure", op)));
    }
    Ok(())
}

impl<S: StorageService> StorageService for FaultyStorage<S> {
    fn create_pod_sandbox(&self, request: &SandboxStorageRequest) -> StorageResult<ContainerInfo> {
        injected(&self.fail_create, "create")?;
        self.inner.create_pod_sandbox(request)
    }

    fn remove_pod_sandbox(&self, id: &str) -> StorageResult<()> {
        injected(&self.fail_remove, "remove")?;
        self.inner.remove_pod_sandbox(id)
    }

    fn start_container(&self, id: &str) -> StorageResult<PathBuf> {
        injected(&self.fail_start, "start")?;
        self.inner.start_container(id)
    }
}
