/*!
 * Simulation Runtime
 * In-memory process table with failure injection
 */

use super::*;
use crate::sandbox::ContainerStatus;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

#[derive(Default)]
struct Faults {
    create: AtomicBool,
    start: AtomicBool,
    stop: AtomicBool,
    wait: AtomicBool,
    delete: AtomicBool,
}

/// Runtime tracking simulated processes by container id
pub struct SimulationRuntime {
    processes: DashMap<String, ContainerStatus, RandomState>,
    next_pid: AtomicI32,
    faults: Faults,
}

/// Operation to fail in the simulation runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeOp {
    Create,
    Start,
    Stop,
    Wait,
    Delete,
}

impl SimulationRuntime {
    pub fn new() -> Self {
        Self {
            processes: DashMap::with_hasher(RandomState::new()),
            next_pid: AtomicI32::new(1000),
            faults: Faults::default(),
        }
    }

    pub fn fail(&self, op: RuntimeOp, fail: bool) {
        let flag = match op {
            RuntimeOp::Create => &self.faults.create,
            RuntimeOp::Start => &self.faults.start,
            RuntimeOp::Stop => &self.faults.stop,
            RuntimeOp::Wait => &self.faults.wait,
            RuntimeOp::Delete => &self.faults.delete,
        };
        flag.store(fail, Ordering::SeqCst);
    }

    /// Number of simulated processes currently running
    pub fn running_count(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| *p.value() == ContainerStatus::Running)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.processes.contains_key(id)
    }

    pub fn status(&self, id: &str) -> Option<ContainerStatus> {
        self.processes.get(id).map(|s| *s.value())
    }

    fn check(&self, flag: &AtomicBool, op: &'static str) -> RuntimeResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(RuntimeError::Command {
                op,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn transition(
        &self,
        container: &InfraContainer,
        status: ContainerStatus,
    ) -> RuntimeResult<()> {
        let mut entry = self
            .processes
            .get_mut(container.id())
            .ok_or_else(|| RuntimeError::NotFound(container.id().to_string()))?;
        *entry.value_mut() = status;
        let pid = container.pid();
        drop(entry);
        container.set_status(status, pid.filter(|_| status != ContainerStatus::Stopped));
        Ok(())
    }
}

impl Default for SimulationRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for SimulationRuntime {
    fn create_container(&self, container: &InfraContainer, _cgroup_parent: &str) -> RuntimeResult<()> {
        self.check(&self.faults.create, "create")?;
        self.processes
            .insert(container.id().to_string(), ContainerStatus::Created);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        container.set_status(ContainerStatus::Created, Some(pid));
        Ok(())
    }

    fn start_container(&self, container: &InfraContainer) -> RuntimeResult<()> {
        self.check(&self.faults.start, "start")?;
        self.transition(container, ContainerStatus::Running)
    }

    fn stop_container(&self, container: &InfraContainer, _timeout: Duration) -> RuntimeResult<()> {
        self.check(&self.faults.stop, "stop")?;
        self.transition(container, ContainerStatus::Stopped)
    }

    fn wait_stopped(&self, container: &InfraContainer) -> RuntimeResult<()> {
        self.check(&self.faults.wait, "wait")?;
        match self.status(container.id()) {
            Some(ContainerStatus::Stopped) | None => Ok(()),
            Some(_) => Err(RuntimeError::Timeout(Duration::ZERO)),
        }
    }

    fn delete_container(&self, container: &InfraContainer) -> RuntimeResult<()> {
        self.check(&self.faults.delete, "delete")?;
        self.processes
            .remove(container.id())
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(container.id().to_string()))
    }
}
