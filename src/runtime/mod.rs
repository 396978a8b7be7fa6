/*!
 * Process Runtime
 * Create, start, stop, wait for and delete infra processes
 */

mod oci;
mod simulation;

pub use oci::OciRuntime;
pub use simulation::{RuntimeOp, SimulationRuntime};

use crate::sandbox::InfraContainer;
use std::time::Duration;
use thiserror::Error;

/// Runtime operation result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("{op} failed: {reason}")]
    Command { op: &'static str, reason: String },

    #[error("timed out after {0:?} waiting for container to stop")]
    Timeout(Duration),

    #[error("container {0} not found")]
    NotFound(String),

    #[error("unknown runtime handler {0:?}")]
    UnknownHandler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Low-level process runtime
pub trait ContainerRuntime: Send + Sync {
    /// Create OS-level resources for the container under `cgroup_parent`
    fn create_container(&self, container: &InfraContainer, cgroup_parent: &str)
        -> RuntimeResult<()>;

    fn start_container(&self, container: &InfraContainer) -> RuntimeResult<()>;

    /// Ask the process to stop, killing it after `timeout`
    fn stop_container(&self, container: &InfraContainer, timeout: Duration) -> RuntimeResult<()>;

    fn wait_stopped(&self, container: &InfraContainer) -> RuntimeResult<()>;

    fn delete_container(&self, container: &InfraContainer) -> RuntimeResult<()>;
}
