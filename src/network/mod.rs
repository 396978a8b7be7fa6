/*!
 * Pod Networking
 * Attach and detach sandboxes to the pod network
 */

mod loopback;
mod simulation;

pub use loopback::LoopbackNetwork;
pub use simulation::SimulationNetwork;

use crate::sandbox::Sandbox;
use thiserror::Error;

/// Network operation result
pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("network setup failed: {0}")]
    Setup(String),

    #[error("network teardown failed: {0}")]
    Teardown(String),

    #[error("sandbox {0} is not attached")]
    NotAttached(String),
}

/// Outcome of attaching a sandbox
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkAttachment {
    /// Assigned addresses, primary first
    pub ips: Vec<String>,
    /// Plug-in result document, annotated on the sandbox when present
    pub result: Option<serde_json::Value>,
}

/// Network collaborator
#[cfg_attr(test, mockall::automock)]
pub trait NetworkManager: Send + Sync {
    fn attach(&self, sandbox: &Sandbox) -> NetworkResult<NetworkAttachment>;

    fn detach(&self, sandbox: &Sandbox) -> NetworkResult<()>;
}
