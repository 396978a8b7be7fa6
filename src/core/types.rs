/*!
 * Core Types
 * Common types used across the sandbox runtime
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pod sandbox identifier (64 lowercase hex characters)
pub type SandboxId = String;

/// Length of the short id form used for default hostnames
pub const SHORT_ID_LEN: usize = 12;

/// Minimum memory ceiling a pod cgroup may carry (4 MiB)
pub const MIN_MEMORY_LIMIT: i64 = 4 * 1024 * 1024;

/// OOM score adjustment for the infra process
pub const INFRA_OOM_SCORE_ADJ: i32 = -998;

/// CPU shares for the infra process
pub const INFRA_CPU_SHARES: u64 = 2;

/// Grace period for stopping the infra process during unwind
pub const INFRA_STOP_TIMEOUT_SECS: u64 = 10;

/// Name of the infra container as seen by the node agent
pub const POD_INFRA_CONTAINER_NAME: &str = "POD";

/// Lifecycle state of a sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Provisioning in progress
    Configuring,
    /// Infra process running, all wiring done
    Created,
    Stopped,
    Removed,
}

impl SandboxState {
    /// Whether the transition `self -> next` is allowed
    pub fn can_transition_to(self, next: SandboxState) -> bool {
        matches!(
            (self, next),
            (SandboxState::Configuring, SandboxState::Created)
                | (SandboxState::Created, SandboxState::Stopped)
                | (SandboxState::Created, SandboxState::Removed)
                | (SandboxState::Stopped, SandboxState::Removed)
        )
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SandboxState::Configuring => "configuring",
            SandboxState::Created => "created",
            SandboxState::Stopped => "stopped",
            SandboxState::Removed => "removed",
        };
        f.write_str(s)
    }
}
