/*!
 * Loopback Network
 * Network manager for hosts without a pod network plug-in
 */

use super::*;
use ahash::RandomState;
use dashmap::DashSet;
use serde_json::json;
use tracing::{debug, info};

/// Sandboxes only get their loopback interface; no addresses are assigned
pub struct LoopbackNetwork {
    attached: DashSet<String, RandomState>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        info!("Network manager initialized (loopback only)");
        Self {
            attached: DashSet::with_hasher(RandomState::new()),
        }
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attached.contains(id)
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkManager for LoopbackNetwork {
    fn attach(&self, sandbox: &Sandbox) -> NetworkResult<NetworkAttachment> {
        let netns = sandbox.netns_path().unwrap_or_default();
        self.attached.insert(sandbox.id().to_string());
        debug!(sandbox = sandbox.id(), netns = %netns.display(), "loopback network attached");

        Ok(NetworkAttachment {
            ips: Vec::new(),
            result: Some(json!({
                "cniVersion": "0.4.0",
                "interfaces": [{ "name": "lo", "sandbox": netns.to_string_lossy() }],
                "ips": [],
            })),
        })
    }

    fn detach(&self, sandbox: &Sandbox) -> NetworkResult<()> {
        self.attached
            .remove(sandbox.id())
            .map(|_| ())
            .ok_or_else(|| NetworkError::NotAttached(sandbox.id().to_string()))
    }
}
