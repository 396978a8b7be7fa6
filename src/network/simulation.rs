/*!
 * Simulation Network
 * Sequential address assignment with failure injection
 */

use super::*;
use ahash::RandomState;
use dashmap::DashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Assigns 10.88.x.y addresses and remembers who holds them
pub struct SimulationNetwork {
    attached: DashMap<String, Vec<String>, RandomState>,
    next_host: AtomicU32,
    fail_attach: AtomicBool,
    fail_detach: AtomicBool,
}

impl SimulationNetwork {
    pub fn new() -> Self {
        Self {
            attached: DashMap::with_hasher(RandomState::new()),
            next_host: AtomicU32::new(2),
            fail_attach: AtomicBool::new(false),
            fail_detach: AtomicBool::new(false),
        }
    }

    pub fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    pub fn fail_detach(&self, fail: bool) {
        self.fail_detach.store(fail, Ordering::SeqCst);
    }

    pub fn is_attached(&self, id: &str) -> bool {
        self.attached.contains_key(id)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

impl Default for SimulationNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkManager for SimulationNetwork {
    fn attach(&self, sandbox: &Sandbox) -> NetworkResult<NetworkAttachment> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(NetworkError::Setup("injected failure".to_string()));
        }

        let host = self.next_host.fetch_add(1, Ordering::SeqCst);
        let ip = Ipv4Addr::from(u32::from(Ipv4Addr::new(10, 88, 0, 0)) + host).to_string();
        self.attached
            .insert(sandbox.id().to_string(), vec![ip.clone()]);

        Ok(NetworkAttachment {
            ips: vec![ip.clone()],
            result: Some(serde_json::json!({
                "cniVersion": "0.4.0",
                "ips": [{ "version": "4", "address": format!("{}/16", ip) }],
            })),
        })
    }

    fn detach(&self, sandbox: &Sandbox) -> NetworkResult<()> {
        if self.fail_detach.load(Ordering::SeqCst) {
            return Err(NetworkError::Teardown("injected failure".to_string()));
        }
        self.attached
            .remove(sandbox.id())
            .map(|_| ())
            .ok_or_else(|| NetworkError::NotAttached(sandbox.id().to_string()))
    }
}
