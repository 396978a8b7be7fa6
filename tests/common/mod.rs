/*!
 * Shared Test Harness
 * A server wired to simulated collaborators under a temporary root
 */

#![allow(dead_code)]

use pod_sandbox::config::CgroupManager;
use pod_sandbox::mount::SimulationMounter;
use pod_sandbox::network::SimulationNetwork;
use pod_sandbox::runtime::SimulationRuntime;
use pod_sandbox::sandbox::request::{PodSandboxConfig, PodSandboxMetadata};
use pod_sandbox::security::label::NoopLabeler;
use pod_sandbox::security::namespace::SimulationPinner;
use pod_sandbox::security::CgroupMode;
use pod_sandbox::storage::{FaultyStorage, LocalStorage};
use pod_sandbox::{RuntimeConfig, SandboxRequest, Server};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub server: Server,
    pub storage: Arc<FaultyStorage<LocalStorage>>,
    pub network: Arc<SimulationNetwork>,
    pub runtime: Arc<SimulationRuntime>,
    pub mounter: Arc<SimulationMounter>,
    pub pinner: Arc<SimulationPinner>,
}

impl Harness {
    pub fn new(manage_ns: bool) -> Self {
        Self::with_config(|config| config.manage_ns_lifecycle = manage_ns)
    }

    pub fn with_config(tweak: impl FnOnce(&mut RuntimeConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let host_resolv = dir.path().join("host-resolv.conf");
        std::fs::write(&host_resolv, "nameserver 192.168.1.1\n").unwrap();

        let mut config = RuntimeConfig {
            root: dir.path().join("root"),
            run_root: dir.path().join("run"),
            log_dir: dir.path().join("logs"),
            cgroup_manager: CgroupManager::Cgroupfs,
            namespaces_dir: dir.path().join("ns"),
            host_resolv_conf: host_resolv,
            ..Default::default()
        };
        tweak(&mut config);

        let storage = Arc::new(FaultyStorage::new(
            LocalStorage::new(&config.root, &config.run_root).with_selinux(false),
        ));
        let network = Arc::new(SimulationNetwork::new());
        let runtime = Arc::new(SimulationRuntime::new());
        let mounter = Arc::new(SimulationMounter::new());
        let pinner = Arc::new(SimulationPinner::new(&config.namespaces_dir));

        let server = Server::builder(config)
            .with_storage(storage.clone())
            .with_network(network.clone())
            .with_runtime(runtime.clone())
            .with_labeler(Arc::new(NoopLabeler { unsupported: true }))
            .with_mounter(mounter.clone())
            .with_pinner(pinner.clone())
            .with_cgroup_mode(CgroupMode::Unified)
            .with_cgroup_mount_root(dir.path().join("cgroup"))
            .build()
            .unwrap();

        Self {
            dir,
            server,
            storage,
            network,
            runtime,
            mounter,
            pinner,
        }
    }

    /// Nothing acquired by a failed run may survive it
    pub fn assert_clean(&self) {
        assert!(self.server.pod_names().is_empty(), "pod name still reserved");
        assert!(self.server.ctr_names().is_empty(), "container name still reserved");
        assert!(self.server.pod_id_index().is_empty());
        assert!(self.server.ctr_id_index().is_empty());
        assert_eq!(self.server.sandbox_count(), 0);
        assert_eq!(self.server.infra_container_count(), 0);
        assert!(self.storage.inner().is_empty(), "sandbox storage left behind");
        assert_eq!(self.mounter.mount_count(), 0);
        assert_eq!(self.pinner.pinned_count(), 0);
        assert_eq!(self.network.attached_count(), 0);
        assert_eq!(self.runtime.running_count(), 0);
    }
}

pub fn request(name: &str) -> SandboxRequest {
    SandboxRequest {
        config: PodSandboxConfig {
            metadata: PodSandboxMetadata {
                name: name.into(),
                namespace: "default".into(),
                uid: format!("{}-uid", name),
                attempt: 0,
            },
            ..Default::default()
        },
        runtime_handler: String::new(),
    }
}
