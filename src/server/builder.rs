/*!
 * Server Builder
 * Builder pattern for Server construction
 */

use super::Server;
use crate::config::{ConfigResult, RuntimeConfig};
use crate::mount::{HostMounter, Mounter};
use crate::network::{LoopbackNetwork, NetworkManager};
use crate::registry::{IdIndex, NameRegistry};
use crate::runtime::{ContainerRuntime, OciRuntime};
use crate::sandbox::shm::ShmProvisioner;
use crate::security::label::{selinux_enabled, ChconLabeler, Labeler, NoopLabeler};
use crate::security::namespace::{NamespacePinner, ThreadPinner};
use crate::security::{CgroupMode, CgroupResolver, NamespaceLifecycle};
use crate::storage::{LocalStorage, StorageService};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Builder for Server
///
/// Collaborators left unset fall back to the host implementations.
pub struct ServerBuilder {
    config: RuntimeConfig,
    storage: Option<Arc<dyn StorageService>>,
    network: Option<Arc<dyn NetworkManager>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    labeler: Option<Arc<dyn Labeler>>,
    mounter: Option<Arc<dyn Mounter>>,
    pinner: Option<Arc<dyn NamespacePinner>>,
    cgroup_mode: Option<CgroupMode>,
    cgroup_mount_root: Option<PathBuf>,
}

impl ServerBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            storage: None,
            network: None,
            runtime: None,
            labeler: None,
            mounter: None,
            pinner: None,
            cgroup_mode: None,
            cgroup_mount_root: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageService>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkManager>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_labeler(mut self, labeler: Arc<dyn Labeler>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    pub fn with_mounter(mut self, mounter: Arc<dyn Mounter>) -> Self {
        self.mounter = Some(mounter);
        self
    }

    pub fn with_pinner(mut self, pinner: Arc<dyn NamespacePinner>) -> Self {
        self.pinner = Some(pinner);
        self
    }

    /// Override cgroup mode detection
    pub fn with_cgroup_mode(mut self, mode: CgroupMode) -> Self {
        self.cgroup_mode = Some(mode);
        self
    }

    /// Read slice memory limits below `root` instead of the host mount
    pub fn with_cgroup_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cgroup_mount_root = Some(root.into());
        self
    }

    /// Validate the configuration and build the Server
    pub fn build(self) -> ConfigResult<Server> {
        self.config.validate()?;
        let id_mappings = self.config.id_mappings()?;
        let selinux = selinux_enabled();

        let mut features = Vec::new();

        let storage = self.storage.unwrap_or_else(|| {
            features.push("local-storage");
            Arc::new(
                LocalStorage::new(&self.config.root, &self.config.run_root).with_selinux(selinux),
            )
        });
        let network = self.network.unwrap_or_else(|| {
            features.push("loopback-network");
            Arc::new(LoopbackNetwork::new())
        });
        let runtime = self.runtime.unwrap_or_else(|| {
            features.push("oci-runtime");
            Arc::new(OciRuntime::new(self.config.runtimes.clone()))
        });
        let labeler = self.labeler.unwrap_or_else(|| -> Arc<dyn Labeler> {
            if selinux {
                features.push("selinux");
                Arc::new(ChconLabeler)
            } else {
                Arc::new(NoopLabeler { unsupported: true })
            }
        });
        let mounter = self
            .mounter
            .unwrap_or_else(|| Arc::new(HostMounter::new()));
        let pinner = self
            .pinner
            .unwrap_or_else(|| Arc::new(ThreadPinner::new(&self.config.namespaces_dir)));

        let mode = self.cgroup_mode.unwrap_or_else(CgroupMode::detect);
        let cgroups = match self.cgroup_mount_root {
            Some(root) => CgroupResolver::with_mount_root(self.config.cgroup_manager, mode, root),
            None => CgroupResolver::new(self.config.cgroup_manager, mode),
        };

        if self.config.manage_ns_lifecycle {
            features.push("managed-namespaces");
        }
        if id_mappings.is_some() {
            features.push("id-mappings");
        }
        info!(
            cgroup_manager = self.config.cgroup_manager.as_str(),
            "Sandbox server initialized with: {}",
            features.join(", ")
        );

        let namespaces = NamespaceLifecycle::new(self.config.manage_ns_lifecycle, pinner);

        Ok(Server {
            config: self.config,
            id_mappings,
            update_lock: RwLock::new(()),
            pod_names: NameRegistry::new(),
            ctr_names: NameRegistry::new(),
            pod_ids: IdIndex::new(),
            ctr_ids: IdIndex::new(),
            sandboxes: DashMap::with_hasher(RandomState::new()),
            infra_containers: DashMap::with_hasher(RandomState::new()),
            storage,
            network,
            runtime,
            labeler,
            shm: ShmProvisioner::new(mounter),
            cgroups,
            namespaces,
        })
    }
}
