/*!
 * Sandbox Server
 * Shared provisioning state and the collaborators it drives
 */

mod builder;
mod pipeline;

pub use builder::ServerBuilder;
pub use pipeline::NetworkPhase;

use crate::config::{IdMappings, RuntimeConfig};
use crate::core::errors::{ProvisionError, ProvisionResult};
use crate::core::id;
use crate::network::NetworkManager;
use crate::registry::{IdIndex, NameRegistry, RegistryError};
use crate::runtime::ContainerRuntime;
use crate::sandbox::request::PodSandboxConfig;
use crate::sandbox::shm::ShmProvisioner;
use crate::sandbox::{InfraContainer, Sandbox, SandboxRequest};
use crate::security::label::Labeler;
use crate::security::{CgroupResolver, NamespaceLifecycle};
use crate::storage::StorageService;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;
use tracing::debug;

/// Provisioning server
///
/// Provisioning calls hold `update_lock` for reading and may run
/// concurrently; operations that reconfigure the server take it for
/// writing. Registries and tables are safe for concurrent use on their own.
pub struct Server {
    config: RuntimeConfig,
    id_mappings: Option<IdMappings>,
    update_lock: RwLock<()>,

    pod_names: NameRegistry,
    ctr_names: NameRegistry,
    pod_ids: IdIndex,
    ctr_ids: IdIndex,
    sandboxes: DashMap<String, Arc<Sandbox>, RandomState>,
    infra_containers: DashMap<String, Arc<InfraContainer>, RandomState>,

    storage: Arc<dyn StorageService>,
    network: Arc<dyn NetworkManager>,
    runtime: Arc<dyn ContainerRuntime>,
    labeler: Arc<dyn Labeler>,
    shm: ShmProvisioner,
    cgroups: CgroupResolver,
    namespaces: NamespaceLifecycle,
}

impl Server {
    pub fn builder(config: RuntimeConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Exclusive access for operations that must not overlap provisioning
    pub fn lock_for_update(&self) -> RwLockWriteGuard<'_, ()> {
        self.update_lock.write()
    }

    pub fn pod_names(&self) -> &NameRegistry {
        &self.pod_names
    }

    pub fn ctr_names(&self) -> &NameRegistry {
        &self.ctr_names
    }

    pub fn pod_id_index(&self) -> &IdIndex {
        &self.pod_ids
    }

    pub fn ctr_id_index(&self) -> &IdIndex {
        &self.ctr_ids
    }

    pub fn sandbox(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.sandboxes.get(id).map(|sb| Arc::clone(sb.value()))
    }

    pub fn sandbox_count(&self) -> usize {
        self.sandboxes.len()
    }

    pub fn infra_container(&self, id: &str) -> Option<Arc<InfraContainer>> {
        self.infra_containers.get(id).map(|c| Arc::clone(c.value()))
    }

    pub fn infra_container_count(&self) -> usize {
        self.infra_containers.len()
    }

    // Reservations

    /// Generate a pod id and reserve the composed sandbox name for it
    fn reserve_pod_id_and_name(&self, config: &PodSandboxConfig) -> ProvisionResult<(String, String)> {
        let metadata = &config.metadata;
        if metadata.namespace.is_empty() {
            return Err(ProvisionError::validation("cannot generate pod name without namespace"));
        }
        if metadata.name.is_empty() {
            return Err(ProvisionError::validation("cannot generate pod name without name in metadata"));
        }

        let id = id::generate_id();
        let name = id::sandbox_name(
            &metadata.name,
            &metadata.namespace,
            &metadata.uid,
            metadata.attempt,
        );
        self.pod_names.reserve(&name, &id)?;
        debug!(%id, %name, "reserved pod name");
        Ok((id, name))
    }

    /// Reserve the infra container name for an already reserved pod id
    fn reserve_infra_container_name(
        &self,
        config: &PodSandboxConfig,
        id: &str,
    ) -> ProvisionResult<String> {
        let metadata = &config.metadata;
        let name = id::infra_container_name(
            &metadata.name,
            &metadata.namespace,
            &metadata.uid,
            metadata.attempt,
        );
        self.ctr_names.reserve(&name, id)?;
        Ok(name)
    }

    // Tables

    fn add_sandbox(&self, sandbox: Arc<Sandbox>) -> ProvisionResult<()> {
        match self.sandboxes.entry(sandbox.id().to_string()) {
            Entry::Occupied(_) => Err(ProvisionError::Reservation(RegistryError::IdExists(
                sandbox.id().to_string(),
            ))),
            Entry::Vacant(slot) => {
                slot.insert(sandbox);
                Ok(())
            }
        }
    }

    fn remove_sandbox(&self, id: &str) -> anyhow::Result<()> {
        self.sandboxes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("sandbox {} not in the live table", id))
    }

    fn add_infra_container(&self, container: Arc<InfraContainer>) {
        self.infra_containers
            .insert(container.id().to_string(), container);
    }

    fn remove_infra_container(&self, id: &str) {
        self.infra_containers.remove(id);
    }

    // Request helpers

    /// Validated runtime handler name
    fn runtime_handler(&self, request: &SandboxRequest) -> ProvisionResult<String> {
        self.config
            .runtime_handler(&request.runtime_handler)
            .map(|(name, _)| name)
            .map_err(|e| ProvisionError::validation(e.to_string()))
    }
}
