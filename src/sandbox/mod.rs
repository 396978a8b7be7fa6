/*!
 * Sandbox
 * The live pod sandbox object and the helpers that wire it up
 */

pub mod annotations;
mod container;
pub mod dns;
pub mod pause;
pub mod request;
pub mod shm;
pub mod validation;

pub use container::{ContainerParams, ContainerState, ContainerStatus, InfraContainer};
pub use request::SandboxRequest;

use crate::core::types::SandboxState;
use crate::security::namespace::{
    ManagedNamespace, NamespaceError, NamespaceKind, NamespacePinner, NamespaceResult,
};
use parking_lot::{Mutex, RwLock};
use request::{NamespaceOption, PodSandboxMetadata, PortMapping};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Sandbox operation result
pub type SandboxResult<T> = Result<T, SandboxError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("sandbox id must not be empty")]
    MissingId,

    #[error("sandbox {0} already has an infra container")]
    InfraAlreadySet(String),

    #[error("invalid sandbox state transition {from} -> {to}")]
    InvalidTransition {
        from: SandboxState,
        to: SandboxState,
    },
}

/// Construction parameters for a sandbox
#[derive(Debug, Clone, Default)]
pub struct SandboxParams {
    pub id: String,
    pub name: String,
    pub kube_name: String,
    pub namespace: String,
    pub log_dir: PathBuf,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub process_label: String,
    pub mount_label: String,
    pub metadata: PodSandboxMetadata,
    pub shm_path: PathBuf,
    pub cgroup_parent: String,
    pub privileged: bool,
    pub runtime_handler: String,
    pub resolv_path: Option<PathBuf>,
    pub hostname: String,
    pub port_mappings: Vec<PortMapping>,
    pub host_network: bool,
    pub namespace_options: NamespaceOption,
    pub seccomp_profile_path: String,
}

/// A pod sandbox
///
/// Identity and configuration are fixed at construction; runtime wiring
/// (namespaces, addresses, infra container) is recorded as provisioning
/// progresses.
#[derive(Debug)]
pub struct Sandbox {
    params: SandboxParams,
    created_at: OffsetDateTime,
    state: RwLock<SandboxState>,
    managed_namespaces: Mutex<Vec<ManagedNamespace>>,
    ips: RwLock<Vec<String>>,
    hostname_path: RwLock<Option<PathBuf>>,
    infra: RwLock<Option<Arc<InfraContainer>>>,
}

impl Sandbox {
    pub fn new(params: SandboxParams) -> SandboxResult<Self> {
        if params.id.is_empty() {
            return Err(SandboxError::MissingId);
        }
        Ok(Self {
            params,
            created_at: OffsetDateTime::now_utc(),
            state: RwLock::new(SandboxState::Configuring),
            managed_namespaces: Mutex::new(Vec::new()),
            ips: RwLock::new(Vec::new()),
            hostname_path: RwLock::new(None),
            infra: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.params.id
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn kube_name(&self) -> &str {
        &self.params.kube_name
    }

    pub fn namespace(&self) -> &str {
        &self.params.namespace
    }

    pub fn log_dir(&self) -> &Path {
        &self.params.log_dir
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.params.labels
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.params.annotations
    }

    pub fn process_label(&self) -> &str {
        &self.params.process_label
    }

    pub fn mount_label(&self) -> &str {
        &self.params.mount_label
    }

    pub fn metadata(&self) -> &PodSandboxMetadata {
        &self.params.metadata
    }

    pub fn shm_path(&self) -> &Path {
        &self.params.shm_path
    }

    pub fn cgroup_parent(&self) -> &str {
        &self.params.cgroup_parent
    }

    pub fn privileged(&self) -> bool {
        self.params.privileged
    }

    pub fn runtime_handler(&self) -> &str {
        &self.params.runtime_handler
    }

    pub fn resolv_path(&self) -> Option<&Path> {
        self.params.resolv_path.as_deref()
    }

    pub fn hostname(&self) -> &str {
        &self.params.hostname
    }

    pub fn port_mappings(&self) -> &[PortMapping] {
        &self.params.port_mappings
    }

    pub fn host_network(&self) -> bool {
        self.params.host_network
    }

    pub fn namespace_options(&self) -> NamespaceOption {
        self.params.namespace_options
    }

    pub fn seccomp_profile_path(&self) -> &str {
        &self.params.seccomp_profile_path
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn state(&self) -> SandboxState {
        *self.state.read()
    }

    /// Mark provisioning complete
    pub fn set_created(&self) -> SandboxResult<()> {
        self.transition(SandboxState::Created)
    }

    fn transition(&self, next: SandboxState) -> SandboxResult<()> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(SandboxError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        debug!(sandbox = self.id(), from = %*state, to = %next, "sandbox state transition");
        *state = next;
        Ok(())
    }

    // Namespaces

    /// Create and pin a namespace per kind, recording them on the sandbox
    pub fn create_managed_namespaces(
        &self,
        kinds: &[NamespaceKind],
        pinner: &dyn NamespacePinner,
    ) -> NamespaceResult<Vec<ManagedNamespace>> {
        let mut managed = self.managed_namespaces.lock();
        if !managed.is_empty() {
            return Err(NamespaceError::InvalidConfig(format!(
                "sandbox {} already has managed namespaces",
                self.id()
            )));
        }

        let pinned = pinner.pin(self.id(), kinds)?;
        managed.extend(pinned.iter().cloned());
        Ok(pinned)
    }

    /// Release every managed namespace as a unit
    ///
    /// On failure the namespaces stay recorded so a later call can retry.
    pub fn remove_managed_namespaces(&self, pinner: &dyn NamespacePinner) -> NamespaceResult<()> {
        let mut managed = self.managed_namespaces.lock();
        if managed.is_empty() {
            return Ok(());
        }
        if let Err(e) = pinner.unpin(&managed) {
            warn!(sandbox = self.id(), error = %e, "failed to remove managed namespaces");
            return Err(e);
        }
        managed.clear();
        Ok(())
    }

    pub fn managed_namespaces(&self) -> Vec<ManagedNamespace> {
        self.managed_namespaces.lock().clone()
    }

    /// Path of the owned network namespace, if any
    pub fn netns_path(&self) -> Option<PathBuf> {
        self.managed_namespaces
            .lock()
            .iter()
            .find(|ns| ns.kind == NamespaceKind::Network)
            .map(|ns| ns.path.clone())
    }

    // Wiring

    pub fn add_ips(&self, ips: impl IntoIterator<Item = String>) {
        self.ips.write().extend(ips);
    }

    pub fn ips(&self) -> Vec<String> {
        self.ips.read().clone()
    }

    pub fn set_hostname_path(&self, path: impl Into<PathBuf>) {
        *self.hostname_path.write() = Some(path.into());
    }

    pub fn hostname_path(&self) -> Option<PathBuf> {
        self.hostname_path.read().clone()
    }

    pub fn set_infra_container(&self, container: Arc<InfraContainer>) -> SandboxResult<()> {
        let mut infra = self.infra.write();
        if infra.is_some() {
            return Err(SandboxError::InfraAlreadySet(self.id().to_string()));
        }
        *infra = Some(container);
        Ok(())
    }

    pub fn infra_container(&self) -> Option<Arc<InfraContainer>> {
        self.infra.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::namespace::SimulationPinner;

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxParams {
            id: "abc".into(),
            name: "k8s_web_default_u1_0".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_id() {
        assert_eq!(
            Sandbox::new(SandboxParams::default()).unwrap_err(),
            SandboxError::MissingId
        );
    }

    #[test]
    fn test_created_transition() {
        let sb = sandbox();
        assert_eq!(sb.state(), SandboxState::Configuring);
        sb.set_created().unwrap();
        assert_eq!(sb.state(), SandboxState::Created);
        assert!(sb.set_created().is_err());
    }

    #[test]
    fn test_managed_namespaces_unit() {
        let sb = sandbox();
        let pinner = SimulationPinner::new("/var/run");

        let pinned = sb
            .create_managed_namespaces(&[NamespaceKind::Network, NamespaceKind::Ipc], &pinner)
            .unwrap();
        assert_eq!(pinned.len(), 2);
        assert_eq!(sb.netns_path(), Some(PathBuf::from("/var/run/netns/abc")));
        assert!(sb
            .create_managed_namespaces(&[NamespaceKind::Uts], &pinner)
            .is_err());

        pinner.fail_unpin(true);
        assert!(sb.remove_managed_namespaces(&pinner).is_err());
        assert_eq!(sb.managed_namespaces().len(), 2);

        pinner.fail_unpin(false);
        sb.remove_managed_namespaces(&pinner).unwrap();
        assert!(sb.managed_namespaces().is_empty());
        assert_eq!(pinner.pinned_count(), 0);
    }
}
