/*!
 * Namespace Lifecycle Manager
 * Decides per kind whether a sandbox shares, owns, or defers a namespace
 */

use super::traits::NamespacePinner;
use super::types::*;
use crate::core::guard::CompensationStack;
use crate::sandbox::Sandbox;
use crate::spec::SpecGenerator;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info};

/// Applies namespace sharing and ownership rules to a sandbox spec
#[derive(Clone)]
pub struct NamespaceLifecycle {
    manage: bool,
    pinner: Arc<dyn NamespacePinner>,
}

impl NamespaceLifecycle {
    /// `manage` enables system-owned network, IPC and UTS namespaces
    pub fn new(manage: bool, pinner: Arc<dyn NamespacePinner>) -> Self {
        Self { manage, pinner }
    }

    pub fn manages_lifecycle(&self) -> bool {
        self.manage
    }

    /// Per-kind decisions
    ///
    /// Host-shared network, IPC and PID entries are removed. With lifecycle
    /// management, non-shared network and IPC plus UTS are owned here. PID is
    /// never owned since no holder process exists for it.
    pub fn plan(&self, host: HostNamespaces) -> NamespacePlan {
        let mut plan = NamespacePlan::default();

        for (kind, shared) in [
            (NamespaceKind::Network, host.network),
            (NamespaceKind::Ipc, host.ipc),
        ] {
            if shared {
                plan.removed.push(kind);
            } else if self.manage {
                plan.managed.push(kind);
            }
        }

        if host.pid {
            plan.removed.push(NamespaceKind::Pid);
        }

        if self.manage {
            plan.managed.push(NamespaceKind::Uts);
        }

        plan
    }

    /// Apply the plan to `spec`, creating owned namespaces through the sandbox
    ///
    /// Registers one compensation removing every owned namespace as a unit.
    pub fn configure<'a>(
        &self,
        host: HostNamespaces,
        sandbox: &Arc<Sandbox>,
        spec: &mut SpecGenerator,
        stack: &mut CompensationStack<'a>,
    ) -> NamespaceResult<Vec<ManagedNamespace>> {
        let plan = self.plan(host);
        debug!(sandbox = sandbox.id(), ?plan, "namespace plan");

        for kind in &plan.removed {
            spec.remove_namespace(kind.spec_type());
        }

        if plan.managed.is_empty() {
            return Ok(Vec::new());
        }

        let namespaces = sandbox.create_managed_namespaces(&plan.managed, self.pinner.as_ref())?;

        let owner = Arc::clone(sandbox);
        let pinner = Arc::clone(&self.pinner);
        stack.push("remove managed namespaces", move || {
            owner
                .remove_managed_namespaces(pinner.as_ref())
                .with_context(|| format!("removing namespaces of sandbox {}", owner.id()))
        });

        apply_namespace_paths(spec, &namespaces)?;
        info!(
            sandbox = sandbox.id(),
            count = namespaces.len(),
            "configured managed namespaces"
        );

        Ok(namespaces)
    }
}

/// Point spec namespace entries at pinned paths
///
/// Entries with an empty path are skipped. PID has no managed form, so a
/// PID entry with a path is rejected.
pub fn apply_namespace_paths(
    spec: &mut SpecGenerator,
    namespaces: &[ManagedNamespace],
) -> NamespaceResult<()> {
    for ns in namespaces {
        if ns.path.as_os_str().is_empty() {
            continue;
        }

        match ns.kind {
            NamespaceKind::Network
            | NamespaceKind::Ipc
            | NamespaceKind::Uts
            | NamespaceKind::User => {
                spec.add_or_replace_namespace(
                    ns.kind.spec_type(),
                    ns.path.to_string_lossy().into_owned(),
                );
            }
            NamespaceKind::Pid => {
                return Err(NamespaceError::InvalidConfig(format!(
                    "invalid namespace type {}",
                    ns.kind
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::namespace::SimulationPinner;
    use crate::spec::LinuxNamespaceType;

    fn lifecycle(manage: bool) -> NamespaceLifecycle {
        NamespaceLifecycle::new(manage, Arc::new(SimulationPinner::new("/var/run")))
    }

    #[test]
    fn test_plan_unmanaged() {
        let plan = lifecycle(false).plan(HostNamespaces::default());
        assert!(plan.removed.is_empty());
        assert!(plan.managed.is_empty());
    }

    #[test]
    fn test_plan_managed() {
        let plan = lifecycle(true).plan(HostNamespaces::default());
        assert_eq!(
            plan.managed,
            vec![NamespaceKind::Network, NamespaceKind::Ipc, NamespaceKind::Uts]
        );
    }

    #[test]
    fn test_plan_host_pid_never_managed() {
        let host = HostNamespaces {
            pid: true,
            ..Default::default()
        };
        let plan = lifecycle(true).plan(host);
        assert!(!plan.manages(NamespaceKind::Pid));
        assert_eq!(plan.removed, vec![NamespaceKind::Pid]);
    }

    #[test]
    fn test_plan_host_network() {
        let host = HostNamespaces {
            network: true,
            ..Default::default()
        };
        let plan = lifecycle(true).plan(host);
        assert!(plan.removed.contains(&NamespaceKind::Network));
        assert!(!plan.manages(NamespaceKind::Network));
        assert!(plan.manages(NamespaceKind::Ipc));
    }

    #[test]
    fn test_apply_paths() {
        let mut spec = SpecGenerator::new_linux();
        let namespaces = vec![
            ManagedNamespace::owned(NamespaceKind::Network, "/var/run/netns/abc"),
            ManagedNamespace::owned(NamespaceKind::Uts, ""),
            ManagedNamespace::owned(NamespaceKind::User, "/var/run/userns/abc"),
        ];
        apply_namespace_paths(&mut spec, &namespaces).unwrap();

        assert_eq!(
            spec.namespace(LinuxNamespaceType::Network).unwrap().path,
            "/var/run/netns/abc"
        );
        assert_eq!(spec.namespace(LinuxNamespaceType::Uts).unwrap().path, "");
        assert!(spec.namespace(LinuxNamespaceType::User).is_some());
    }

    #[test]
    fn test_apply_pid_path_rejected() {
        let mut spec = SpecGenerator::new_linux();
        let err = apply_namespace_paths(
            &mut spec,
            &[ManagedNamespace::owned(NamespaceKind::Pid, "/proc/1/ns/pid")],
        )
        .unwrap_err();
        assert!(matches!(err, NamespaceError::InvalidConfig(_)));

        // an empty path is skipped before the kind is checked
        apply_namespace_paths(&mut spec, &[ManagedNamespace::owned(NamespaceKind::Pid, "")])
            .unwrap();
    }
}
