/*!
 * Namespace Lifecycle Tests
 * Sharing, ownership and teardown of sandbox namespaces
 */

mod common;

use common::{request, Harness};
use pod_sandbox::core::guard::CompensationStack;
use pod_sandbox::sandbox::request::NamespaceMode;
use pod_sandbox::sandbox::{Sandbox, SandboxParams};
use pod_sandbox::security::namespace::{
    HostNamespaces, NamespaceKind, NamespaceLifecycle, SimulationPinner,
};
use pod_sandbox::spec::{LinuxNamespaceType, RuntimeSpec, SpecGenerator};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

fn sandbox(id: &str) -> Arc<Sandbox> {
    Arc::new(
        Sandbox::new(SandboxParams {
            id: id.into(),
            name: format!("k8s_{}_default_u1_0", id),
            ..Default::default()
        })
        .unwrap(),
    )
}

fn namespace_path(spec: &RuntimeSpec, kind: LinuxNamespaceType) -> Option<&str> {
    spec.linux
        .namespaces
        .iter()
        .find(|ns| ns.kind == kind)
        .map(|ns| ns.path.as_str())
}

#[test]
fn test_configure_pins_and_unwinds() {
    let pinner = Arc::new(SimulationPinner::new("/var/run"));
    let lifecycle = NamespaceLifecycle::new(true, pinner.clone());
    let sb = sandbox("abc");
    let mut spec = SpecGenerator::new_linux();

    let mut stack = CompensationStack::new();
    let owned = lifecycle
        .configure(HostNamespaces::default(), &sb, &mut spec, &mut stack)
        .unwrap();

    assert_eq!(owned.len(), 3);
    assert_eq!(pinner.pinned_count(), 3);
    assert_eq!(
        spec.namespace(LinuxNamespaceType::Network).unwrap().path,
        "/var/run/netns/abc"
    );
    assert_eq!(
        spec.namespace(LinuxNamespaceType::Uts).unwrap().path,
        "/var/run/utsns/abc"
    );
    assert_eq!(stack.steps(), vec!["remove managed namespaces"]);

    let report = stack.unwind();
    assert!(report.is_clean());
    assert_eq!(pinner.pinned_count(), 0);
    assert!(sb.managed_namespaces().is_empty());
}

#[test]
fn test_unmanaged_leaves_namespaces_to_runtime() {
    let pinner = Arc::new(SimulationPinner::new("/var/run"));
    let lifecycle = NamespaceLifecycle::new(false, pinner.clone());
    let sb = sandbox("abc");
    let mut spec = SpecGenerator::new_linux();
    let mut stack = CompensationStack::new();

    let owned = lifecycle
        .configure(HostNamespaces::default(), &sb, &mut spec, &mut stack)
        .unwrap();

    assert!(owned.is_empty());
    assert!(stack.is_empty());
    assert_eq!(pinner.pinned_count(), 0);
    // entries stay, without paths, so the runtime creates them
    assert_eq!(spec.namespace(LinuxNamespaceType::Network).unwrap().path, "");
    stack.commit();
}

#[test]
fn test_host_namespaces_removed_from_spec() {
    let pinner = Arc::new(SimulationPinner::new("/var/run"));
    let lifecycle = NamespaceLifecycle::new(true, pinner.clone());
    let sb = sandbox("abc");
    let mut spec = SpecGenerator::new_linux();
    let mut stack = CompensationStack::new();

    let host = HostNamespaces {
        network: true,
        ipc: true,
        pid: true,
    };
    let owned = lifecycle.configure(host, &sb, &mut spec, &mut stack).unwrap();

    assert!(spec.namespace(LinuxNamespaceType::Network).is_none());
    assert!(spec.namespace(LinuxNamespaceType::Ipc).is_none());
    assert!(spec.namespace(LinuxNamespaceType::Pid).is_none());
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].kind, NamespaceKind::Uts);
    stack.commit();
    assert_eq!(pinner.pinned_count(), 1);
}

#[test]
fn test_pin_failure_registers_nothing() {
    let pinner = Arc::new(SimulationPinner::new("/var/run"));
    pinner.fail_pin(true);
    let lifecycle = NamespaceLifecycle::new(true, pinner.clone());
    let sb = sandbox("abc");
    let mut spec = SpecGenerator::new_linux();
    let mut stack = CompensationStack::new();

    assert!(lifecycle
        .configure(HostNamespaces::default(), &sb, &mut spec, &mut stack)
        .is_err());
    assert!(stack.is_empty());
    assert!(sb.managed_namespaces().is_empty());
}

#[test]
fn test_pipeline_points_spec_at_pins() {
    let h = Harness::new(true);
    let id = h.server.run_pod_sandbox(&request("web")).unwrap();

    let ns_dir = h.dir.path().join("ns");
    let sandbox = h.server.sandbox(&id).unwrap();
    assert_eq!(sandbox.netns_path(), Some(ns_dir.join("netns").join(&id)));

    let spec = h.server.infra_container(&id).unwrap().spec();
    for (kind, dir) in [
        (LinuxNamespaceType::Network, "netns"),
        (LinuxNamespaceType::Ipc, "ipcns"),
        (LinuxNamespaceType::Uts, "utsns"),
    ] {
        let expected = ns_dir.join(dir).join(&id);
        assert_eq!(
            namespace_path(&spec, kind).map(PathBuf::from),
            Some(expected)
        );
    }
    assert_eq!(namespace_path(&spec, LinuxNamespaceType::Pid), Some(""));
}

#[test]
fn test_pipeline_host_pid_only() {
    let h = Harness::new(true);
    let mut req = request("web");
    req.config.linux.security_context.namespace_options.pid = NamespaceMode::Node;

    let id = h.server.run_pod_sandbox(&req).unwrap();
    let spec = h.server.infra_container(&id).unwrap().spec();

    assert!(namespace_path(&spec, LinuxNamespaceType::Pid).is_none());
    assert_eq!(h.pinner.pinned_count(), 3);
}

#[test]
fn test_unpin_failure_reported_but_run_error_kept() {
    let h = Harness::new(true);
    h.pinner.fail_unpin(true);
    h.network.fail_attach(true);

    let err = h.server.run_pod_sandbox(&request("web")).unwrap_err();
    assert!(err.to_string().contains("attach pod network"), "{}", err);
    // the namespaces could not be released
    assert_eq!(h.pinner.pinned_count(), 3);
    assert_eq!(h.server.sandbox_count(), 0);
}
