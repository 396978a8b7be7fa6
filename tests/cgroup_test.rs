/*!
 * Cgroup Placement Tests
 * Parent resolution through the provisioning path and resolver properties
 */

mod common;

use common::{request, Harness};
use pod_sandbox::config::CgroupManager;
use pod_sandbox::sandbox::annotations;
use pod_sandbox::security::{CgroupMode, CgroupResolver};
use pod_sandbox::ErrorKind;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::path::Path;

fn systemd_harness() -> Harness {
    Harness::with_config(|config| config.cgroup_manager = CgroupManager::Systemd)
}

fn write_memory_max(cgroup_root: &Path, slice_path: &str, value: &str) {
    let dir = cgroup_root.join(slice_path.trim_start_matches('/'));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("memory.max"), value).unwrap();
}

#[test]
fn test_systemd_parent_in_spec() {
    let h = systemd_harness();
    let mut req = request("web");
    req.config.linux.cgroup_parent = "/kubepods.slice/kubepods-burstable.slice".into();

    let id = h.server.run_pod_sandbox(&req).unwrap();
    let sandbox = h.server.sandbox(&id).unwrap();
    assert_eq!(sandbox.cgroup_parent(), "kubepods-burstable.slice");

    let spec = h.server.infra_container(&id).unwrap().spec();
    assert_eq!(
        spec.linux.cgroups_path,
        Some(format!("kubepods-burstable.slice:crio:{}", id))
    );
    assert_eq!(
        spec.annotations[annotations::CGROUP_PARENT],
        "kubepods-burstable.slice"
    );
}

#[test]
fn test_cgroupfs_parent_in_spec() {
    let h = Harness::new(false);
    let mut req = request("web");
    req.config.linux.cgroup_parent = "/kubepods/pod1".into();

    let id = h.server.run_pod_sandbox(&req).unwrap();
    let spec = h.server.infra_container(&id).unwrap().spec();
    assert_eq!(spec.linux.cgroups_path, Some(format!("/kubepods/pod1/crio-{}", id)));
}

#[test]
fn test_memory_floor() {
    let h = systemd_harness();
    let cgroup_root = h.dir.path().join("cgroup");

    write_memory_max(&cgroup_root, "/tiny.slice", "1048576\n");
    let mut req = request("tiny");
    req.config.linux.cgroup_parent = "tiny.slice".into();
    let err = h.server.run_pod_sandbox(&req).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("too low"), "{}", err);
    h.assert_clean();

    for (name, value) in [("unbounded", "max\n"), ("roomy", "8388608\n")] {
        let slice = format!("{}.slice", name);
        write_memory_max(&cgroup_root, &format!("/{}", slice), value);
        let mut req = request(name);
        req.config.linux.cgroup_parent = slice;
        h.server.run_pod_sandbox(&req).unwrap();
    }

    // no limit file at all
    let mut req = request("absent");
    req.config.linux.cgroup_parent = "absent.slice".into();
    h.server.run_pod_sandbox(&req).unwrap();
}

#[test]
fn test_manager_mismatch_rejected() {
    let h = systemd_harness();
    let mut req = request("web");
    req.config.linux.cgroup_parent = "/kubepods/pod1".into();

    let err = h.server.run_pod_sandbox(&req).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    h.assert_clean();
}

#[test]
fn test_empty_parent_leaves_cgroups_path() {
    let h = systemd_harness();
    let id = h.server.run_pod_sandbox(&request("web")).unwrap();

    let spec = h.server.infra_container(&id).unwrap().spec();
    assert!(spec.linux.cgroups_path.is_none());
    assert_eq!(spec.annotations[annotations::CGROUP_PARENT], "");
}

proptest! {
    #[test]
    fn prop_cgroupfs_path_ends_with_scope(
        parent in "(/[a-z0-9]{1,8}){1,4}",
        id in "[0-9a-f]{64}",
    ) {
        let resolver = CgroupResolver::new(CgroupManager::Cgroupfs, CgroupMode::Unified);
        let placement = resolver.resolve(&parent, &id).unwrap();
        let expected_suffix = format!("/crio-{}", id);
        prop_assert!(placement.path.ends_with(&expected_suffix));
        prop_assert!(placement.path.starts_with(&parent));
        prop_assert_eq!(placement.parent, parent);
    }

    #[test]
    fn prop_systemd_scope_uses_basename(
        outer in "[a-z]{1,8}",
        inner in "[a-z]{1,8}",
        id in "[0-9a-f]{64}",
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let resolver = CgroupResolver::with_mount_root(
            CgroupManager::Systemd,
            CgroupMode::Unified,
            dir.path(),
        );
        let inner_slice = format!("{}-{}.slice", outer, inner);
        let hint = format!("/{}.slice/{}", outer, inner_slice);
        let placement = resolver.resolve(&hint, &id).unwrap();
        prop_assert_eq!(placement.path, format!("{}:crio:{}", inner_slice, id));
        prop_assert_eq!(placement.parent, inner_slice);
    }
}
