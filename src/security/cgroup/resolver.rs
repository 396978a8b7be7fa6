/*!
 * Cgroup Resolver
 * Computes the infra process cgroup path and enforces the memory floor
 */

use super::systemd::{basename, expand_slice, is_slice_name};
use super::{CgroupError, CgroupMode, CgroupResult, SCOPE_PREFIX};
use crate::config::CgroupManager;
use crate::core::types::MIN_MEMORY_LIMIT;
use crate::sandbox::annotations;
use crate::spec::SpecGenerator;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolved cgroup placement of a sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupPlacement {
    /// Value written to the runtime spec's `cgroupsPath`; empty when no parent was requested
    pub path: String,
    /// Logical parent retained on the sandbox and in the annotation
    pub parent: String,
}

impl CgroupPlacement {
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Resolves parent hints for one cgroup manager
#[derive(Debug, Clone)]
pub struct CgroupResolver {
    manager: CgroupManager,
    mode: CgroupMode,
    mount_root: PathBuf,
}

impl CgroupResolver {
    /// Resolver reading memory ceilings from the host's cgroup mount
    pub fn new(manager: CgroupManager, mode: CgroupMode) -> Self {
        Self {
            manager,
            mode,
            mount_root: mode.mount_root(),
        }
    }

    /// Resolver reading memory ceilings below `mount_root`
    pub fn with_mount_root(
        manager: CgroupManager,
        mode: CgroupMode,
        mount_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manager,
            mode,
            mount_root: mount_root.into(),
        }
    }

    /// Compute the placement for `parent_hint` without touching a spec
    pub fn resolve(&self, parent_hint: &str, id: &str) -> CgroupResult<CgroupPlacement> {
        if parent_hint.is_empty() {
            return Ok(CgroupPlacement::default());
        }

        match self.manager {
            CgroupManager::Systemd => self.resolve_systemd(parent_hint, id),
            CgroupManager::Cgroupfs => resolve_cgroupfs(parent_hint, id),
        }
    }

    /// Resolve, write the cgroup path into the runtime spec and annotate the parent
    ///
    /// An empty hint leaves the runtime spec's cgroup path untouched and annotates an
    /// empty parent.
    pub fn apply(
        &self,
        parent_hint: &str,
        id: &str,
        spec: &mut SpecGenerator,
    ) -> CgroupResult<CgroupPlacement> {
        let placement = self.resolve(parent_hint, id)?;
        if !placement.is_empty() {
            spec.set_cgroups_path(placement.path.clone());
        }
        spec.add_annotation(annotations::CGROUP_PARENT, placement.parent.clone());
        Ok(placement)
    }

    fn resolve_systemd(&self, parent_hint: &str, id: &str) -> CgroupResult<CgroupPlacement> {
        if !is_slice_name(parent_hint) {
            return Err(CgroupError::NotASlice(parent_hint.to_string()));
        }

        let slice = basename(parent_hint).to_string();
        let slice_path = expand_slice(&slice)?;
        self.check_memory_floor(&slice, &slice_path)?;

        let path = format!("{}:{}:{}", slice, SCOPE_PREFIX, id);
        debug!(parent = %slice, path = %path, "resolved systemd cgroup placement");

        Ok(CgroupPlacement {
            path,
            parent: slice,
        })
    }

    /// Reject slices whose discoverable memory ceiling is below the floor
    ///
    /// A missing limit file means the slice sets no ceiling. A present file
    /// must hold `max`, nothing, or an integer.
    fn check_memory_floor(&self, slice: &str, slice_path: &str) -> CgroupResult<()> {
        let filename = self.mode.memory_limit_file();
        let file = self
            .mount_root
            .join(slice_path.trim_start_matches('/'))
            .join(filename);

        let raw = match std::fs::read_to_string(&file) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = filename, slice, "failed to find memory limit file for slice");
                return Ok(());
            }
            Err(source) => return Err(CgroupError::Io { path: file, source }),
        };

        let value = raw.trim_end_matches('\n');
        if value.is_empty() || value == "max" {
            return Ok(());
        }

        let limit: i64 = value.parse().map_err(|_| CgroupError::InvalidMemoryValue {
            path: file.clone(),
            value: value.to_string(),
        })?;
        if limit != 0 && limit < MIN_MEMORY_LIMIT {
            return Err(CgroupError::MemoryLimitTooLow {
                limit,
                min: MIN_MEMORY_LIMIT,
            });
        }

        Ok(())
    }
}

fn resolve_cgroupfs(parent_hint: &str, id: &str) -> CgroupResult<CgroupPlacement> {
    if basename(parent_hint).ends_with(super::SLICE_SUFFIX) {
        return Err(CgroupError::SliceAsCgroupfsParent(parent_hint.to_string()));
    }

    let joined = Path::new(parent_hint).join(format!("{}-{}", SCOPE_PREFIX, id));
    let path = path_clean::clean(&joined).to_string_lossy().into_owned();
    debug!(parent = parent_hint, path = %path, "resolved cgroupfs cgroup placement");

    Ok(CgroupPlacement {
        path,
        parent: parent_hint.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn systemd_at(root: &Path, mode: CgroupMode) -> CgroupResolver {
        CgroupResolver::with_mount_root(CgroupManager::Systemd, mode, root)
    }

    fn write_limit(root: &Path, slice_path: &str, file: &str, value: &str) {
        let dir = root.join(slice_path.trim_start_matches('/'));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), value).unwrap();
    }

    #[test]
    fn test_systemd_path() {
        let dir = TempDir::new().unwrap();
        let placement = systemd_at(dir.path(), CgroupMode::Unified)
            .resolve("foo.slice", "abc")
            .unwrap();
        assert_eq!(placement.path, "foo.slice:crio:abc");
        assert_eq!(placement.parent, "foo.slice");
    }

    #[test]
    fn test_systemd_uses_basename() {
        let dir = TempDir::new().unwrap();
        let placement = systemd_at(dir.path(), CgroupMode::Unified)
            .resolve("/kubepods.slice/kubepods-besteffort.slice", "abc")
            .unwrap();
        assert_eq!(placement.path, "kubepods-besteffort.slice:crio:abc");
    }

    #[test]
    fn test_manager_mismatch() {
        let dir = TempDir::new().unwrap();
        let err = systemd_at(dir.path(), CgroupMode::Unified)
            .resolve("foo", "abc")
            .unwrap_err();
        assert!(matches!(err, CgroupError::NotASlice(_)));

        let cgroupfs = CgroupResolver::with_mount_root(
            CgroupManager::Cgroupfs,
            CgroupMode::Unified,
            dir.path(),
        );
        let err = cgroupfs.resolve("foo.slice", "abc").unwrap_err();
        assert!(matches!(err, CgroupError::SliceAsCgroupfsParent(_)));
    }

    #[test]
    fn test_cgroupfs_path() {
        let resolver = CgroupResolver::new(CgroupManager::Cgroupfs, CgroupMode::Legacy);
        assert_eq!(resolver.resolve("foo", "abc").unwrap().path, "foo/crio-abc");
        assert_eq!(
            resolver.resolve("/kubepods/pod1/", "abc").unwrap().path,
            "/kubepods/pod1/crio-abc"
        );
    }

    #[test]
    fn test_memory_floor_v2() {
        let dir = TempDir::new().unwrap();
        let resolver = systemd_at(dir.path(), CgroupMode::Unified);

        write_limit(dir.path(), "/low.slice", "memory.max", "1048576\n");
        let err = resolver.resolve("low.slice", "abc").unwrap_err();
        assert!(matches!(err, CgroupError::MemoryLimitTooLow { limit: 1048576, .. }));

        write_limit(dir.path(), "/ok.slice", "memory.max", "8388608\n");
        assert!(resolver.resolve("ok.slice", "abc").is_ok());

        write_limit(dir.path(), "/unbounded.slice", "memory.max", "max\n");
        assert!(resolver.resolve("unbounded.slice", "abc").is_ok());

        write_limit(dir.path(), "/zero.slice", "memory.max", "0");
        assert!(resolver.resolve("zero.slice", "abc").is_ok());
    }

    #[test]
    fn test_memory_floor_v1_nested_slice() {
        let dir = TempDir::new().unwrap();
        let resolver = systemd_at(dir.path(), CgroupMode::Legacy);

        write_limit(
            dir.path(),
            "/kubepods.slice/kubepods-pod1.slice",
            "memory.limit_in_bytes",
            "2097152\n",
        );
        assert!(resolver.resolve("kubepods-pod1.slice", "abc").is_err());
        // v2 file name is not consulted on a v1 host
        write_limit(dir.path(), "/other.slice", "memory.max", "1");
        assert!(resolver.resolve("other.slice", "abc").is_ok());
    }

    #[test]
    fn test_unparseable_limit_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_limit(dir.path(), "/bad.slice", "memory.max", "lots\n");
        let err = systemd_at(dir.path(), CgroupMode::Unified)
            .resolve("bad.slice", "abc")
            .unwrap_err();
        assert!(matches!(err, CgroupError::InvalidMemoryValue { .. }));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_empty_hint_is_noop() {
        let resolver = CgroupResolver::new(CgroupManager::Systemd, CgroupMode::Unified);
        let mut spec = SpecGenerator::new_linux();
        let placement = resolver.apply("", "abc", &mut spec).unwrap();
        assert!(placement.is_empty());
        assert!(spec.cgroups_path().is_none());
        assert_eq!(spec.annotation(annotations::CGROUP_PARENT), Some(""));
    }

    #[test]
    fn test_apply_writes_spec() {
        let dir = TempDir::new().unwrap();
        let mut spec = SpecGenerator::new_linux();
        systemd_at(dir.path(), CgroupMode::Unified)
            .apply("pod.slice", "abc", &mut spec)
            .unwrap();
        assert_eq!(spec.cgroups_path(), Some("pod.slice:crio:abc"));
        assert_eq!(spec.annotation(annotations::CGROUP_PARENT), Some("pod.slice"));
    }
}
