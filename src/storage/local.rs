/*!
 * Local Storage
 * Directory-backed sandbox storage
 */

use super::*;
use crate::security::label::{selinux_enabled, SecurityLabels};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::Path;
use tracing::{debug, info};

const CONTAINERS_DIR: &str = "overlay-containers";
const ROOTFS_DIR: &str = "rootfs";

#[derive(Debug, Clone)]
struct Record {
    name: String,
    info: ContainerInfo,
}

/// Storage keeping each sandbox in `<root>/overlay-containers/<id>`
pub struct LocalStorage {
    root: PathBuf,
    run_root: PathBuf,
    images: DashMap<String, ImageConfig, RandomState>,
    names: DashMap<String, String, RandomState>,
    containers: DashMap<String, Record, RandomState>,
    selinux: bool,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, run_root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let run_root = run_root.into();
        info!(root = %root.display(), run_root = %run_root.display(), "Local storage initialized");
        Self {
            root,
            run_root,
            images: DashMap::with_hasher(RandomState::new()),
            names: DashMap::with_hasher(RandomState::new()),
            containers: DashMap::with_hasher(RandomState::new()),
            selinux: selinux_enabled(),
        }
    }

    /// Register the configuration of an image
    pub fn with_image(self, image: impl Into<String>, config: ImageConfig) -> Self {
        self.images.insert(image.into(), config);
        self
    }

    /// Generate security labels as if SELinux were enabled or disabled
    pub fn with_selinux(mut self, enabled: bool) -> Self {
        self.selinux = enabled;
        self
    }

    pub fn exists(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    fn image_config(&self, image: &str) -> ImageConfig {
        self.images
            .get(image)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| ImageConfig {
                entrypoint: vec!["/pause".to_string()],
                ..ImageConfig::default()
            })
    }

    fn container_dir(base: &Path, id: &str) -> PathBuf {
        base.join(CONTAINERS_DIR).join(id)
    }
}

fn create_dir(path: &Path) -> StorageResult<()> {
    std::fs::create_dir_all(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_dir(path: &Path) -> StorageResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl StorageService for LocalStorage {
    fn create_pod_sandbox(&self, request: &SandboxStorageRequest) -> StorageResult<ContainerInfo> {
        if request.name.is_empty() || request.id.is_empty() {
            return Err(StorageError::Backend("sandbox name and id are required".into()));
        }

        match self.names.entry(request.name.clone()) {
            Entry::Occupied(_) => return Err(StorageError::DuplicateName(request.name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(request.id.clone());
            }
        }

        let allocate = || -> StorageResult<ContainerInfo> {
            let labels = SecurityLabels::init(&request.label_options, self.selinux)
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            let dir = Self::container_dir(&self.root, &request.id).join("userdata");
            let run_dir = Self::container_dir(&self.run_root, &request.id).join("userdata");
            create_dir(&dir)?;
            create_dir(&run_dir)?;

            Ok(ContainerInfo {
                id: request.id.clone(),
                dir,
                run_dir,
                config: self.image_config(&request.image),
                process_label: labels.process_label,
                mount_label: labels.mount_label,
            })
        };

        match allocate() {
            Ok(info) => {
                debug!(id = %request.id, name = %request.name, dir = %info.dir.display(), "sandbox storage created");
                self.containers.insert(
                    request.id.clone(),
                    Record {
                        name: request.name.clone(),
                        info: info.clone(),
                    },
                );
                Ok(info)
            }
            Err(e) => {
                self.names.remove(&request.name);
                let _ = remove_dir(&Self::container_dir(&self.root, &request.id));
                let _ = remove_dir(&Self::container_dir(&self.run_root, &request.id));
                Err(e)
            }
        }
    }

    fn remove_pod_sandbox(&self, id: &str) -> StorageResult<()> {
        let (_, record) = self
            .containers
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        self.names.remove(&record.name);

        remove_dir(&Self::container_dir(&self.root, id))?;
        remove_dir(&Self::container_dir(&self.run_root, id))?;
        debug!(id, "sandbox storage removed");
        Ok(())
    }

    fn start_container(&self, id: &str) -> StorageResult<PathBuf> {
        let record = self
            .containers
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        // rootfs sits next to the userdata directory
        let mount_point = record.info.dir.with_file_name(ROOTFS_DIR);
        drop(record);
        create_dir(&mount_point)?;
        Ok(mount_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(name: &str, id: &str) -> SandboxStorageRequest {
        SandboxStorageRequest {
            name: name.into(),
            id: id.into(),
            image: "pause".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_start_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("root"), dir.path().join("run"))
            .with_selinux(false);

        let info = storage.create_pod_sandbox(&request("k8s_a", "id1")).unwrap();
        assert!(info.dir.is_dir());
        assert!(info.run_dir.is_dir());
        assert_eq!(info.config.entrypoint, vec!["/pause"]);
        assert!(info.mount_label.is_empty());

        let rootfs = storage.start_container("id1").unwrap();
        assert!(rootfs.is_dir());
        assert_eq!(rootfs, info.dir.parent().unwrap().join("rootfs"));
        assert!(matches!(
            storage.start_container("id2"),
            Err(StorageError::NotFound(_))
        ));

        storage.remove_pod_sandbox("id1").unwrap();
        assert!(!info.dir.exists());
        assert!(!info.run_dir.exists());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("root"), dir.path().join("run"));
        storage.create_pod_sandbox(&request("k8s_a", "id1")).unwrap();

        let err = storage.create_pod_sandbox(&request("k8s_a", "id2")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateName(_)));

        storage.remove_pod_sandbox("id1").unwrap();
        storage.create_pod_sandbox(&request("k8s_a", "id2")).unwrap();
    }

    #[test]
    fn test_registered_image_config() {
        let dir = TempDir::new().unwrap();
        let config = ImageConfig {
            entrypoint: vec![],
            cmd: vec!["/pause".into(), "-v".into()],
            stop_signal: "SIGINT".into(),
        };
        let storage = LocalStorage::new(dir.path().join("root"), dir.path().join("run"))
            .with_image("pause", config.clone());
        let info = storage.create_pod_sandbox(&request("k8s_a", "id1")).unwrap();
        assert_eq!(info.config, config);
    }
}
