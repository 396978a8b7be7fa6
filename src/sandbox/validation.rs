/*!
 * Request Validation
 * Label, log path and hostname checks applied before provisioning
 */

use super::annotations::RESERVED_PREFIX;
use crate::core::errors::{ProvisionError, ProvisionResult};
use crate::core::id::short_id;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound on the combined size of one label key and value
pub const MAX_LABEL_SIZE: usize = 4096;

/// Reject malformed or reserved label keys and oversized entries
pub fn validate_labels(labels: &BTreeMap<String, String>) -> ProvisionResult<()> {
    for (key, value) in labels {
        if key.is_empty() {
            return Err(ProvisionError::validation("label key must not be empty"));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ProvisionError::validation(format!(
                "label key {:?} contains whitespace or control characters",
                key
            )));
        }
        if key.starts_with(RESERVED_PREFIX) {
            return Err(ProvisionError::validation(format!(
                "label key {:?} uses the reserved prefix {}",
                key, RESERVED_PREFIX
            )));
        }
        if key.len() + value.len() > MAX_LABEL_SIZE {
            return Err(ProvisionError::validation(format!(
                "label {:?} exceeds {} bytes",
                key, MAX_LABEL_SIZE
            )));
        }
    }
    Ok(())
}

/// Resolve and create the pod log directory
///
/// An empty request falls back to `<default_root>/<id>`. The directory must
/// be absolute and is created with mode 0700.
pub fn prepare_log_dir(requested: &str, default_root: &Path, id: &str) -> ProvisionResult<PathBuf> {
    let log_dir = if requested.is_empty() {
        default_root.join(id)
    } else {
        PathBuf::from(requested)
    };

    if !log_dir.is_absolute() {
        return Err(ProvisionError::validation(format!(
            "requested logDir for sbox id {} is a relative path: {}",
            id,
            log_dir.display()
        )));
    }

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(&log_dir)
        .map_err(|e| {
            ProvisionError::io(format!("creating log directory {}", log_dir.display()), e)
        })?;
    Ok(log_dir)
}

/// Make sure nothing dangerous sits at a container log path
///
/// A dangling symlink is removed so the runtime can create the file. A
/// directory cannot be replaced and is rejected.
pub fn ensure_sane_log_path(log_path: &Path) -> ProvisionResult<()> {
    let meta = match fs::symlink_metadata(log_path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(ProvisionError::io(
                format!("inspecting log path {}", log_path.display()),
                e,
            ))
        }
    };

    if meta.file_type().is_symlink() {
        if let Err(e) = fs::metadata(log_path) {
            if e.kind() != ErrorKind::NotFound {
                return Err(ProvisionError::io(
                    format!("resolving log path {}", log_path.display()),
                    e,
                ));
            }
            warn!(path = %log_path.display(), "removing dangling log symlink");
            fs::remove_file(log_path).map_err(|e| {
                ProvisionError::io(format!("removing dangling symlink {}", log_path.display()), e)
            })?;
        }
        return Ok(());
    }

    if meta.is_dir() {
        return Err(ProvisionError::validation(format!(
            "container log path {} is a directory",
            log_path.display()
        )));
    }

    debug!(path = %log_path.display(), "reusing existing log file");
    Ok(())
}

/// Sandbox hostname
///
/// An explicit hostname wins. Otherwise host-network sandboxes get none and
/// the rest use the short pod id.
pub fn get_hostname(explicit: &str, id: &str, host_network: bool) -> String {
    if !explicit.is_empty() {
        explicit.to_string()
    } else if host_network {
        String::new()
    } else {
        short_id(id).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorKind as ProvisionErrorKind;
    use tempfile::TempDir;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_labels() {
        validate_labels(&labels(&[("app", "web"), ("tier", "")])).unwrap();

        for bad in [
            labels(&[("", "x")]),
            labels(&[("bad key", "x")]),
            labels(&[("io.kubernetes.cri-o.Name", "x")]),
            labels(&[("big", &"v".repeat(MAX_LABEL_SIZE))]),
        ] {
            let err = validate_labels(&bad).unwrap_err();
            assert_eq!(err.kind(), ProvisionErrorKind::Validation);
        }
    }

    #[test]
    fn test_log_dir() {
        let dir = TempDir::new().unwrap();
        let created = prepare_log_dir("", dir.path(), "abc").unwrap();
        assert_eq!(created, dir.path().join("abc"));
        assert!(created.is_dir());

        let err = prepare_log_dir("relative/logs", dir.path(), "abc").unwrap_err();
        assert_eq!(err.kind(), ProvisionErrorKind::Validation);
    }

    #[test]
    fn test_log_path_checks() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.log");
        ensure_sane_log_path(&missing).unwrap();

        let dangling = dir.path().join("dangling.log");
        std::os::unix::fs::symlink(dir.path().join("nowhere"), &dangling).unwrap();
        ensure_sane_log_path(&dangling).unwrap();
        assert!(fs::symlink_metadata(&dangling).is_err());

        let as_dir = dir.path().join("dir.log");
        fs::create_dir(&as_dir).unwrap();
        assert!(ensure_sane_log_path(&as_dir).is_err());
    }

    #[test]
    fn test_hostname() {
        let id = "0123456789abcdef0123";
        assert_eq!(get_hostname("web-0", id, false), "web-0");
        assert_eq!(get_hostname("", id, false), "0123456789ab");
        assert_eq!(get_hostname("", id, true), "");
    }
}
