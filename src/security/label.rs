/*!
 * SELinux Labeling
 * Process/mount label generation and file relabeling
 */

use crate::sandbox::request::SelinuxOptions;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

const SELINUX_FS: &str = "/sys/fs/selinux";
const DEFAULT_PROCESS_LABEL: [&str; 3] = ["system_u", "system_r", "container_t"];
const DEFAULT_MOUNT_LABEL: [&str; 3] = ["system_u", "object_r", "container_file_t"];

#[derive(Error, Debug)]
pub enum LabelError {
    /// The filesystem does not support security labels
    #[error("labeling not supported on {0:?}")]
    Unsupported(PathBuf),

    #[error("failed to relabel {path:?}: {reason}")]
    Failed { path: PathBuf, reason: String },

    #[error("invalid label option {0:?}")]
    InvalidOption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Applies security labels to files
pub trait Labeler: Send + Sync {
    /// Label `path` with `label`; `shared` drops the MCS categories
    fn relabel(&self, path: &Path, label: &str, shared: bool) -> Result<(), LabelError>;
}

/// Relabel, treating an unsupported filesystem as success
pub fn relabel_tolerant(
    labeler: &dyn Labeler,
    path: &Path,
    label: &str,
    shared: bool,
) -> Result<(), LabelError> {
    match labeler.relabel(path, label, shared) {
        Err(LabelError::Unsupported(_)) => {
            debug!(path = %path.display(), "labeling not supported, skipping");
            Ok(())
        }
        other => other,
    }
}

/// Whether SELinux is active on this host
pub fn selinux_enabled() -> bool {
    Path::new(SELINUX_FS).join("enforce").exists()
}

/// `key:value` label options from the request's SELinux options
pub fn label_options(options: &SelinuxOptions) -> Vec<String> {
    [
        ("user", &options.user),
        ("role", &options.role),
        ("type", &options.r#type),
        ("level", &options.level),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}:{}", k, v))
    .collect()
}

/// Process and mount label pair for one sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityLabels {
    pub process_label: String,
    pub mount_label: String,
}

impl SecurityLabels {
    /// Build labels from `key:value` options
    ///
    /// Returns empty labels when SELinux is disabled. Without a requested
    /// level, a random MCS category pair is chosen.
    pub fn init(options: &[String], enabled: bool) -> Result<Self, LabelError> {
        if !enabled {
            return Ok(Self::default());
        }

        let mut process = DEFAULT_PROCESS_LABEL.map(str::to_string);
        let mut mount_type = DEFAULT_MOUNT_LABEL[2].to_string();
        let mut mount_user = DEFAULT_MOUNT_LABEL[0].to_string();
        let mut level = None;

        for option in options {
            let (key, value) = option
                .split_once(':')
                .ok_or_else(|| LabelError::InvalidOption(option.clone()))?;
            match key {
                "user" => {
                    process[0] = value.to_string();
                    mount_user = value.to_string();
                }
                "role" => process[1] = value.to_string(),
                "type" => process[2] = value.to_string(),
                "level" => level = Some(value.to_string()),
                "filetype" => mount_type = value.to_string(),
                "disable" => return Ok(Self::default()),
                _ => return Err(LabelError::InvalidOption(option.clone())),
            }
        }

        let level = level.unwrap_or_else(random_mcs_level);
        Ok(Self {
            process_label: format!("{}:{}", process.join(":"), level),
            mount_label: format!(
                "{}:{}:{}:{}",
                mount_user, DEFAULT_MOUNT_LABEL[1], mount_type, level
            ),
        })
    }
}

fn random_mcs_level() -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let a = u16::from_le_bytes([bytes[0], bytes[1]]) % 1024;
    let mut b = u16::from_le_bytes([bytes[2], bytes[3]]) % 1024;
    if a == b {
        b = (b + 1) % 1024;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    format!("s0:c{},c{}", lo, hi)
}

/// Append a `context=` option carrying `label` to mount data
pub fn format_mount_label(options: &str, label: &str) -> String {
    if label.is_empty() {
        return options.to_string();
    }
    if options.is_empty() {
        format!("context=\"{}\"", label)
    } else {
        format!("{},context=\"{}\"", options, label)
    }
}

/// Labeler shelling out to `chcon`
#[derive(Debug, Clone, Default)]
pub struct ChconLabeler;

impl Labeler for ChconLabeler {
    fn relabel(&self, path: &Path, label: &str, shared: bool) -> Result<(), LabelError> {
        if label.is_empty() {
            return Ok(());
        }
        if !selinux_enabled() {
            return Err(LabelError::Unsupported(path.to_path_buf()));
        }

        let label = if shared { shared_label(label) } else { label.to_string() };
        let output = Command::new("chcon").arg(&label).arg(path).output()?;
        if output.status.success() {
            debug!(path = %path.display(), label = %label, "relabeled");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Operation not supported") {
            return Err(LabelError::Unsupported(path.to_path_buf()));
        }
        Err(LabelError::Failed {
            path: path.to_path_buf(),
            reason: stderr.trim().to_string(),
        })
    }
}

fn shared_label(label: &str) -> String {
    let fields: Vec<&str> = label.splitn(4, ':').collect();
    match fields.as_slice() {
        [user, role, kind, _level] => format!("{}:{}:{}:s0", user, role, kind),
        _ => label.to_string(),
    }
}

/// Labeler that accepts everything, or reports labels as unsupported
#[derive(Debug, Clone, Default)]
pub struct NoopLabeler {
    pub unsupported: bool,
}

impl Labeler for NoopLabeler {
    fn relabel(&self, path: &Path, _label: &str, _shared: bool) -> Result<(), LabelError> {
        if self.unsupported {
            return Err(LabelError::Unsupported(path.to_path_buf()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_options() {
        let opts = SelinuxOptions {
            user: "u".into(),
            role: String::new(),
            r#type: "spc_t".into(),
            level: "s0:c1,c2".into(),
        };
        assert_eq!(label_options(&opts), vec!["user:u", "type:spc_t", "level:s0:c1,c2"]);
    }

    #[test]
    fn test_init_labels() {
        let labels = SecurityLabels::init(&["level:s0:c1,c2".to_string()], true).unwrap();
        assert_eq!(labels.process_label, "system_u:system_r:container_t:s0:c1,c2");
        assert_eq!(labels.mount_label, "system_u:object_r:container_file_t:s0:c1,c2");

        let disabled = SecurityLabels::init(&[], false).unwrap();
        assert!(disabled.process_label.is_empty());

        let random = SecurityLabels::init(&[], true).unwrap();
        assert!(random.process_label.contains(":s0:c"));

        assert!(SecurityLabels::init(&["bogus".to_string()], true).is_err());
    }

    #[test]
    fn test_format_mount_label() {
        assert_eq!(format_mount_label("mode=1777", ""), "mode=1777");
        assert_eq!(
            format_mount_label("mode=1777", "system_u:object_r:container_file_t:s0"),
            "mode=1777,context=\"system_u:object_r:container_file_t:s0\""
        );
    }

    #[test]
    fn test_relabel_tolerates_unsupported() {
        let labeler = NoopLabeler { unsupported: true };
        let path = Path::new("/tmp/x");
        assert!(labeler.relabel(path, "l", false).is_err());
        assert!(relabel_tolerant(&labeler, path, "l", false).is_ok());
    }

    #[test]
    fn test_shared_label() {
        assert_eq!(shared_label("u:r:t:s0:c1,c2"), "u:r:t:s0");
    }
}
