/*!
 * Runtime Configuration
 * Operator configuration for sandbox provisioning, loaded from JSON
 */

pub mod types;

pub use types::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "SANDBOXD_CONFIG";

/// Runtime-wide provisioning configuration
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Durable per-sandbox directories
    pub root: PathBuf,
    /// Ephemeral per-sandbox directories
    pub run_root: PathBuf,
    /// Pod log root used when a request has no log directory
    pub log_dir: PathBuf,
    pub pause_image: String,
    pub pause_image_auth_file: Option<PathBuf>,
    /// Infra process command; empty means "derive it from the pause image"
    pub pause_command: String,
    pub cgroup_manager: CgroupManager,
    /// `Some` replaces the runtime spec's capability sets with this list
    pub default_capabilities: Option<Vec<String>>,
    /// `key=value` entries
    pub default_sysctls: Vec<String>,
    /// `name=soft:hard` entries
    pub default_ulimits: Vec<String>,
    pub default_runtime: String,
    pub runtimes: BTreeMap<String, RuntimeHandler>,
    /// Create and own network/IPC/UTS namespaces instead of leaving them to the runtime
    pub manage_ns_lifecycle: bool,
    /// Where managed namespaces are pinned
    pub namespaces_dir: PathBuf,
    pub seccomp_disabled: bool,
    /// Profile used for `runtime/default`; built-in profile when unset
    pub seccomp_profile: Option<PathBuf>,
    /// `containerID:hostID:size`, comma separated
    pub uid_mappings: String,
    pub gid_mappings: String,
    /// Copied into the sandbox when the request has an empty DNS config
    pub host_resolv_conf: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut runtimes = BTreeMap::new();
        runtimes.insert("runc".to_string(), RuntimeHandler::default());

        Self {
            root: PathBuf::from("/var/lib/containers/storage"),
            run_root: PathBuf::from("/run/containers/storage"),
            log_dir: PathBuf::from("/var/log/crio/pods"),
            pause_image: "k8s.gcr.io/pause:3.2".to_string(),
            pause_image_auth_file: None,
            pause_command: "/pause".to_string(),
            cgroup_manager: CgroupManager::Systemd,
            default_capabilities: None,
            default_sysctls: Vec::new(),
            default_ulimits: Vec::new(),
            default_runtime: "runc".to_string(),
            runtimes,
            manage_ns_lifecycle: false,
            namespaces_dir: PathBuf::from("/var/run"),
            seccomp_disabled: false,
            seccomp_profile: None,
            uid_mappings: String::new(),
            gid_mappings: String::new(),
            host_resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RuntimeConfig =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        info!(path = %path.display(), "Runtime configuration loaded");
        Ok(config)
    }

    /// Load from `$SANDBOXD_CONFIG`, or use defaults when unset
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => {
                info!("{} not set, using default runtime configuration", CONFIG_ENV);
                Ok(Self::default())
            }
        }
    }

    /// Reject configurations the pipeline cannot act on
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.runtimes.contains_key(&self.default_runtime) {
            return Err(ConfigError::Invalid(format!(
                "default runtime {:?} not found in runtimes",
                self.default_runtime
            )));
        }
        self.ulimits()?;
        self.id_mappings()?;
        Ok(())
    }

    /// Parsed default ulimits
    pub fn ulimits(&self) -> ConfigResult<Vec<Ulimit>> {
        self.default_ulimits.iter().map(|u| u.parse()).collect()
    }

    /// Parsed id mappings, `None` when remapping is not configured
    pub fn id_mappings(&self) -> ConfigResult<Option<IdMappings>> {
        let mappings = IdMappings::parse(&self.uid_mappings, &self.gid_mappings)?;
        Ok((!mappings.is_empty()).then_some(mappings))
    }

    /// Resolve a runtime handler name, empty meaning the default runtime
    pub fn runtime_handler(&self, name: &str) -> ConfigResult<(String, &RuntimeHandler)> {
        let name = if name.is_empty() {
            self.default_runtime.as_str()
        } else {
            name
        };
        self.runtimes
            .get(name)
            .map(|handler| (name.to_string(), handler))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "failed to find runtime handler {} from runtime list {:?}",
                    name,
                    self.runtimes.keys().collect::<Vec<_>>()
                ))
            })
    }
}
