/*!
 * Configuration Types
 * Typed sub-structures of the runtime configuration
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration operation result
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How cgroup paths are expressed to the low-level runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgroupManager {
    /// Hierarchical systemd slices, `slice:prefix:name` paths
    #[default]
    Systemd,
    /// Raw cgroup filesystem paths
    Cgroupfs,
}

impl CgroupManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            CgroupManager::Systemd => "systemd",
            CgroupManager::Cgroupfs => "cgroupfs",
        }
    }
}

impl fmt::Display for CgroupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CgroupManager {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "systemd" => Ok(CgroupManager::Systemd),
            "cgroupfs" => Ok(CgroupManager::Cgroupfs),
            other => Err(ConfigError::Invalid(format!(
                "unknown cgroup manager {:?}",
                other
            ))),
        }
    }
}

/// One contiguous id range mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    pub container_id: u32,
    pub host_id: u32,
    pub size: u32,
}

impl IdMap {
    fn host_id_for(&self, container_id: u32) -> Option<u32> {
        let offset = container_id.checked_sub(self.container_id)?;
        (offset < self.size).then(|| self.host_id + offset)
    }
}

/// User-namespace id remapping applied to every sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMappings {
    pub uids: Vec<IdMap>,
    pub gids: Vec<IdMap>,
}

impl IdMappings {
    /// Parse `containerID:hostID:size` lists, comma separated
    pub fn parse(uid_spec: &str, gid_spec: &str) -> ConfigResult<Self> {
        Ok(Self {
            uids: parse_id_maps(uid_spec)?,
            gids: parse_id_maps(gid_spec)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty() && self.gids.is_empty()
    }

    /// Host uid/gid that container root maps to
    ///
    /// Falls back to 0 for an axis without a mapping for container root.
    pub fn root_pair(&self) -> (u32, u32) {
        let lookup = |maps: &[IdMap]| maps.iter().find_map(|m| m.host_id_for(0)).unwrap_or(0);
        (lookup(&self.uids), lookup(&self.gids))
    }
}

fn parse_id_maps(spec: &str) -> ConfigResult<Vec<IdMap>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            let parsed: Option<Vec<u32>> = parts.iter().map(|p| p.parse().ok()).collect();
            match parsed.as_deref() {
                Some([container_id, host_id, size]) if *size > 0 => Ok(IdMap {
                    container_id: *container_id,
                    host_id: *host_id,
                    size: *size,
                }),
                _ => Err(ConfigError::Invalid(format!(
                    "invalid id mapping {:?}, expected containerID:hostID:size",
                    entry
                ))),
            }
        })
        .collect()
}

const ULIMIT_NAMES: &[&str] = &[
    "as", "core", "cpu", "data", "fsize", "locks", "memlock", "msgqueue", "nice", "nofile",
    "nproc", "rss", "rtprio", "rttime", "sigpending", "stack",
];

/// Process resource limit, parsed from `name=soft:hard`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    /// Runtime-spec name, e.g. `RLIMIT_NOFILE`
    pub name: String,
    pub soft: u64,
    pub hard: u64,
}

impl FromStr for Ulimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| ConfigError::Invalid(format!("invalid ulimit {:?}: {}", s, why));

        let (name, limits) = s.split_once('=').ok_or_else(|| invalid("missing '='"))?;
        let name = name.trim().to_ascii_lowercase();
        if !ULIMIT_NAMES.contains(&name.as_str()) {
            return Err(invalid("unknown resource"));
        }

        let (soft, hard) = match limits.split_once(':') {
            Some((soft, hard)) => (soft, hard),
            None => (limits, limits),
        };
        let soft: u64 = soft.trim().parse().map_err(|_| invalid("soft limit is not a number"))?;
        let hard: u64 = hard.trim().parse().map_err(|_| invalid("hard limit is not a number"))?;
        if soft > hard {
            return Err(invalid("soft limit must be less than or equal to hard limit"));
        }

        Ok(Ulimit {
            name: format!("RLIMIT_{}", name.to_ascii_uppercase()),
            soft,
            hard,
        })
    }
}

/// Low-level runtime reachable through a runtime handler name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeHandler {
    pub runtime_path: PathBuf,
    pub runtime_root: PathBuf,
}

impl Default for RuntimeHandler {
    fn default() -> Self {
        Self {
            runtime_path: PathBuf::from("/usr/bin/runc"),
            runtime_root: PathBuf::from("/run/runc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_mappings() {
        let maps = IdMappings::parse("0:100000:65536", "0:200000:65536,65536:300000:10").unwrap();
        assert_eq!(maps.uids.len(), 1);
        assert_eq!(maps.gids.len(), 2);
        assert_eq!(maps.root_pair(), (100000, 200000));
        assert!(!maps.is_empty());
    }

    #[test]
    fn test_root_pair_offset_mapping() {
        let maps = IdMappings::parse("1:5000:10", "").unwrap();
        // Container root not covered by the uid map
        assert_eq!(maps.root_pair(), (0, 0));
    }

    #[test]
    fn test_parse_id_mappings_invalid() {
        assert!(IdMappings::parse("0:100000", "").is_err());
        assert!(IdMappings::parse("0:x:1", "").is_err());
        assert!(IdMappings::parse("0:1:0", "").is_err());
        assert!(IdMappings::parse("", "").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ulimit() {
        let u: Ulimit = "nofile=1024:2048".parse().unwrap();
        assert_eq!(u.name, "RLIMIT_NOFILE");
        assert_eq!((u.soft, u.hard), (1024, 2048));

        let single: Ulimit = "nproc=512".parse().unwrap();
        assert_eq!((single.soft, single.hard), (512, 512));

        assert!("nofile=2048:1024".parse::<Ulimit>().is_err());
        assert!("bogus=1:1".parse::<Ulimit>().is_err());
        assert!("nofile".parse::<Ulimit>().is_err());
    }

    #[test]
    fn test_cgroup_manager_parse() {
        assert_eq!("systemd".parse::<CgroupManager>().unwrap(), CgroupManager::Systemd);
        assert_eq!("cgroupfs".parse::<CgroupManager>().unwrap(), CgroupManager::Cgroupfs);
        assert!("cgroupv3".parse::<CgroupManager>().is_err());
    }
}
