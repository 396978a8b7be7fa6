/*!
 * Sysctls
 * Namespaced kernel parameters and their host-namespace constraints
 */

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SysctlError {
    #[error("{0:?} is not in key=value format")]
    Malformed(String),

    #[error("{key:?} not allowed with host {namespace} enabled")]
    HostNamespace { key: String, namespace: &'static str },

    #[error("{0} not whitelisted")]
    NotNamespaced(String),
}

const IPC_KEYS: &[&str] = &[
    "kernel.sem",
    "kernel.shmall",
    "kernel.shmmax",
    "kernel.shmmni",
    "kernel.msgmax",
    "kernel.msgmnb",
    "kernel.msgmni",
    "kernel.shm_rmid_forced",
];

const NET: &str = "net";
const IPC: &str = "ipc";

const PREFIXES: &[(&str, &str)] = &[("net.", NET), ("fs.mqueue.", IPC)];

/// A `key=value` kernel parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysctl {
    key: String,
    value: String,
}

impl Sysctl {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check the key belongs to a namespace the sandbox owns
    pub fn validate(&self, host_network: bool, host_ipc: bool) -> Result<(), SysctlError> {
        let namespace = if IPC_KEYS.contains(&self.key.as_str()) {
            IPC
        } else {
            PREFIXES
                .iter()
                .find(|(prefix, _)| self.key.starts_with(prefix))
                .map(|(_, ns)| *ns)
                .ok_or_else(|| SysctlError::NotNamespaced(self.key.clone()))?
        };

        let shared = match namespace {
            NET => host_network,
            _ => host_ipc,
        };
        if shared {
            return Err(SysctlError::HostNamespace {
                key: self.key.clone(),
                namespace,
            });
        }
        Ok(())
    }
}

impl FromStr for Sysctl {
    type Err = SysctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(Sysctl {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(SysctlError::Malformed(s.to_string())),
        }
    }
}

impl fmt::Display for Sysctl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sysctl(s: &str) -> Sysctl {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse() {
        let s = sysctl("net.ipv4.ip_forward = 1");
        assert_eq!(s.key(), "net.ipv4.ip_forward");
        assert_eq!(s.value(), "1");
        assert!("noequals".parse::<Sysctl>().is_err());
        assert!("=1".parse::<Sysctl>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(sysctl("net.core.somaxconn=1024").validate(false, false).is_ok());
        assert!(sysctl("kernel.shmmax=1").validate(false, false).is_ok());
        assert!(sysctl("fs.mqueue.msg_max=10").validate(false, false).is_ok());

        assert!(matches!(
            sysctl("net.core.somaxconn=1024").validate(true, false),
            Err(SysctlError::HostNamespace { namespace: "net", .. })
        ));
        assert!(sysctl("kernel.sem=1").validate(false, true).is_err());
        assert!(sysctl("fs.mqueue.msg_max=10").validate(false, true).is_err());
        assert!(matches!(
            sysctl("vm.swappiness=10").validate(false, false),
            Err(SysctlError::NotNamespaced(_))
        ));
    }
}
