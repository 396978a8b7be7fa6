/*!
 * Capabilities
 */

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown capability {0:?}")]
pub struct UnknownCapability(pub String);

/// Every capability the runtime understands
pub const ALL_CAPABILITIES: &[&str] = &[
    "CAP_AUDIT_CONTROL",
    "CAP_AUDIT_READ",
    "CAP_AUDIT_WRITE",
    "CAP_BLOCK_SUSPEND",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_KILL",
    "CAP_LEASE",
    "CAP_LINUX_IMMUTABLE",
    "CAP_MAC_ADMIN",
    "CAP_MAC_OVERRIDE",
    "CAP_MKNOD",
    "CAP_NET_ADMIN",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_RAW",
    "CAP_PERFMON",
    "CAP_SETFCAP",
    "CAP_SETGID",
    "CAP_SETPCAP",
    "CAP_SETUID",
    "CAP_SYSLOG",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_CHROOT",
    "CAP_SYS_MODULE",
    "CAP_SYS_NICE",
    "CAP_SYS_PACCT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_WAKE_ALARM",
];

/// Canonical `CAP_*` names for a configured list
///
/// Names are case-insensitive and may omit the `CAP_` prefix. `ALL` expands
/// to every known capability. Duplicates are dropped, order is kept.
pub fn normalize(names: &[String]) -> Result<Vec<String>, UnknownCapability> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());

    for name in names {
        let upper = name.trim().to_ascii_uppercase();
        if upper == "ALL" {
            for cap in ALL_CAPABILITIES {
                if !out.iter().any(|c| c == cap) {
                    out.push(cap.to_string());
                }
            }
            continue;
        }

        let canonical = if upper.starts_with("CAP_") {
            upper
        } else {
            format!("CAP_{}", upper)
        };
        if !ALL_CAPABILITIES.contains(&canonical.as_str()) {
            return Err(UnknownCapability(name.clone()));
        }
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let caps = normalize(&["chown".into(), "CAP_KILL".into(), "Chown".into()]).unwrap();
        assert_eq!(caps, vec!["CAP_CHOWN", "CAP_KILL"]);
    }

    #[test]
    fn test_all_and_unknown() {
        assert_eq!(normalize(&["all".into()]).unwrap().len(), ALL_CAPABILITIES.len());
        assert!(normalize(&["CAP_FLY".into()]).is_err());
    }
}
