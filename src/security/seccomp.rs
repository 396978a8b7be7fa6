/*!
 * Seccomp Profiles
 * Selecting and loading the infra process syscall filter
 */

use crate::spec::{Seccomp, SeccompSyscall};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PROFILE_UNCONFINED: &str = "unconfined";
pub const PROFILE_RUNTIME_DEFAULT: &str = "runtime/default";
pub const PROFILE_DOCKER_DEFAULT: &str = "docker/default";
pub const PROFILE_LOCALHOST_PREFIX: &str = "localhost/";

#[derive(Error, Debug)]
pub enum SeccompError {
    #[error("unknown seccomp profile option: {0:?}")]
    UnknownProfile(String),

    #[error("seccomp profile path must be absolute: {0:?}")]
    RelativePath(PathBuf),

    #[error("cannot read seccomp profile {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse seccomp profile {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SeccompError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SeccompError::UnknownProfile(_) | SeccompError::RelativePath(_)
        )
    }
}

/// Requested syscall filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeccompProfile {
    Unconfined,
    RuntimeDefault,
    Localhost(PathBuf),
}

impl SeccompProfile {
    /// Interpret a request's profile path; empty means the runtime default
    pub fn parse(profile: &str) -> Result<Self, SeccompError> {
        match profile {
            "" | PROFILE_RUNTIME_DEFAULT | PROFILE_DOCKER_DEFAULT => Ok(Self::RuntimeDefault),
            PROFILE_UNCONFINED => Ok(Self::Unconfined),
            _ => match profile.strip_prefix(PROFILE_LOCALHOST_PREFIX) {
                Some(path) => {
                    let path = PathBuf::from(path);
                    if !path.is_absolute() {
                        return Err(SeccompError::RelativePath(path));
                    }
                    Ok(Self::Localhost(path))
                }
                None => Err(SeccompError::UnknownProfile(profile.to_string())),
            },
        }
    }

    /// Filter to place in the runtime spec; `None` disables seccomp
    ///
    /// The runtime default comes from `default_profile` when configured,
    /// otherwise from the built-in filter.
    pub fn load(&self, default_profile: Option<&Path>) -> Result<Option<Seccomp>, SeccompError> {
        match self {
            Self::Unconfined => Ok(None),
            Self::RuntimeDefault => match default_profile {
                Some(path) => load_file(path).map(Some),
                None => Ok(Some(builtin_profile())),
            },
            Self::Localhost(path) => load_file(path).map(Some),
        }
    }
}

fn load_file(path: &Path) -> Result<Seccomp, SeccompError> {
    let raw = std::fs::read(path).map_err(|source| SeccompError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| SeccompError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

const BLOCKED_SYSCALLS: &[&str] = &[
    "acct",
    "add_key",
    "bpf",
    "clock_adjtime",
    "clock_settime",
    "create_module",
    "delete_module",
    "finit_module",
    "get_kernel_syms",
    "init_module",
    "ioperm",
    "iopl",
    "kcmp",
    "kexec_file_load",
    "kexec_load",
    "keyctl",
    "lookup_dcookie",
    "mount",
    "move_pages",
    "open_by_handle_at",
    "perf_event_open",
    "pivot_root",
    "process_vm_readv",
    "process_vm_writev",
    "ptrace",
    "query_module",
    "quotactl",
    "reboot",
    "request_key",
    "setns",
    "settimeofday",
    "swapoff",
    "swapon",
    "sysfs",
    "umount",
    "umount2",
    "unshare",
    "uselib",
    "userfaultfd",
    "ustat",
    "vm86",
    "vm86old",
];

/// Built-in filter: allow by default, deny host-affecting syscalls with EPERM
pub fn builtin_profile() -> Seccomp {
    Seccomp {
        default_action: "SCMP_ACT_ALLOW".to_string(),
        architectures: vec![
            "SCMP_ARCH_X86_64".to_string(),
            "SCMP_ARCH_X86".to_string(),
            "SCMP_ARCH_AARCH64".to_string(),
        ],
        syscalls: vec![SeccompSyscall {
            names: BLOCKED_SYSCALLS.iter().map(|s| s.to_string()).collect(),
            action: "SCMP_ACT_ERRNO".to_string(),
            errno_ret: Some(1),
        }],
    }
}
