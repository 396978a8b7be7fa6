/*!
 * Spec Generator
 * Mutating builder over a runtime spec with Linux defaults
 */

use super::*;
use std::path::Path;
use tracing::debug;

const DEFAULT_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

const DEFAULT_MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/sys/firmware",
    "/proc/scsi",
];

const DEFAULT_READONLY_PATHS: &[&str] = &[
    "/proc/asound",
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
];

/// Owns the runtime spec under construction
///
/// Each pipeline step borrows the generator mutably for the duration of a
/// call; nothing retains a reference to it afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGenerator {
    spec: RuntimeSpec,
}

impl SpecGenerator {
    /// Generator seeded with the default Linux mounts, namespaces and capabilities
    pub fn new_linux() -> Self {
        let caps: Vec<String> = DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect();

        let spec = RuntimeSpec {
            oci_version: "1.0.2".to_string(),
            process: Process {
                terminal: false,
                user: User::default(),
                args: vec!["sh".to_string()],
                env: vec![
                    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"
                        .to_string(),
                    "TERM=xterm".to_string(),
                ],
                cwd: "/".to_string(),
                capabilities: Some(Capabilities {
                    bounding: caps.clone(),
                    effective: caps.clone(),
                    inheritable: caps.clone(),
                    permitted: caps,
                    ambient: Vec::new(),
                }),
                rlimits: vec![Rlimit {
                    kind: "RLIMIT_NOFILE".to_string(),
                    hard: 1024,
                    soft: 1024,
                }],
                no_new_privileges: true,
                oom_score_adj: None,
                selinux_label: String::new(),
            },
            root: Root {
                path: PathBuf::from("rootfs"),
                readonly: false,
            },
            hostname: String::new(),
            mounts: default_mounts(),
            annotations: BTreeMap::new(),
            linux: Linux {
                namespaces: [
                    LinuxNamespaceType::Pid,
                    LinuxNamespaceType::Network,
                    LinuxNamespaceType::Ipc,
                    LinuxNamespaceType::Uts,
                    LinuxNamespaceType::Mount,
                ]
                .into_iter()
                .map(|kind| LinuxNamespace {
                    kind,
                    path: String::new(),
                })
                .collect(),
                masked_paths: DEFAULT_MASKED_PATHS.iter().map(|p| p.to_string()).collect(),
                readonly_paths: DEFAULT_READONLY_PATHS.iter().map(|p| p.to_string()).collect(),
                ..Linux::default()
            },
        };

        Self { spec }
    }

    pub fn spec(&self) -> &RuntimeSpec {
        &self.spec
    }

    pub fn into_spec(self) -> RuntimeSpec {
        self.spec
    }

    // Mounts

    pub fn add_mount(&mut self, mount: Mount) {
        self.spec.mounts.push(mount);
    }

    /// Remove every mount targeting `destination`
    pub fn remove_mount(&mut self, destination: impl AsRef<Path>) {
        let destination = destination.as_ref();
        self.spec.mounts.retain(|m| m.destination != destination);
    }

    pub fn mount(&self, destination: impl AsRef<Path>) -> Option<&Mount> {
        let destination = destination.as_ref();
        self.spec.mounts.iter().find(|m| m.destination == destination)
    }

    // Annotations

    /// Insert or overwrite an annotation; the last write for a key wins
    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.spec.annotations.insert(key.into(), value.into());
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.spec.annotations.get(key).map(String::as_str)
    }

    // Process

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.spec.hostname = hostname.into();
    }

    pub fn set_process_args(&mut self, args: Vec<String>) {
        self.spec.process.args = args;
    }

    pub fn set_process_selinux_label(&mut self, label: impl Into<String>) {
        self.spec.process.selinux_label = label.into();
    }

    pub fn set_process_oom_score_adj(&mut self, adj: i32) {
        self.spec.process.oom_score_adj = Some(adj);
    }

    pub fn clear_process_rlimits(&mut self) {
        self.spec.process.rlimits.clear();
    }

    pub fn add_process_rlimit(&mut self, kind: impl Into<String>, hard: u64, soft: u64) {
        self.spec.process.rlimits.push(Rlimit {
            kind: kind.into(),
            hard,
            soft,
        });
    }

    /// Replace every capability set with `caps`
    pub fn set_capabilities(&mut self, caps: Vec<String>) {
        self.spec.process.capabilities = Some(Capabilities {
            bounding: caps.clone(),
            effective: caps.clone(),
            inheritable: caps.clone(),
            permitted: caps,
            ambient: Vec::new(),
        });
    }

    pub fn clear_capabilities(&mut self) {
        self.spec.process.capabilities = Some(Capabilities::default());
    }

    // Root

    pub fn set_root_path(&mut self, path: impl Into<PathBuf>) {
        self.spec.root.path = path.into();
    }

    pub fn set_root_readonly(&mut self, readonly: bool) {
        self.spec.root.readonly = readonly;
    }

    // Linux

    pub fn set_linux_mount_label(&mut self, label: impl Into<String>) {
        self.spec.linux.mount_label = label.into();
    }

    pub fn set_cgroups_path(&mut self, path: impl Into<String>) {
        self.spec.linux.cgroups_path = Some(path.into());
    }

    pub fn cgroups_path(&self) -> Option<&str> {
        self.spec.linux.cgroups_path.as_deref()
    }

    pub fn set_cpu_shares(&mut self, shares: u64) {
        let resources = self.spec.linux.resources.get_or_insert_with(Resources::default);
        resources.cpu.get_or_insert_with(CpuResources::default).shares = Some(shares);
    }

    pub fn add_sysctl(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.spec.linux.sysctl.insert(key.into(), value.into());
    }

    pub fn add_uid_mapping(&mut self, host_id: u32, container_id: u32, size: u32) {
        self.spec.linux.uid_mappings.push(LinuxIdMapping {
            container_id,
            host_id,
            size,
        });
    }

    pub fn add_gid_mapping(&mut self, host_id: u32, container_id: u32, size: u32) {
        self.spec.linux.gid_mappings.push(LinuxIdMapping {
            container_id,
            host_id,
            size,
        });
    }

    pub fn set_seccomp(&mut self, seccomp: Option<Seccomp>) {
        self.spec.linux.seccomp = seccomp;
    }

    // Namespaces

    /// Add a namespace entry, or point an existing one at `path`
    pub fn add_or_replace_namespace(&mut self, kind: LinuxNamespaceType, path: impl Into<String>) {
        let path = path.into();
        match self.spec.linux.namespaces.iter_mut().find(|ns| ns.kind == kind) {
            Some(ns) => ns.path = path,
            None => self.spec.linux.namespaces.push(LinuxNamespace { kind, path }),
        }
    }

    pub fn remove_namespace(&mut self, kind: LinuxNamespaceType) {
        self.spec.linux.namespaces.retain(|ns| ns.kind != kind);
    }

    pub fn namespace(&self, kind: LinuxNamespaceType) -> Option<&LinuxNamespace> {
        self.spec.linux.namespaces.iter().find(|ns| ns.kind == kind)
    }

    // Export

    /// Serialize the runtime spec once
    pub fn to_json(&self) -> SpecResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.spec)?)
    }

    /// Write the same serialized bytes to every path
    pub fn save_to_files<P: AsRef<Path>>(&self, paths: &[P]) -> SpecResult<Vec<u8>> {
        let bytes = self.to_json()?;
        for path in paths {
            let path = path.as_ref();
            std::fs::write(path, &bytes).map_err(|source| SpecError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), bytes = bytes.len(), "runtime spec written");
        }
        Ok(bytes)
    }
}

impl Default for SpecGenerator {
    fn default() -> Self {
        Self::new_linux()
    }
}

fn default_mounts() -> Vec<Mount> {
    let mount = |dest: &str, kind: &str, source: &str, options: &[&str]| Mount {
        destination: PathBuf::from(dest),
        kind: kind.to_string(),
        source: PathBuf::from(source),
        options: options.iter().map(|o| o.to_string()).collect(),
    };

    vec![
        mount("/proc", "proc", "proc", &["nosuid", "noexec", "nodev"]),
        mount(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        mount(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
        ),
        mount(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        mount("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        mount("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
        mount(
            "/sys/fs/cgroup",
            "cgroup",
            "cgroup",
            &["nosuid", "noexec", "nodev", "relatime", "ro"],
        ),
    ]
}
