/*!
 * Provisioning Pipeline
 * Runs a pod sandbox from reservation to a started infra process
 *
 * Every acquisition pushes its undo onto a compensation stack right after it
 * succeeds. A failing step unwinds the stack in reverse before the error is
 * returned, so a failed call leaves no reservations, mounts or processes.
 */

use super::Server;
use crate::config::RuntimeConfig;
use crate::core::errors::{ProvisionError, ProvisionResult};
use crate::core::guard::CompensationStack;
use crate::core::types::{
    INFRA_CPU_SHARES, INFRA_OOM_SCORE_ADJ, INFRA_STOP_TIMEOUT_SECS, POD_INFRA_CONTAINER_NAME,
};
use crate::monitoring::ProvisionSpan;
use crate::network::NetworkAttachment;
use crate::sandbox::annotations::{self, ip_key};
use crate::sandbox::dns::write_resolv_conf;
use crate::sandbox::pause::pause_command;
use crate::sandbox::request::NamespaceOption;
use crate::sandbox::shm::DEV_SHM_PATH;
use crate::sandbox::validation::{ensure_sane_log_path, get_hostname, prepare_log_dir, validate_labels};
use crate::sandbox::{ContainerParams, InfraContainer, Sandbox, SandboxParams, SandboxRequest};
use crate::security::capability;
use crate::security::label::{label_options, relabel_tolerant};
use crate::security::namespace::HostNamespaces;
use crate::security::{SeccompProfile, Sysctl};
use crate::spec::{LinuxNamespaceType, Mount, SpecGenerator};
use crate::storage::{SandboxStorageRequest, StorageError};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const RESOLV_CONF: &str = "/etc/resolv.conf";
const ETC_HOSTNAME: &str = "/etc/hostname";
const READONLY_BIND: &[&str] = &["ro", "bind", "nodev", "nosuid", "noexec"];

/// When the pod network is attached relative to the infra process start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPhase {
    /// Attach into the managed network namespace before the process starts
    BeforeStart,
    /// Attach to the namespace the started process created
    AfterStart,
}

impl NetworkPhase {
    pub fn for_config(config: &RuntimeConfig) -> Self {
        if config.manage_ns_lifecycle {
            NetworkPhase::BeforeStart
        } else {
            NetworkPhase::AfterStart
        }
    }
}

impl Server {
    /// Provision a pod sandbox and start its infra process
    ///
    /// Returns the new pod id. On failure everything acquired so far is
    /// released before the error of the first failing step is returned.
    pub fn run_pod_sandbox(&self, request: &SandboxRequest) -> ProvisionResult<String> {
        let _update = self.update_lock.read();

        let span = ProvisionSpan::new(&request.config.metadata.name);
        let _entered = span.enter();

        let mut stack = CompensationStack::new();
        let mut step = "start";

        match self.provision(request, &mut stack, &span, &mut step) {
            Ok(id) => {
                stack.commit();
                Ok(id)
            }
            Err(err) => {
                span.record_failure(step);
                warn!(step, error = %err, "failed to run pod sandbox, unwinding");
                let report = stack.unwind();
                if !report.is_clean() {
                    warn!(
                        step,
                        attempted = report.attempted.len(),
                        failed = report.failures.len(),
                        "unwind finished with failures"
                    );
                }
                Err(err)
            }
        }
    }

    fn provision<'s>(
        &'s self,
        request: &SandboxRequest,
        stack: &mut CompensationStack<'s>,
        span: &ProvisionSpan,
        step: &mut &'static str,
    ) -> ProvisionResult<String> {
        let config = &request.config;
        let metadata = &config.metadata;
        let security = &config.linux.security_context;
        let ns_options = request.namespace_options();
        let host_network = ns_options.host_network();
        let host_ipc = ns_options.host_ipc();
        let host_pid = ns_options.host_pid();
        let network_phase = NetworkPhase::for_config(&self.config);

        info!(
            "attempting to run pod sandbox with infra container: {}/{}/{}",
            metadata.namespace, metadata.name, POD_INFRA_CONTAINER_NAME
        );

        *step = "reserve pod name";
        let (id, name) = self.reserve_pod_id_and_name(config)?;
        span.record_id(&id);
        {
            let name = name.clone();
            stack.push("release pod name", move || {
                self.pod_names.release(&name);
                Ok(())
            });
        }

        *step = "reserve infra container name";
        let container_name = self.reserve_infra_container_name(config, &id)?;
        {
            let container_name = container_name.clone();
            stack.push("release infra container name", move || {
                self.ctr_names.release(&container_name);
                Ok(())
            });
        }

        *step = "create sandbox storage";
        let storage_request = SandboxStorageRequest {
            name: name.clone(),
            id: id.clone(),
            image: self.config.pause_image.clone(),
            auth_file: self.config.pause_image_auth_file.clone(),
            container_name: container_name.clone(),
            kube_name: metadata.name.clone(),
            uid: metadata.uid.clone(),
            namespace: metadata.namespace.clone(),
            attempt: metadata.attempt,
            id_mappings: self.id_mappings.clone(),
            label_options: security
                .selinux_options
                .as_ref()
                .map(label_options)
                .unwrap_or_default(),
        };
        let pod_container = match self.storage.create_pod_sandbox(&storage_request) {
            Ok(info) => info,
            Err(StorageError::DuplicateName(_)) => return Err(ProvisionError::AlreadyExists(name)),
            Err(source) => {
                return Err(ProvisionError::Storage {
                    operation: "create sandbox storage",
                    id,
                    source,
                })
            }
        };
        {
            let id = id.clone();
            stack.push("remove sandbox storage", move || {
                self.storage
                    .remove_pod_sandbox(&id)
                    .with_context(|| format!("couldn't cleanup pod sandbox {}", id))
            });
        }
        let mut process_label = pod_container.process_label.clone();
        let mut mount_label = pod_container.mount_label.clone();
        let mut paths_to_chown: Vec<PathBuf> = Vec::new();

        *step = "build runtime spec";
        let mut spec = SpecGenerator::new_linux();
        spec.clear_process_rlimits();
        let ulimits = self
            .config
            .ulimits()
            .map_err(|e| ProvisionError::validation(e.to_string()))?;
        for ulimit in ulimits {
            spec.add_process_rlimit(ulimit.name, ulimit.hard, ulimit.soft);
        }
        spec.set_root_readonly(true);
        spec.set_process_args(pause_command(Some(&self.config), Some(&pod_container.config))?);

        let resolv_path = match &config.dns_config {
            Some(dns) => {
                *step = "configure dns";
                let path = pod_container.run_dir.join("resolv.conf");
                write_resolv_conf(dns, &self.config.host_resolv_conf, &path)?;
                self.relabel(&path, &mount_label)?;
                spec.add_mount(Mount::bind(&path, RESOLV_CONF, READONLY_BIND));
                paths_to_chown.push(path.clone());
                Some(path)
            }
            None => None,
        };

        *step = "validate labels";
        let metadata_json = to_json("metadata", metadata)?;
        validate_labels(&config.labels)?;
        let mut labels = config.labels.clone();
        if !labels.is_empty() {
            labels.insert(
                annotations::KUBERNETES_CONTAINER_NAME_LABEL.to_string(),
                POD_INFRA_CONTAINER_NAME.to_string(),
            );
        }
        let labels_json = to_json("labels", &labels)?;
        let kube_annotations = config.annotations.clone();
        let kube_annotations_json = to_json("annotations", &kube_annotations)?;

        *step = "create log directory";
        let log_dir = prepare_log_dir(&config.log_directory, &self.config.log_dir, &id)?;

        *step = "configure capabilities";
        let privileged = request.privileged();
        if let Some(defaults) = &self.config.default_capabilities {
            spec.clear_capabilities();
            let caps = capability::normalize(defaults)
                .map_err(|e| ProvisionError::validation(e.to_string()))?;
            spec.set_capabilities(caps);
        }
        let ns_options_json = to_json("namespace options", &ns_options)?;

        // labels cannot be enforced across a namespace shared with the host
        if host_pid || host_ipc {
            process_label.clear();
            mount_label.clear();
        }
        spec.set_process_selinux_label(process_label.as_str());
        spec.set_linux_mount_label(mount_label.as_str());

        *step = "provision shm";
        spec.remove_mount(DEV_SHM_PATH);
        let shm_path = self
            .shm
            .provision(&pod_container.run_dir, host_ipc, &mount_label, stack)?;
        if !host_ipc {
            paths_to_chown.push(shm_path.clone());
        }
        spec.add_mount(Mount::bind(&shm_path, DEV_SHM_PATH, &["rw", "bind"]));

        *step = "index container id";
        self.ctr_ids.add(&id)?;
        {
            let id = id.clone();
            stack.push("delete container id from index", move || {
                self.ctr_ids
                    .delete(&id)
                    .with_context(|| format!("couldn't delete ctr id {} from idIndex", id))
            });
        }

        *step = "prepare log path";
        let log_path = log_dir.join(format!("{}.log", id));
        ensure_sane_log_path(&log_path)?;

        let hostname = get_hostname(&config.hostname, &id, host_network);
        spec.set_hostname(hostname.as_str());

        *step = "validate runtime handler";
        let runtime_handler = self.runtime_handler(request)?;

        *step = "annotate runtime spec";
        let created = OffsetDateTime::now_utc();
        let created_str = created.format(&Rfc3339).map_err(|e| {
            ProvisionError::io(
                "formatting creation time",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let port_mappings_json = to_json("port mappings", &config.port_mappings)?;

        spec.add_annotation(annotations::METADATA, metadata_json);
        spec.add_annotation(annotations::LABELS, labels_json);
        spec.add_annotation(annotations::ANNOTATIONS, kube_annotations_json);
        spec.add_annotation(annotations::LOG_PATH, log_path.to_string_lossy());
        spec.add_annotation(annotations::NAME, name.as_str());
        spec.add_annotation(annotations::NAMESPACE, metadata.namespace.as_str());
        spec.add_annotation(annotations::CONTAINER_TYPE, annotations::CONTAINER_TYPE_SANDBOX);
        spec.add_annotation(annotations::SANDBOX_ID, id.as_str());
        spec.add_annotation(annotations::CONTAINER_NAME, container_name.as_str());
        spec.add_annotation(annotations::CONTAINER_ID, id.as_str());
        spec.add_annotation(annotations::SHM_PATH, shm_path.to_string_lossy());
        spec.add_annotation(annotations::PRIVILEGED_RUNTIME, privileged.to_string());
        spec.add_annotation(annotations::RUNTIME_HANDLER, runtime_handler.as_str());
        spec.add_annotation(
            annotations::RESOLV_PATH,
            resolv_path
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        spec.add_annotation(annotations::HOST_NAME, hostname.as_str());
        spec.add_annotation(annotations::NAMESPACE_OPTIONS, ns_options_json);
        spec.add_annotation(annotations::KUBE_NAME, metadata.name.as_str());
        spec.add_annotation(annotations::HOST_NETWORK, host_network.to_string());
        spec.add_annotation(annotations::CONTAINER_MANAGER, annotations::CONTAINER_MANAGER_NAME);
        if !pod_container.config.stop_signal.is_empty() {
            spec.add_annotation(
                annotations::IMAGE_STOP_SIGNAL,
                pod_container.config.stop_signal.as_str(),
            );
        }
        spec.add_annotation(annotations::CREATED, created_str);
        spec.add_annotation(annotations::PORT_MAPPINGS, port_mappings_json);

        *step = "resolve cgroup parent";
        let placement = self
            .cgroups
            .apply(&config.linux.cgroup_parent, &id, &mut spec)?;

        if let Some(mappings) = &self.id_mappings {
            spec.add_or_replace_namespace(LinuxNamespaceType::User, "");
            for map in &mappings.uids {
                spec.add_uid_mapping(map.host_id, map.container_id, map.size);
            }
            for map in &mappings.gids {
                spec.add_gid_mapping(map.host_id, map.container_id, map.size);
            }
        }

        *step = "register sandbox";
        let sandbox = Arc::new(Sandbox::new(SandboxParams {
            id: id.clone(),
            name: name.clone(),
            kube_name: metadata.name.clone(),
            namespace: metadata.namespace.clone(),
            log_dir: log_dir.clone(),
            labels: labels.clone(),
            annotations: kube_annotations.clone(),
            process_label: process_label.clone(),
            mount_label: mount_label.clone(),
            metadata: metadata.clone(),
            shm_path: shm_path.clone(),
            cgroup_parent: placement.parent.clone(),
            privileged,
            runtime_handler: runtime_handler.clone(),
            resolv_path: resolv_path.clone(),
            hostname: hostname.clone(),
            port_mappings: config.port_mappings.clone(),
            host_network,
            namespace_options: ns_options,
            seccomp_profile_path: security.seccomp_profile_path.clone(),
        })?);

        self.add_sandbox(Arc::clone(&sandbox))?;
        {
            let id = id.clone();
            stack.push("remove sandbox", move || {
                self.remove_sandbox(&id)
                    .with_context(|| format!("could not remove pod sandbox {}", id))
            });
        }

        self.pod_ids.add(&id)?;
        {
            let id = id.clone();
            stack.push("delete pod id from index", move || {
                self.pod_ids
                    .delete(&id)
                    .with_context(|| format!("couldn't delete pod id {} from idIndex", id))
            });
        }

        // user values land last and win on identical keys
        for (key, value) in &kube_annotations {
            spec.add_annotation(key.as_str(), value.as_str());
        }
        for (key, value) in &labels {
            spec.add_annotation(key.as_str(), value.as_str());
        }

        *step = "configure sysctls";
        self.apply_default_sysctls(&mut spec, host_network, host_ipc);
        for (key, value) in &config.linux.sysctls {
            spec.add_sysctl(key.as_str(), value.as_str());
        }

        spec.set_process_oom_score_adj(INFRA_OOM_SCORE_ADJ);
        spec.set_cpu_shares(INFRA_CPU_SHARES);

        *step = "configure namespaces";
        let host = HostNamespaces {
            network: host_network,
            ipc: host_ipc,
            pid: host_pid,
        };
        self.namespaces.configure(host, &sandbox, &mut spec, stack)?;

        *step = "select seccomp profile";
        spec.add_annotation(
            annotations::SECCOMP_PROFILE_PATH,
            security.seccomp_profile_path.as_str(),
        );
        if self.config.seccomp_disabled {
            spec.set_seccomp(None);
        } else if !privileged {
            let profile = SeccompProfile::parse(&security.seccomp_profile_path)?;
            spec.set_seccomp(profile.load(self.config.seccomp_profile.as_deref())?);
        }

        *step = "mount infra container";
        let mount_point = self
            .storage
            .start_container(&id)
            .map_err(|source| ProvisionError::Storage {
                operation: "mount infra container",
                id: id.clone(),
                source,
            })?;
        spec.add_annotation(annotations::MOUNT_POINT, mount_point.to_string_lossy());

        *step = "write hostname file";
        let hostname_path = pod_container.run_dir.join("hostname");
        std::fs::write(&hostname_path, format!("{}\n", hostname)).map_err(|e| {
            ProvisionError::io(format!("writing {}", hostname_path.display()), e)
        })?;
        self.relabel(&hostname_path, &mount_label)?;
        spec.add_mount(Mount::bind(&hostname_path, ETC_HOSTNAME, READONLY_BIND));
        paths_to_chown.push(hostname_path.clone());
        spec.add_annotation(annotations::HOSTNAME_PATH, hostname_path.to_string_lossy());
        sandbox.set_hostname_path(&hostname_path);

        if self.id_mappings.is_some() {
            remap_host_mounts(&mut spec, ns_options);
        }
        spec.set_root_path(&mount_point);

        *step = "create infra container";
        let container = Arc::new(InfraContainer::new(ContainerParams {
            id: id.clone(),
            name: container_name.clone(),
            bundle_dir: pod_container.run_dir.clone(),
            dir: pod_container.dir.clone(),
            log_path,
            labels,
            kube_annotations,
            privileged,
            runtime_handler,
            created_at: created,
            stop_signal: pod_container.config.stop_signal.clone(),
            mount_point,
            id_mappings: self.id_mappings.clone(),
            spec: spec.spec().clone(),
        }));
        sandbox.set_infra_container(Arc::clone(&container))?;

        if network_phase == NetworkPhase::BeforeStart {
            *step = "attach network";
            let attachment = self.attach_network(&sandbox, stack)?;
            if let Some(result) = &attachment.result {
                spec.add_annotation(annotations::CNI_RESULT, to_json("network result", result)?);
            }
            for (idx, ip) in attachment.ips.iter().enumerate() {
                spec.add_annotation(ip_key(idx), ip.as_str());
            }
            sandbox.add_ips(attachment.ips);
        }

        *step = "save runtime spec";
        let written = spec.save_to_files(&[
            pod_container.dir.join("config.json"),
            pod_container.run_dir.join("config.json"),
        ])?;
        debug!(%id, bytes = written.len(), "runtime spec saved");
        container.set_spec(spec.into_spec());

        self.add_infra_container(Arc::clone(&container));
        {
            let id = id.clone();
            stack.push("remove infra container", move || {
                self.remove_infra_container(&id);
                Ok(())
            });
        }

        if let Some(mappings) = &self.id_mappings {
            *step = "chown sandbox files";
            let (uid, gid) = mappings.root_pair();
            for path in &paths_to_chown {
                chown(path, uid, gid)?;
            }
        }

        *step = "create infra process";
        self.runtime
            .create_container(&container, sandbox.cgroup_parent())
            .map_err(|source| ProvisionError::Runtime {
                operation: "create infra container",
                id: id.clone(),
                source,
            })?;
        {
            let infra = Arc::clone(&container);
            stack.push("stop infra container", move || {
                self.teardown_infra(&infra)
            });
        }

        *step = "start infra process";
        self.runtime
            .start_container(&container)
            .map_err(|source| ProvisionError::Runtime {
                operation: "start infra container",
                id: id.clone(),
                source,
            })?;

        if let Err(e) = container.state_to_disk() {
            warn!(%id, error = %e, "unable to write container state to disk");
        }

        if network_phase == NetworkPhase::AfterStart {
            *step = "attach network";
            let attachment = self.attach_network(&sandbox, stack)?;
            sandbox.add_ips(attachment.ips);
        }

        *step = "mark created";
        sandbox.set_created()?;

        info!(
            %id,
            "ran pod sandbox {} with infra container: {}",
            container.id(),
            container.description()
        );
        Ok(id)
    }

    /// Attach the pod network and push its teardown
    ///
    /// Host-network sandboxes are never attached.
    fn attach_network<'s>(
        &'s self,
        sandbox: &Arc<Sandbox>,
        stack: &mut CompensationStack<'s>,
    ) -> ProvisionResult<NetworkAttachment> {
        if sandbox.host_network() {
            return Ok(NetworkAttachment::default());
        }

        let attachment = self
            .network
            .attach(sandbox)
            .map_err(|source| ProvisionError::Network {
                operation: "attach pod network",
                id: sandbox.id().to_string(),
                source,
            })?;

        let owner = Arc::clone(sandbox);
        stack.push("stop pod network", move || {
            self.network
                .detach(&owner)
                .with_context(|| format!("error stopping network of sandbox {}", owner.id()))
        });
        Ok(attachment)
    }

    /// Stop, reap and delete the infra process, then persist its final state
    ///
    /// Every sub-step runs even when an earlier one fails.
    fn teardown_infra(&self, container: &InfraContainer) -> anyhow::Result<()> {
        let timeout = Duration::from_secs(INFRA_STOP_TIMEOUT_SECS);
        let mut failures = Vec::new();

        if let Err(e) = self.runtime.stop_container(container, timeout) {
            failures.push(format!("failed to stop container {}: {}", container.name(), e));
        }
        if let Err(e) = self.runtime.wait_stopped(container) {
            failures.push(format!(
                "failed to get container 'stopped' status {}: {}",
                container.name(),
                e
            ));
        }
        if let Err(e) = self.runtime.delete_container(container) {
            failures.push(format!("failed to delete container {}: {}", container.name(), e));
        }
        if let Err(e) = container.state_to_disk() {
            failures.push(format!(
                "failed to write container state {}: {}",
                container.name(),
                e
            ));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(failures.join("; ")))
        }
    }

    /// Configured default sysctls valid for this sandbox's namespaces
    fn apply_default_sysctls(&self, spec: &mut SpecGenerator, host_network: bool, host_ipc: bool) {
        for raw in &self.config.default_sysctls {
            let sysctl: Sysctl = match raw.parse() {
                Ok(sysctl) => sysctl,
                Err(e) => {
                    warn!(sysctl = %raw, error = %e, "sysctls invalid");
                    continue;
                }
            };
            if let Err(e) = sysctl.validate(host_network, host_ipc) {
                warn!(%sysctl, error = %e, "skipping invalid sysctl");
                continue;
            }
            spec.add_sysctl(sysctl.key(), sysctl.value());
        }
    }

    fn relabel(&self, path: &Path, label: &str) -> ProvisionResult<()> {
        relabel_tolerant(self.labeler.as_ref(), path, label, false).map_err(|source| {
            ProvisionError::Label {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

/// Replace default mounts a remapped user namespace cannot create itself
fn remap_host_mounts(spec: &mut SpecGenerator, ns: NamespaceOption) {
    if ns.host_ipc() {
        spec.remove_mount("/dev/mqueue");
        spec.add_mount(Mount::bind(
            "/dev/mqueue",
            "/dev/mqueue",
            &["rw", "rbind", "nodev", "nosuid", "noexec"],
        ));
    }
    if ns.host_network() {
        spec.remove_mount("/sys");
        spec.remove_mount("/sys/cgroup");
        spec.add_mount(Mount::bind(
            "/sys",
            "/sys",
            &["nosuid", "noexec", "nodev", "ro", "rbind"],
        ));
    }
    if ns.host_pid() {
        spec.remove_mount("/proc");
        spec.add_mount(Mount::bind(
            "/proc",
            "/proc",
            &["rw", "rbind", "nodev", "nosuid", "noexec"],
        ));
    }
}

fn chown(path: &Path, uid: u32, gid: u32) -> ProvisionResult<()> {
    use nix::unistd::{Gid, Uid};

    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|e| {
        ProvisionError::io(
            format!("cannot chown {} to {}:{}", path.display(), uid, gid),
            std::io::Error::from(e),
        )
    })
}

fn to_json<T: Serialize + ?Sized>(what: &'static str, value: &T) -> ProvisionResult<String> {
    serde_json::to_string(value).map_err(|source| ProvisionError::Serialization { what, source })
}
