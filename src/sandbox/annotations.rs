/*!
 * Annotation Keys
 * Stable keys recorded on the infra container spec
 */

pub const METADATA: &str = "io.kubernetes.cri-o.Metadata";
pub const LABELS: &str = "io.kubernetes.cri-o.Labels";
pub const ANNOTATIONS: &str = "io.kubernetes.cri-o.Annotations";
pub const LOG_PATH: &str = "io.kubernetes.cri-o.LogPath";
pub const NAME: &str = "io.kubernetes.cri-o.Name";
pub const NAMESPACE: &str = "io.kubernetes.cri-o.Namespace";
pub const CONTAINER_TYPE: &str = "io.kubernetes.cri-o.ContainerType";
pub const SANDBOX_ID: &str = "io.kubernetes.cri-o.SandboxID";
pub const CONTAINER_NAME: &str = "io.kubernetes.cri-o.ContainerName";
pub const CONTAINER_ID: &str = "io.kubernetes.cri-o.ContainerID";
pub const SHM_PATH: &str = "io.kubernetes.cri-o.ShmPath";
pub const PRIVILEGED_RUNTIME: &str = "io.kubernetes.cri-o.PrivilegedRuntime";
pub const RUNTIME_HANDLER: &str = "io.kubernetes.cri-o.RuntimeHandler";
pub const RESOLV_PATH: &str = "io.kubernetes.cri-o.ResolvPath";
pub const HOST_NAME: &str = "io.kubernetes.cri-o.HostName";
pub const NAMESPACE_OPTIONS: &str = "io.kubernetes.cri-o.NamespaceOptions";
pub const KUBE_NAME: &str = "io.kubernetes.cri-o.KubeName";
pub const HOST_NETWORK: &str = "io.kubernetes.cri-o.HostNetwork";
pub const CREATED: &str = "io.kubernetes.cri-o.Created";
pub const PORT_MAPPINGS: &str = "io.kubernetes.cri-o.PortMappings";
pub const CGROUP_PARENT: &str = "io.kubernetes.cri-o.CgroupParent";
pub const MOUNT_POINT: &str = "io.kubernetes.cri-o.MountPoint";
pub const HOSTNAME_PATH: &str = "io.kubernetes.cri-o.HostnamePath";
pub const CNI_RESULT: &str = "io.kubernetes.cri-o.CNIResult";
pub const SECCOMP_PROFILE_PATH: &str = "io.kubernetes.cri-o.SeccompProfilePath";
/// Prefix of `<prefix>.<n>` address annotations
pub const IP: &str = "io.kubernetes.cri-o.IP";

pub const CONTAINER_MANAGER: &str = "io.container.manager";
pub const CONTAINER_MANAGER_NAME: &str = "cri-o";
pub const IMAGE_STOP_SIGNAL: &str = "org.opencontainers.image.stopSignal";

pub const CONTAINER_TYPE_SANDBOX: &str = "sandbox";

/// Label naming the container inside a pod
pub const KUBERNETES_CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

/// Reserved prefix user labels may not use
pub const RESERVED_PREFIX: &str = "io.kubernetes.cri-o.";

/// Key for the `n`th assigned address
pub fn ip_key(n: usize) -> String {
    format!("{}.{}", IP, n)
}
