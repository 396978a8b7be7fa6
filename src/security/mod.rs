/*!
 * Security Module
 * Cgroup placement, namespaces, labels, capabilities, seccomp and sysctls
 */

pub mod capability;
pub mod cgroup;
pub mod label;
pub mod namespace;
pub mod seccomp;
pub mod sysctl;

pub use cgroup::{CgroupMode, CgroupPlacement, CgroupResolver};
pub use label::{Labeler, SecurityLabels};
pub use namespace::{NamespaceLifecycle, NamespacePinner};
pub use seccomp::SeccompProfile;
pub use sysctl::Sysctl;
