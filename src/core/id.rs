/*!
 * ID Generation
 * Sandbox identifiers and the names derived from them
 */

use super::types::{SandboxId, SHORT_ID_LEN};
use uuid::Uuid;

const KUBE_PREFIX: &str = "k8s";
const NAME_DELIMITER: &str = "_";

/// Generate a new opaque sandbox id (64 lowercase hex characters)
///
/// Two v4 UUIDs in simple form give the same shape as the ids the rest of
/// the container stack expects.
pub fn generate_id() -> SandboxId {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Short form of an id, used as the default hostname
pub fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id.len(), |(idx, _)| idx);
    &id[..end]
}

/// Compose the pod sandbox name: `k8s_<name>_<namespace>_<uid>_<attempt>`
pub fn sandbox_name(name: &str, namespace: &str, uid: &str, attempt: u32) -> String {
    [KUBE_PREFIX, name, namespace, uid, &attempt.to_string()].join(NAME_DELIMITER)
}

/// Compose the infra container name: `k8s_POD_<name>_<namespace>_<uid>_<attempt>`
pub fn infra_container_name(name: &str, namespace: &str, uid: &str, attempt: u32) -> String {
    [
        KUBE_PREFIX,
        super::types::POD_INFRA_CONTAINER_NAME,
        name,
        namespace,
        uid,
        &attempt.to_string(),
    ]
    .join(NAME_DELIMITER)
}
