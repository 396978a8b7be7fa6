/*!
 * Namespace Traits
 */

use super::types::*;

/// Creates OS-level namespaces that outlive any process
pub trait NamespacePinner: Send + Sync {
    /// Create one namespace per kind for `sandbox_id` and pin each to a path
    ///
    /// Either every requested namespace is pinned or none is left behind.
    fn pin(&self, sandbox_id: &str, kinds: &[NamespaceKind])
        -> NamespaceResult<Vec<ManagedNamespace>>;

    /// Release pinned namespaces
    ///
    /// Every entry is attempted even when an earlier one fails.
    fn unpin(&self, namespaces: &[ManagedNamespace]) -> NamespaceResult<()>;
}
