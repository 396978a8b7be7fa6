/*!
 * Namespace Lifecycle
 * Host sharing, runtime-default, and system-owned namespaces for sandboxes
 */

mod linux;
mod manager;
mod simulation;
mod traits;
mod types;

pub use linux::ThreadPinner;
pub use manager::{apply_namespace_paths, NamespaceLifecycle};
pub use simulation::SimulationPinner;
pub use traits::*;
pub use types::*;
