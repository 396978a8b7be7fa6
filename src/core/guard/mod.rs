/*!
 * Resource Guards
 *
 * Ordered compensation for multi-step resource acquisition.
 *
 * ## Example
 *
 * ```rust
 * use pod_sandbox::core::guard::CompensationStack;
 *
 * let mut stack = CompensationStack::new();
 * stack.push("release name", || Ok(()));
 * stack.push("remove storage", || Ok(()));
 *
 * // Something later failed: undo in reverse order
 * let report = stack.unwind();
 * assert_eq!(report.attempted, vec!["remove storage", "release name"]);
 * ```
 */

mod compensation;

pub use compensation::{
    CompensationAction, CompensationStack, StackState, UnwindFailure, UnwindReport,
};
