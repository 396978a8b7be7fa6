/*!
 * Core Module
 * Fundamental types, id generation and error handling
 */

pub mod errors;
pub mod guard;
pub mod id;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use guard::{CompensationStack, StackState, UnwindFailure, UnwindReport};
pub use types::*;
