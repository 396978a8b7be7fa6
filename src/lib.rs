/*!
 * Pod Sandbox Library
 * Pod sandbox provisioning exposed as a library
 */

pub mod config;
pub mod core;
pub mod monitoring;
pub mod mount;
pub mod network;
pub mod registry;
pub mod runtime;
pub mod sandbox;
pub mod security;
pub mod server;
pub mod spec;
pub mod storage;

// Re-exports
pub use crate::core::errors::{ErrorKind, ProvisionError, ProvisionResult};
pub use crate::core::guard::{CompensationStack, UnwindReport};
pub use config::RuntimeConfig;
pub use monitoring::init_tracing;
pub use sandbox::{Sandbox, SandboxRequest};
pub use server::{NetworkPhase, Server, ServerBuilder};
