/*!
 * Monitoring
 * Structured logging for the provisioning pipeline
 */

pub mod tracer;

pub use tracer::{generate_request_id, init_tracing, ProvisionSpan, TRACE_JSON_ENV};
