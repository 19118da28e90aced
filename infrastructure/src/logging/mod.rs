//! Audit record sinks.
//!
//! [`JsonlAuditSink`] persists every transition as a JSONL line;
//! [`TracingAuditSink`] forwards them to the `tracing` subscriber as
//! structured telemetry. Both implement the
//! [`AuditSink`](shelfscan_application::AuditSink) port.

mod jsonl_audit;
mod tracing_sink;

pub use jsonl_audit::JsonlAuditSink;
pub use tracing_sink::TracingAuditSink;
