//! Audit sink that emits each transition as a structured tracing event.

use shelfscan_application::AuditSink;
use shelfscan_domain::AuditEntry;
use tracing::info;

/// Telemetry sink: one `info` event per transition on the `shelfscan::audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        let models = entry
            .models_used
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let confidence = entry.stage_result.as_ref().map(|r| r.confidence);

        info!(
            target: "shelfscan::audit",
            run_id = %entry.run_id,
            sequence = entry.sequence,
            iteration = entry.iteration,
            stage = entry.stage.map(|s| s.as_str()),
            from = entry.from.as_str(),
            to = entry.to.as_str(),
            decision = entry.decision.as_str(),
            models = %models,
            confidence,
            accuracy = entry.accuracy,
            cost_delta = entry.cost_delta,
            cumulative_cost = entry.cumulative_cost,
            "{}",
            entry.reasoning
        );
    }
}
