//! Port for audit records.
//!
//! Every state transition of a run produces an immutable [`AuditEntry`].
//! Persistence and telemetry consumers receive them through [`AuditSink`].
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostic messages, while this port carries the complete
//! decision record (attempts, stage result, cost and accuracy deltas).

use shelfscan_domain::AuditEntry;
use std::sync::Arc;

/// Receiver of audit records.
///
/// The `record` method is intentionally synchronous and non-fallible to avoid
/// disrupting the run; sink failures are logged by the implementation.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// No-op implementation for tests and when auditing is disabled.
pub struct NoAuditSink;

impl AuditSink for NoAuditSink {
    fn record(&self, _entry: &AuditEntry) {}
}

/// Fans each record out to several sinks (e.g. persistence and telemetry)
#[derive(Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, entry: &AuditEntry) {
        for sink in &self.sinks {
            sink.record(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::{Decision, OrchestrationRun, RunState};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting(Mutex<Vec<u32>>);

    impl AuditSink for Collecting {
        fn record(&self, entry: &AuditEntry) {
            self.0.lock().unwrap().push(entry.sequence);
        }
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(Collecting::default());
        let b = Arc::new(Collecting::default());
        let composite = CompositeAuditSink::new()
            .with_sink(a.clone())
            .with_sink(b.clone());
        assert_eq!(composite.len(), 2);

        let mut run = OrchestrationRun::new("run", 1, 1.0);
        let entry = run
            .transition(RunState::Structure, Decision::Start, "begin", None, None)
            .unwrap()
            .clone();
        composite.record(&entry);

        assert_eq!(*a.0.lock().unwrap(), vec![1]);
        assert_eq!(*b.0.lock().unwrap(), vec![1]);
    }
}
