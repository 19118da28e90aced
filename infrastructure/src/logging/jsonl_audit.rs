//! JSONL file writer for audit records.
//!
//! Each [`AuditEntry`] is serialized as a single JSON line with a
//! `recorded_at` timestamp, appended to the file via a buffered writer.

use serde_json::Value;
use shelfscan_application::AuditSink;
use shelfscan_domain::AuditEntry;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// JSONL audit sink that writes one JSON object per transition.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Appends to an existing file so
/// several runs can share one log. Flushes after every record and on `Drop`.
pub struct JsonlAuditSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlAuditSink {
    /// Create a sink appending to the given path.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create audit log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open audit log file {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditEntry) {
        let recorded_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let mut record = match serde_json::to_value(entry) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return,
            Err(e) => {
                warn!("Could not serialize audit entry {}: {}", entry.sequence, e);
                return;
            }
        };
        record.insert("recorded_at".to_string(), Value::String(recorded_at));

        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };

        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                warn!("Could not write audit log {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfscan_domain::{Decision, OrchestrationRun, RunState};
    use std::fs;

    fn entries() -> Vec<AuditEntry> {
        let mut run = OrchestrationRun::new("run-1", 3, 1.0);
        let first = run
            .transition(RunState::Structure, Decision::Start, "begin", None, None)
            .unwrap()
            .clone();
        let second = run
            .transition(RunState::Products, Decision::Advance, "structure accepted", None, Some(0.8))
            .unwrap()
            .clone();
        vec![first, second]
    }

    #[test]
    fn test_jsonl_sink_writes_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("run.jsonl");
        let sink = JsonlAuditSink::new(&path).unwrap();

        for entry in entries() {
            sink.record(&entry);
        }
        drop(sink);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["run_id"], "run-1");
        assert_eq!(first["sequence"], 1);
        assert_eq!(first["decision"], "start");
        assert!(first["recorded_at"].as_str().unwrap().ends_with('Z'));

        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["to"], "products");
        assert_eq!(second["accuracy"], 0.8);
    }

    #[test]
    fn test_jsonl_sink_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");
        let entries = entries();

        JsonlAuditSink::new(&path).unwrap().record(&entries[0]);
        JsonlAuditSink::new(&path).unwrap().record(&entries[1]);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_jsonl_sink_returns_none_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        assert!(JsonlAuditSink::new(blocker.join("audit.jsonl")).is_none());
    }
}
