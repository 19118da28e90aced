//! Output configuration from TOML (`[output]` section)

use serde::{Deserialize, Serialize};
use shelfscan_domain::OutputFormat;
use std::path::PathBuf;

/// Raw output configuration from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    /// How the completion record is printed
    pub format: Option<OutputFormat>,
    /// JSONL audit log path; no file audit when unset
    pub audit_log: Option<PathBuf>,
}
