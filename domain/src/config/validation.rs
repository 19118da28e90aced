//! Configuration validation results
//!
//! Config loaders and run-config builders report problems as a list of
//! [`ConfigIssue`]s instead of failing on the first one, so the CLI can
//! print every problem at once and decide whether to continue.

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// A model name is empty or whitespace.
    EmptyModelName { field: String },
    /// An extraction stage has no models configured.
    MissingStageModels { stage: String },
    /// A stage section uses a name that is not a pipeline stage.
    UnknownStage { name: String },
    /// A field specification cannot be compiled into a schema.
    InvalidFieldSpec { stage: String },
    /// A numeric setting is outside its valid range.
    OutOfRange { field: String, value: String },
    /// A model is routed to a provider that is not known.
    UnknownProvider { model: String, provider: String },
}

/// A detected issue in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_severity() {
        let issue = ConfigIssue::error(
            ConfigIssueCode::MissingStageModels {
                stage: "products".to_string(),
            },
            "stages.products.models must not be empty",
        );
        assert!(issue.is_error());
        assert_eq!(
            issue.to_string(),
            "error: stages.products.models must not be empty"
        );

        let warning = ConfigIssue::warning(
            ConfigIssueCode::UnknownStage {
                name: "pricing".to_string(),
            },
            "unknown stage 'pricing' ignored",
        );
        assert!(!warning.is_error());
    }
}
