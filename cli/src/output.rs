//! Console output formatter for extraction outcomes

use colored::Colorize;
use shelfscan_application::{RunOutcome, RunStatus};

/// Formats run outcomes for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Human-readable summary: status, accuracy, cost, reason and result
    pub fn format_summary(outcome: &RunOutcome) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Shelf Extraction"));
        output.push('\n');

        let status = match outcome.status {
            RunStatus::Completed => outcome.status.as_str().green().bold(),
            RunStatus::Escalated => outcome.status.as_str().yellow().bold(),
            RunStatus::Failed => outcome.status.as_str().red().bold(),
        };
        output.push_str(&format!("{} {}\n", "Run:".cyan().bold(), outcome.run_id));
        output.push_str(&format!("{} {}\n", "Status:".cyan().bold(), status));
        output.push_str(&format!(
            "{} {:.1}%\n",
            "Accuracy:".cyan().bold(),
            outcome.final_accuracy * 100.0
        ));
        output.push_str(&format!(
            "{} ${:.4} ({} input / {} output tokens)\n",
            "Cost:".cyan().bold(),
            outcome.total_cost.usd,
            outcome.total_cost.input_tokens,
            outcome.total_cost.output_tokens
        ));
        output.push_str(&format!(
            "{} {}\n",
            "Iterations:".cyan().bold(),
            outcome.total_iterations
        ));

        if let Some(reason) = &outcome.reason {
            output.push_str(&format!("{} {}\n", "Reason:".yellow().bold(), reason));
        }

        if !outcome.escalated_fields.is_empty() {
            output.push_str(&format!("\n{}\n", "Needs human review:".yellow().bold()));
            for field in &outcome.escalated_fields {
                output.push_str(&format!("  * {}\n", field));
            }
        }

        output.push_str(&Self::section_header("Decisions"));
        for entry in &outcome.audit_log {
            output.push_str(&format!(
                "  {:>2}. {} -> {} ({})\n",
                entry.sequence,
                entry.from.as_str(),
                entry.to.as_str(),
                entry.decision.as_str()
            ));
        }

        match &outcome.final_result {
            Some(result) => {
                output.push_str(&Self::section_header("Result"));
                let pretty =
                    serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
                output.push_str(&Self::indent(&pretty, "  "));
                output.push('\n');
            }
            None => output.push_str(&format!("\n{}\n", "No result was produced".dimmed())),
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(outcome: &RunOutcome) -> String {
        serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfscan_domain::{CostInfo, FailureReason};

    fn outcome(status: RunStatus) -> RunOutcome {
        RunOutcome {
            run_id: "run-42".to_string(),
            status,
            final_result: Some(json!({ "total_shelves": 4 })),
            final_accuracy: 0.9,
            total_cost: CostInfo::new(12_000, 800, 0.0375),
            total_iterations: 2,
            reason: None,
            failure: None,
            escalated_fields: Vec::new(),
            audit_log: Vec::new(),
        }
    }

    #[test]
    fn test_summary_lists_key_figures() {
        colored::control::set_override(false);
        let text = ConsoleFormatter::format_summary(&outcome(RunStatus::Completed));
        assert!(text.contains("Status: completed"));
        assert!(text.contains("Accuracy: 90.0%"));
        assert!(text.contains("$0.0375"));
        assert!(text.contains("\"total_shelves\": 4"));
    }

    #[test]
    fn test_summary_shows_reason_and_escalations() {
        colored::control::set_override(false);
        let mut escalated = outcome(RunStatus::Escalated);
        escalated.reason = Some("Models disagreed".to_string());
        escalated.escalated_fields = vec!["products[0].brand".to_string()];
        let text = ConsoleFormatter::format_summary(&escalated);
        assert!(text.contains("Reason: Models disagreed"));
        assert!(text.contains("  * products[0].brand"));
    }

    #[test]
    fn test_json_round_trips_status() {
        let mut failed = outcome(RunStatus::Failed);
        failed.failure = Some(FailureReason::Cancelled);
        failed.final_result = None;
        let value: serde_json::Value =
            serde_json::from_str(&ConsoleFormatter::format_json(&failed)).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value["final_result"].is_null());
    }
}
