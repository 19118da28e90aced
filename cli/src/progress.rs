//! Progress reporting for extraction runs

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use shelfscan_application::ProgressNotifier;
use shelfscan_domain::{AuditEntry, ErrorKind, ModelId, Stage, StageResult};
use std::sync::{Mutex, PoisonError};

/// Reports progress with one progress bar per stage execution
pub struct ProgressReporter {
    multi: MultiProgress,
    stage_bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            stage_bar: Mutex::new(None),
        }
    }

    fn stage_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier for ProgressReporter {
    fn on_stage_start(&self, stage: Stage, iteration: u32, models: usize) {
        let pb = self.multi.add(ProgressBar::new(models as u64));
        pb.set_style(Self::stage_style());
        pb.set_prefix(format!("{} (iteration {})", stage.display_name(), iteration));
        pb.set_message("Calling models...");

        *self.stage_bar.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb);
    }

    fn on_attempt_complete(&self, _stage: Stage, model: &ModelId, error: Option<ErrorKind>) {
        if let Some(pb) = self
            .stage_bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let status = match error {
                None => format!("{} {}", "v".green(), model),
                Some(kind) => format!("{} {} ({})", "x".red(), model, kind.as_str()),
            };
            pb.set_message(status);
            pb.inc(1);
        }
    }

    fn on_stage_complete(&self, result: &StageResult) {
        if let Some(pb) = self
            .stage_bar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let message = if result.is_failed() {
                "all models failed".red().to_string()
            } else {
                format!("confidence {:.2}", result.confidence)
                    .green()
                    .to_string()
            };
            pb.finish_with_message(message);
        }
    }

    fn on_transition(&self, entry: &AuditEntry) {
        let _ = self.multi.println(format!(
            "  {} {} -> {}: {}",
            "->".cyan(),
            entry.from.as_str(),
            entry.to.as_str().bold(),
            entry.reasoning.dimmed()
        ));
    }
}
