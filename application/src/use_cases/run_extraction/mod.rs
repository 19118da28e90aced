//! Run Extraction use case
//!
//! Drives one [`OrchestrationRun`] through the stage pipeline:
//!
//! | From               | Outcome                              | To                         |
//! |--------------------|--------------------------------------|----------------------------|
//! | pending            | accepted                             | structure                  |
//! | any stage          | confidence below stage minimum       | same stage (retry context) |
//! | structure/products | accepted                             | next stage                 |
//! | details            | accepted, visual validation active   | visual_validation          |
//! | details / visual   | aggregate accuracy >= target         | completed                  |
//! | visual_validation  | issues in products/details           | that stage (feedback cycle)|
//! | details / visual   | accuracy below target                | structure (restart)        |
//! | any stage          | unresolved disagreement under review | escalated                  |
//! | any stage          | budget, iterations, cancel, timeout  | failed                     |
//!
//! The pipeline start, every stage retry, every feedback cycle and every
//! restart consume one iteration of the run's budget.

mod types;

pub use types::{RunExtractionError, RunExtractionInput, RunOutcome, RunStatus};

use crate::config::ExtractionConfig;
use crate::ports::audit_sink::{AuditSink, NoAuditSink};
use crate::ports::model_backend::ModelBackend;
use crate::ports::progress::{NoProgress, ProgressNotifier};
use crate::use_cases::execute_stage::{StageExecutor, StageInput};
use shelfscan_domain::{
    ConfigIssue, Decision, ExtractionPromptTemplate, FailureReason, ImageInput, OrchestrationRun,
    RetryContext, RunState, SchemaBuilder, SchemaDefinitionError, Stage, StageResult,
    StageSchema, VisualReport,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Use case for running one shelf extraction end to end
pub struct RunExtractionUseCase<B: ModelBackend + 'static> {
    backend: Arc<B>,
    audit_sink: Arc<dyn AuditSink>,
    cancellation_token: Option<CancellationToken>,
}

impl<B: ModelBackend + 'static> RunExtractionUseCase<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            audit_sink: Arc::new(NoAuditSink),
            cancellation_token: None,
        }
    }

    /// Deliver every audit record to `sink`
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    /// Set a cancellation token for graceful interruption
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Execute the use case with default (no-op) progress
    pub async fn execute(&self, input: RunExtractionInput) -> Result<RunOutcome, RunExtractionError> {
        self.execute_with_progress(input, &NoProgress).await
    }

    /// Execute the use case with progress callbacks
    ///
    /// Returns `Err` only when the run cannot start (invalid configuration,
    /// schema definition errors). Every started run ends in a terminal
    /// [`RunOutcome`].
    pub async fn execute_with_progress(
        &self,
        input: RunExtractionInput,
        progress: &dyn ProgressNotifier,
    ) -> Result<RunOutcome, RunExtractionError> {
        let RunExtractionInput { image, config } = input;

        let errors: Vec<ConfigIssue> = config
            .validate()
            .into_iter()
            .filter(ConfigIssue::is_error)
            .collect();
        if !errors.is_empty() {
            return Err(RunExtractionError::InvalidConfig(errors));
        }

        let schemas = build_schemas(&config)?;

        let mut executor = StageExecutor::new(Arc::clone(&self.backend), config.execution.clone());
        if let Some(token) = &self.cancellation_token {
            executor = executor.with_cancellation(token.clone());
        }

        let run = OrchestrationRun::new(
            Uuid::new_v4().to_string(),
            config.max_iterations,
            config.cost_budget,
        );
        info!(
            "Starting run {} for {} (target accuracy {:.2}, {} iterations, budget ${:.2})",
            run.id(),
            image.describe(),
            config.target_accuracy,
            config.max_iterations,
            config.cost_budget
        );

        let mut driver = RunDriver {
            run,
            config: &config,
            schemas,
            executor,
            image: Arc::new(image),
            system: config
                .system
                .clone()
                .unwrap_or_else(|| ExtractionPromptTemplate::default_system().to_string()),
            deadline: config.execution.run_timeout.map(|limit| Instant::now() + limit),
            accepted: BTreeMap::new(),
            pending_feedback: BTreeMap::new(),
            audit_sink: self.audit_sink.as_ref(),
            progress,
            cancellation_token: self.cancellation_token.as_ref(),
        };
        driver.drive().await?;

        let outcome = RunOutcome::from_run(&driver.run);
        info!(
            "Run {} finished {} (accuracy {:.2}, {} iterations, ${:.4})",
            outcome.run_id,
            outcome.status,
            outcome.final_accuracy,
            outcome.total_iterations,
            outcome.total_cost.usd
        );
        Ok(outcome)
    }
}

/// Compile the schema of every active stage once per run
fn build_schemas(
    config: &ExtractionConfig,
) -> Result<BTreeMap<Stage, Option<Arc<StageSchema>>>, SchemaDefinitionError> {
    let mut builder = SchemaBuilder::new();
    let mut schemas = BTreeMap::new();
    for (stage, stage_config) in &config.stages {
        if !config.is_stage_active(*stage) {
            continue;
        }
        let schema = builder.build(
            stage.as_str(),
            &stage_config.fields,
            stage_config.comparison_only,
        )?;
        schemas.insert(*stage, schema);
    }
    Ok(schemas)
}

/// What the driver does next
enum Step {
    Run(Stage, Option<RetryContext>),
    Done,
}

/// Sole writer of the run while it is being driven
struct RunDriver<'a, B: ModelBackend + 'static> {
    run: OrchestrationRun,
    config: &'a ExtractionConfig,
    schemas: BTreeMap<Stage, Option<Arc<StageSchema>>>,
    executor: StageExecutor<B>,
    image: Arc<ImageInput>,
    system: String,
    deadline: Option<Instant>,
    /// Confidence of the accepted output of each extraction stage
    accepted: BTreeMap<Stage, f64>,
    /// Visual validation issues not yet addressed, per stage
    pending_feedback: BTreeMap<Stage, Vec<String>>,
    audit_sink: &'a dyn AuditSink,
    progress: &'a dyn ProgressNotifier,
    cancellation_token: Option<&'a CancellationToken>,
}

impl<B: ModelBackend + 'static> RunDriver<'_, B> {
    async fn drive(&mut self) -> Result<(), RunExtractionError> {
        // Validation guarantees at least one iteration
        self.run.try_consume_iteration();
        self.transition(
            RunState::Structure,
            Decision::Start,
            format!(
                "Run accepted: target accuracy {:.2}, {} iterations, budget ${:.2}",
                self.config.target_accuracy, self.config.max_iterations, self.config.cost_budget
            ),
            None,
            None,
        )?;

        let mut stage = Stage::Structure;
        let mut retry: Option<RetryContext> = None;

        loop {
            if let Some(reason) = self.interrupted().or_else(|| self.budget_exhausted()) {
                return self.fail(reason, None, None);
            }

            let result = self.run_stage(stage, retry.as_ref()).await;

            // In-flight results are discarded once the run is interrupted
            if let Some(reason) = self.interrupted() {
                return self.fail(reason, None, None);
            }
            self.run.record_stage_result(result.clone());

            let step = if stage.is_extraction() {
                self.after_extraction(stage, result)?
            } else {
                self.after_visual_validation(result)?
            };

            match step {
                Step::Run(next, context) => {
                    stage = next;
                    retry = context;
                }
                Step::Done => return Ok(()),
            }
        }
    }

    async fn run_stage(&mut self, stage: Stage, retry: Option<&RetryContext>) -> StageResult {
        let Some(stage_config) = self.config.stage(stage) else {
            return StageResult::failed(stage, Vec::new());
        };
        self.progress
            .on_stage_start(stage, self.run.iteration(), stage_config.models.len());

        let mut ledger = self.run.ledger().clone();
        let input = StageInput {
            stage,
            config: stage_config,
            schema: self.schemas.get(&stage).and_then(Option::as_ref),
            image: &self.image,
            outputs: self.run.outputs(),
            retry,
            system: &self.system,
            temperature: self.config.temperature,
            deadline: self.deadline,
        };
        let result = self.executor.run(input, &mut ledger, self.progress).await;
        *self.run.ledger_mut() = ledger;
        result
    }

    fn after_extraction(
        &mut self,
        stage: Stage,
        result: StageResult,
    ) -> Result<Step, RunExtractionError> {
        let review = self.config.escalation.fields_requiring_review(&result);
        if !review.is_empty() {
            let reasoning = format!(
                "Unresolved disagreement in {} on {} requires human review",
                stage,
                review.join(", ")
            );
            self.run.set_escalated_fields(review);
            self.transition(RunState::Escalated, Decision::Escalate, reasoning, Some(result), None)?;
            return Ok(Step::Done);
        }

        let min_confidence = self.min_confidence(stage);
        if result.is_failed() || result.confidence < min_confidence {
            return self.retry_stage(stage, result, min_confidence);
        }

        self.run.accept_output(stage, result.value.clone());
        self.accepted.insert(stage, result.confidence);
        self.pending_feedback.remove(&stage);
        let accuracy = self.extraction_accuracy();
        self.run.note_partial(accuracy);

        match stage.next().filter(|next| self.config.is_stage_active(*next)) {
            Some(next) => {
                let reasoning = format!(
                    "{} confidence {:.2} meets minimum {:.2}",
                    stage.display_name(),
                    result.confidence,
                    min_confidence
                );
                self.transition(next.into(), Decision::Advance, reasoning, Some(result), None)?;
                Ok(Step::Run(next, self.feedback_context(next)))
            }
            None => self.finish_pass(result, accuracy, None),
        }
    }

    fn after_visual_validation(&mut self, result: StageResult) -> Result<Step, RunExtractionError> {
        let min_confidence = self.min_confidence(Stage::VisualValidation);
        let report = if result.is_failed() || result.confidence < min_confidence {
            None
        } else {
            VisualReport::from_value(&result.value)
        };
        let Some(report) = report else {
            return self.retry_stage(Stage::VisualValidation, result, min_confidence);
        };

        let accuracy = (self.extraction_accuracy() + report.accuracy) / 2.0;
        self.run.note_partial(accuracy);
        self.finish_pass(result, accuracy, Some(&report))
    }

    /// Decide between completion, a feedback cycle, a restart and failure
    fn finish_pass(
        &mut self,
        result: StageResult,
        accuracy: f64,
        report: Option<&VisualReport>,
    ) -> Result<Step, RunExtractionError> {
        let target = self.config.target_accuracy;
        if accuracy >= target {
            let reasoning = format!("Aggregate accuracy {:.2} reached target {:.2}", accuracy, target);
            self.transition(
                RunState::Completed,
                Decision::Complete,
                reasoning,
                Some(result),
                Some(accuracy),
            )?;
            return Ok(Step::Done);
        }

        if let Some(reason) = self.budget_exhausted() {
            return self.fail(reason, Some(result), Some(accuracy)).map(|()| Step::Done);
        }

        if let Some(report) = report {
            self.pending_feedback = Stage::EXTRACTION
                .into_iter()
                .map(|stage| (stage, report.feedback_for(stage)))
                .filter(|(_, feedback)| !feedback.is_empty())
                .collect();

            if let Some(target_stage @ (Stage::Products | Stage::Details)) = report.target_stage()
                && self.run.feedback_cycles() < self.config.execution.max_feedback_cycles
                && self.run.try_consume_iteration()
            {
                self.run.start_feedback_cycle();
                let reasoning = format!(
                    "Accuracy {:.2} below target {:.2}; re-running {} with {} reported issues",
                    accuracy,
                    target,
                    target_stage,
                    report.issues.len()
                );
                self.transition(
                    target_stage.into(),
                    Decision::FeedbackCycle,
                    reasoning,
                    Some(result),
                    Some(accuracy),
                )?;
                return Ok(Step::Run(target_stage, self.feedback_context(target_stage)));
            }
        }

        if self.run.try_consume_iteration() {
            let reasoning = format!(
                "Accuracy {:.2} below target {:.2}; restarting the pipeline",
                accuracy, target
            );
            self.transition(
                RunState::Structure,
                Decision::Restart,
                reasoning,
                Some(result),
                Some(accuracy),
            )?;

            let mut context = self
                .feedback_context(Stage::Structure)
                .unwrap_or_else(|| RetryContext::new(self.next_attempt(Stage::Structure)));
            context.failure_summary.push(format!(
                "The previous pass reached accuracy {:.2}, below the required {:.2}",
                accuracy, target
            ));
            return Ok(Step::Run(Stage::Structure, Some(context)));
        }

        let best_accuracy = self.run.best().map_or(accuracy, |best| best.accuracy);
        self.fail(
            FailureReason::IterationLimitExceeded {
                limit: self.config.max_iterations,
                best_accuracy,
            },
            Some(result),
            Some(accuracy),
        )
        .map(|()| Step::Done)
    }

    /// Re-run `stage` with context built from its failing result
    fn retry_stage(
        &mut self,
        stage: Stage,
        result: StageResult,
        min_confidence: f64,
    ) -> Result<Step, RunExtractionError> {
        self.keep_partial(stage, &result);

        if let Some(reason) = self.budget_exhausted() {
            return self.fail(reason, Some(result), None).map(|()| Step::Done);
        }

        if !self.run.try_consume_iteration() {
            let reason = if result.is_failed() {
                FailureReason::AllModelsFailed {
                    stage: stage.to_string(),
                }
            } else {
                FailureReason::IterationLimitExceeded {
                    limit: self.config.max_iterations,
                    best_accuracy: self.run.best().map_or(0.0, |best| best.accuracy),
                }
            };
            return self.fail(reason, Some(result), None).map(|()| Step::Done);
        }

        let mut context =
            RetryContext::from_stage_result(&result, min_confidence, self.next_attempt(stage));
        if let Some(feedback) = self.pending_feedback.get(&stage) {
            context = context.with_visual_feedback(feedback.clone());
        }

        let reasoning = if result.is_failed() {
            format!(
                "No successful attempt among {} ({} refused by budget); retrying {}",
                result.attempts.len(),
                result.budget_refused,
                stage
            )
        } else {
            format!(
                "Confidence {:.2} below minimum {:.2}; retrying {}",
                result.confidence, min_confidence, stage
            )
        };
        self.transition(stage.into(), Decision::RetryStage, reasoning, Some(result), None)?;
        Ok(Step::Run(stage, Some(context)))
    }

    fn fail(
        &mut self,
        reason: FailureReason,
        stage_result: Option<StageResult>,
        accuracy: Option<f64>,
    ) -> Result<(), RunExtractionError> {
        warn!("Run {} failed: {}", self.run.id(), reason);
        let reasoning = reason.to_string();
        self.run.set_failure(reason);
        self.transition(RunState::Failed, Decision::Fail, reasoning, stage_result, accuracy)
    }

    fn transition(
        &mut self,
        to: RunState,
        decision: Decision,
        reasoning: String,
        stage_result: Option<StageResult>,
        accuracy: Option<f64>,
    ) -> Result<(), RunExtractionError> {
        let entry = self
            .run
            .transition(to, decision, reasoning, stage_result, accuracy)?;
        info!(
            run_id = %entry.run_id,
            iteration = entry.iteration,
            "{} -> {} ({}): {}",
            entry.from,
            entry.to,
            entry.decision,
            entry.reasoning
        );
        self.audit_sink.record(entry);
        self.progress.on_transition(entry);
        Ok(())
    }

    /// Cancellation or run timeout
    fn interrupted(&self) -> Option<FailureReason> {
        if self.cancellation_token.is_some_and(CancellationToken::is_cancelled) {
            return Some(FailureReason::Cancelled);
        }
        if let (Some(deadline), Some(limit)) = (self.deadline, self.config.execution.run_timeout)
            && Instant::now() >= deadline
        {
            return Some(FailureReason::RunTimeout {
                limit_ms: limit.as_millis() as u64,
            });
        }
        None
    }

    fn budget_exhausted(&self) -> Option<FailureReason> {
        let ledger = self.run.ledger();
        ledger.is_exhausted().then(|| FailureReason::BudgetExceeded {
            spent: ledger.spent().usd,
            budget: ledger.budget(),
        })
    }

    fn min_confidence(&self, stage: Stage) -> f64 {
        self.config
            .stage(stage)
            .map_or(0.0, |config| config.min_confidence)
    }

    /// Mean accepted confidence over all extraction stages (missing = 0)
    fn extraction_accuracy(&self) -> f64 {
        mean_accuracy(&self.accepted)
    }

    /// Offer a result that fell short of the stage minimum as the partial result
    fn keep_partial(&mut self, stage: Stage, result: &StageResult) {
        if result.is_failed() {
            return;
        }
        if stage.is_extraction() {
            let mut accepted = self.accepted.clone();
            accepted.insert(stage, result.confidence);
            self.run
                .note_candidate(stage, result.value.clone(), mean_accuracy(&accepted));
        } else if let Some(report) = VisualReport::from_value(&result.value) {
            self.run
                .note_partial((self.extraction_accuracy() + report.accuracy) / 2.0);
        }
    }

    fn next_attempt(&self, stage: Stage) -> u32 {
        self.run.stage_results(stage).len() as u32 + 1
    }

    /// Retry context carrying outstanding visual issues for `stage`
    fn feedback_context(&self, stage: Stage) -> Option<RetryContext> {
        self.pending_feedback.get(&stage).map(|feedback| {
            RetryContext::new(self.next_attempt(stage)).with_visual_feedback(feedback.clone())
        })
    }
}

fn mean_accuracy(accepted: &BTreeMap<Stage, f64>) -> f64 {
    let total: f64 = Stage::EXTRACTION
        .iter()
        .map(|stage| accepted.get(stage).copied().unwrap_or(0.0))
        .sum();
    total / Stage::EXTRACTION.len() as f64
}
