//! Execute Stage use case
//!
//! Runs one stage of the pipeline: every configured model is called
//! concurrently with the same prompt, image and schema. A slot whose model
//! fails with a quota error or a per-call timeout is handed once to a
//! substitute from the stage's static fallback ordering. All attempts are
//! collected before the [`ConsensusResolver`] runs.
//!
//! Each dispatch first reserves the backend's worst-case call cost against
//! the run's [`CostLedger`]; once spent plus reserved reaches the budget,
//! further dispatches are refused.

use crate::config::{ExecutionParams, StageConfig};
use crate::ports::model_backend::{ModelBackend, ModelCallFailure, ModelRequest};
use crate::ports::progress::ProgressNotifier;
use shelfscan_domain::{
    ConsensusResolver, CostInfo, CostLedger, ExtractionAttempt, ExtractionPromptTemplate,
    ImageInput, ModelCallError, ModelId, RetryContext, Stage, StageOutputs, StagePromptInput,
    StageResult, StageSchema,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one stage run is parameterized by
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub stage: Stage,
    pub config: &'a StageConfig,
    pub schema: Option<&'a Arc<StageSchema>>,
    pub image: &'a Arc<ImageInput>,
    /// Accepted outputs of earlier stages
    pub outputs: &'a StageOutputs,
    pub retry: Option<&'a RetryContext>,
    pub system: &'a str,
    pub temperature: f64,
    /// Run wall-clock deadline; no call is dispatched after it
    pub deadline: Option<Instant>,
}

/// Use case for executing a single pipeline stage
pub struct StageExecutor<B: ModelBackend + 'static> {
    backend: Arc<B>,
    params: ExecutionParams,
    cancellation_token: Option<CancellationToken>,
}

impl<B: ModelBackend + 'static> StageExecutor<B> {
    pub fn new(backend: Arc<B>, params: ExecutionParams) -> Self {
        Self {
            backend,
            params,
            cancellation_token: None,
        }
    }

    /// Stop dispatching new calls once `token` is cancelled
    ///
    /// Calls already in flight complete so their cost is accounted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Run `input.stage` against every configured model and reconcile
    ///
    /// `ledger` is updated with the reservations and actual costs of every
    /// call made. A stage with no successful attempt yields a failed
    /// [`StageResult`] with confidence 0.
    pub async fn run(
        &self,
        input: StageInput<'_>,
        ledger: &mut CostLedger,
        progress: &dyn ProgressNotifier,
    ) -> StageResult {
        let prompt = ExtractionPromptTemplate::stage_prompt(&StagePromptInput {
            stage: input.stage,
            outputs: input.outputs,
            schema: input.schema.map(|s| &**s),
            retry: input.retry,
            instructions: input.config.instructions.as_deref(),
        });
        debug!(
            "Stage {} prompt built ({} chars, retry: {})",
            input.stage,
            prompt.len(),
            input.retry.is_some()
        );

        let shared_ledger = Arc::new(Mutex::new(ledger.clone()));
        let dispatcher = Arc::new(Dispatcher {
            backend: Arc::clone(&self.backend),
            ledger: Arc::clone(&shared_ledger),
            cancellation_token: self.cancellation_token.clone(),
            call_timeout: self.params.call_timeout,
            deadline: input.deadline,
            system: input.system.to_string(),
            prompt,
            image: Arc::clone(input.image),
            schema: input.schema.cloned(),
            temperature: input.temperature,
            stage: input.stage,
        });

        let substitutes = substitute_candidates(input.config);
        let mut join_set = JoinSet::new();

        for (slot, model) in input.config.models.iter().enumerate() {
            let dispatcher = Arc::clone(&dispatcher);
            let model = model.clone();
            let fallback = (!substitutes.is_empty())
                .then(|| substitutes[slot % substitutes.len()].clone());

            join_set.spawn(async move {
                let outcome = dispatcher.run_slot(model, fallback).await;
                (slot, outcome)
            });
        }

        let mut slots = Vec::with_capacity(input.config.models.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, outcome)) => {
                    for attempt in &outcome.attempts {
                        progress.on_attempt_complete(
                            input.stage,
                            &attempt.model,
                            attempt.error_kind(),
                        );
                    }
                    slots.push((slot, outcome));
                }
                Err(e) => {
                    warn!("Stage {} task join error: {}", input.stage, e);
                }
            }
        }

        // Attempts keep the configured slot order regardless of completion order
        slots.sort_by_key(|(slot, _)| *slot);
        let budget_refused = slots.iter().map(|(_, o)| o.refused).sum();
        let attempts: Vec<ExtractionAttempt> = slots
            .into_iter()
            .flat_map(|(_, outcome)| outcome.attempts)
            .collect();

        *ledger = lock_ledger(&shared_ledger).clone();

        let resolver = ConsensusResolver::new(input.config.consensus_policy(&self.params));
        let result = resolver
            .resolve(input.stage, attempts)
            .with_budget_refused(budget_refused);

        if result.is_failed() {
            warn!(
                "Stage {} failed: no successful attempt ({} attempts, {} refused by budget)",
                input.stage,
                result.attempts.len(),
                budget_refused
            );
        } else {
            info!(
                "Stage {} resolved with confidence {:.2} ({} successful of {} attempts)",
                input.stage,
                result.confidence,
                result.successful_attempts().count(),
                result.attempts.len()
            );
        }

        progress.on_stage_complete(&result);
        result
    }
}

/// Fallback models that are not already configured for the stage
fn substitute_candidates(config: &StageConfig) -> Vec<ModelId> {
    config
        .fallback_models
        .iter()
        .filter(|m| !config.models.contains(m))
        .cloned()
        .collect()
}

fn lock_ledger(ledger: &Mutex<CostLedger>) -> MutexGuard<'_, CostLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Attempts produced by one model slot
#[derive(Debug, Default)]
struct SlotOutcome {
    attempts: Vec<ExtractionAttempt>,
    refused: usize,
}

enum Dispatch {
    Attempt(ExtractionAttempt),
    /// Budget reservation was refused
    Refused,
    /// Cancelled or past the run deadline
    Skipped,
}

/// State shared by the concurrent slot tasks of one stage run
struct Dispatcher<B: ModelBackend> {
    backend: Arc<B>,
    ledger: Arc<Mutex<CostLedger>>,
    cancellation_token: Option<CancellationToken>,
    call_timeout: std::time::Duration,
    deadline: Option<Instant>,
    system: String,
    prompt: String,
    image: Arc<ImageInput>,
    schema: Option<Arc<StageSchema>>,
    temperature: f64,
    stage: Stage,
}

impl<B: ModelBackend> Dispatcher<B> {
    async fn run_slot(&self, model: ModelId, fallback: Option<ModelId>) -> SlotOutcome {
        let mut outcome = SlotOutcome::default();

        let substitute = match self.dispatch(&model).await {
            Dispatch::Attempt(attempt) => {
                let substitute = attempt
                    .error
                    .as_ref()
                    .filter(|e| e.triggers_fallback())
                    .and(fallback);
                outcome.attempts.push(attempt);
                substitute
            }
            Dispatch::Refused => {
                outcome.refused += 1;
                None
            }
            Dispatch::Skipped => None,
        };

        if let Some(substitute) = substitute {
            warn!(
                "Stage {}: {} unavailable, substituting {}",
                self.stage, model, substitute
            );
            match self.dispatch(&substitute).await {
                Dispatch::Attempt(attempt) => {
                    outcome.attempts.push(attempt.as_substitute_for(model));
                }
                Dispatch::Refused => outcome.refused += 1,
                Dispatch::Skipped => {}
            }
        }

        outcome
    }

    async fn dispatch(&self, model: &ModelId) -> Dispatch {
        if let Some(token) = &self.cancellation_token
            && token.is_cancelled()
        {
            debug!("Stage {}: not dispatching {} after cancellation", self.stage, model);
            return Dispatch::Skipped;
        }

        let limit = match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Dispatch::Skipped;
                }
                left.min(self.call_timeout)
            }
            None => self.call_timeout,
        };

        let request = ModelRequest {
            model: model.clone(),
            system: self.system.clone(),
            prompt: self.prompt.clone(),
            image: Arc::clone(&self.image),
            schema: self.schema.clone(),
            temperature: self.temperature,
        };

        // Reservation and budget check happen under one lock
        let worst_case = self.backend.worst_case_cost(&request);
        let Some(reservation) = lock_ledger(&self.ledger).try_reserve(worst_case) else {
            warn!(
                "Stage {}: budget exhausted, not dispatching {}",
                self.stage, model
            );
            return Dispatch::Refused;
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(limit, self.backend.call(&request)).await {
            Ok(outcome) => outcome,
            // Usage of an abandoned call is unknown; book its full reservation
            Err(_) => Err(ModelCallFailure {
                error: ModelCallError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
                cost: CostInfo::new(0, 0, reservation.amount()),
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let attempt = match outcome {
            Ok(reply) => {
                lock_ledger(&self.ledger).settle(reservation, reply.cost);
                ExtractionAttempt::succeeded(
                    self.stage,
                    model.clone(),
                    request.prompt.as_str(),
                    reply.parsed,
                    reply.raw_output,
                    reply.cost,
                )
            }
            Err(failure) => {
                lock_ledger(&self.ledger).settle(reservation, failure.cost);
                warn!("Stage {}: {} failed: {}", self.stage, model, failure.error);
                ExtractionAttempt::failed(
                    self.stage,
                    model.clone(),
                    request.prompt.as_str(),
                    failure.error,
                    failure.cost,
                )
            }
        };

        Dispatch::Attempt(
            attempt
                .with_schema_fingerprint(request.schema.as_ref().map(|s| s.fingerprint()))
                .with_duration_ms(duration_ms),
        )
    }
}
