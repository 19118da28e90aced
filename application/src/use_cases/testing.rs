//! Scripted in-memory model backend shared by the use case tests

use crate::ports::model_backend::{ModelBackend, ModelCallFailure, ModelReply, ModelRequest};
use async_trait::async_trait;
use serde_json::Value;
use shelfscan_domain::{CostInfo, ModelCallError, ModelId};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply(Value),
    Text(String),
    Fail(ModelCallError),
    Slow(Duration, Value),
}

/// Replays per-model responses; the last response of a model repeats
pub(crate) struct ScriptedBackend {
    scripts: Mutex<HashMap<ModelId, VecDeque<Script>>>,
    calls: Mutex<Vec<(ModelId, String)>>,
    cost_per_call: CostInfo,
    worst_case: f64,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            cost_per_call: CostInfo::new(1000, 100, 0.01),
            worst_case: 0.0,
        }
    }

    pub(crate) fn with_script(self, model: &str, script: Vec<Script>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(ModelId::new(model), script.into());
        self
    }

    pub(crate) fn with_cost_per_call(mut self, usd: f64) -> Self {
        self.cost_per_call = CostInfo::new(1000, 100, usd);
        self
    }

    pub(crate) fn with_worst_case(mut self, usd: f64) -> Self {
        self.worst_case = usd;
        self
    }

    /// Models called so far, in dispatch order
    pub(crate) fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(model, _)| model.to_string())
            .collect()
    }

    /// Prompts sent to `model`
    pub(crate) fn prompts_for(&self, model: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m.as_str() == model)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn next_script(&self, model: &ModelId) -> Option<Script> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(model)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn call(&self, request: &ModelRequest) -> Result<ModelReply, ModelCallFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((request.model.clone(), request.prompt.clone()));

        let script = self.next_script(&request.model).ok_or_else(|| {
            ModelCallFailure::free(ModelCallError::transport(format!(
                "no script for {}",
                request.model
            )))
        })?;

        let raw = match script {
            Script::Reply(value) => value.to_string(),
            Script::Text(text) => text,
            Script::Fail(error) => {
                return Err(ModelCallFailure {
                    error,
                    cost: CostInfo::zero(),
                });
            }
            Script::Slow(delay, value) => {
                tokio::time::sleep(delay).await;
                value.to_string()
            }
        };
        ModelReply::from_raw_output(raw, request.schema.as_deref(), self.cost_per_call)
    }

    fn worst_case_cost(&self, _request: &ModelRequest) -> f64 {
        self.worst_case
    }
}
