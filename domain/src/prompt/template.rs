//! Prompt templates for the extraction stages

use crate::core::string::truncate;
use crate::extraction::assembly::StageOutputs;
use crate::extraction::retry::RetryContext;
use crate::extraction::stage::Stage;
use crate::schema::StageSchema;

const MAX_CONTEXT_JSON_CHARS: usize = 12_000;

/// Everything a stage prompt is parameterized by
#[derive(Debug, Clone, Copy)]
pub struct StagePromptInput<'a> {
    pub stage: Stage,
    /// Accepted outputs of earlier stages
    pub outputs: &'a StageOutputs,
    pub schema: Option<&'a StageSchema>,
    pub retry: Option<&'a RetryContext>,
    /// Operator-supplied instructions replacing the built-in stage task
    pub instructions: Option<&'a str>,
}

/// Templates for generating prompts at each stage
pub struct ExtractionPromptTemplate;

impl ExtractionPromptTemplate {
    /// Default system prompt when the run configuration supplies none
    pub fn default_system() -> &'static str {
        r#"You are a meticulous retail merchandising analyst examining a photograph of a store shelf.
Report only what is visible in the image. Never invent products, prices or text you cannot read.
When a value cannot be determined, use null rather than guessing.
Always answer with a single JSON object and nothing else."#
    }

    /// Full user prompt for one stage call
    pub fn stage_prompt(input: &StagePromptInput<'_>) -> String {
        let mut prompt = match input.instructions {
            Some(custom) => custom.trim().to_string(),
            None => Self::stage_task(input.stage, input.outputs),
        };

        if let Some(context) = Self::stage_context(input.stage, input.outputs) {
            prompt.push_str("\n\n");
            prompt.push_str(&context);
        }

        if let Some(schema) = input.schema {
            prompt.push_str("\n\n");
            prompt.push_str(&schema.prompt_block());
        } else if input.stage == Stage::VisualValidation {
            prompt.push_str("\n\n");
            prompt.push_str(Self::visual_report_format());
        }

        if let Some(retry) = input.retry
            && !retry.is_empty()
        {
            prompt.push_str("\n\n");
            prompt.push_str(&Self::retry_section(retry));
        }

        prompt
    }

    fn stage_task(stage: Stage, outputs: &StageOutputs) -> String {
        match stage {
            Stage::Structure => r#"Analyze the physical structure of the shelving unit in this image.
Count the horizontal shelves from top to bottom (shelf 1 is the top shelf) and describe the fixture."#
                .to_string(),
            Stage::Products => {
                let shelves = match outputs.shelf_count() {
                    Some(count) => format!("The unit has {} shelves (shelf 1 is the top shelf).", count),
                    None => "The shelf count is unknown; number shelves from the top.".to_string(),
                };
                format!(
                    r#"Identify every distinct product facing on the shelves in this image.
{}
Work shelf by shelf, left to right, and give each product its shelf number and position on that shelf."#,
                    shelves
                )
            }
            Stage::Details => r#"For each product listed below, read the price label and visible packaging details.
Keep the product order and identifiers exactly as listed; only add details you can read in the image."#
                .to_string(),
            Stage::VisualValidation => r#"Compare the extraction result below against the image.
Check shelf count, product identities and positions, and prices. Estimate how accurate the result is
and list every discrepancy together with the stage that produced it (structure, products or details)."#
                .to_string(),
        }
    }

    fn stage_context(stage: Stage, outputs: &StageOutputs) -> Option<String> {
        match stage {
            Stage::Structure => None,
            Stage::Products => outputs
                .get(Stage::Structure)
                .map(|structure| format!("Shelf structure found earlier:\n{}", compact_json(structure))),
            Stage::Details => outputs
                .get(Stage::Products)
                .map(|products| format!("Products found earlier:\n{}", compact_json(products))),
            Stage::VisualValidation => Some(format!(
                "Extraction result to validate:\n{}",
                compact_json(&outputs.assemble())
            )),
        }
    }

    fn visual_report_format() -> &'static str {
        r#"Respond with a single JSON object of this form:
{"accuracy": <number between 0 and 1>, "issues": [{"stage": "structure|products|details", "description": "<what is wrong>"}], "rerun_stage": "structure|products|details|null"}"#
    }

    /// Section describing what went wrong in previous attempts
    pub fn retry_section(retry: &RetryContext) -> String {
        let mut section = format!(
            "## Previous attempt feedback (attempt {})\nA previous extraction of this stage was not accepted. Correct these problems:",
            retry.attempt
        );
        for failure in &retry.failure_summary {
            section.push_str(&format!("\n- {}", failure));
        }
        if !retry.low_confidence_fields.is_empty() {
            section.push_str(&format!(
                "\n- Re-check these fields carefully, they were uncertain: {}",
                retry.low_confidence_fields.join(", ")
            ));
        }
        if !retry.visual_feedback.is_empty() {
            section.push_str("\n\nA reviewer compared the previous result with the image and found:");
            for issue in &retry.visual_feedback {
                section.push_str(&format!("\n- {}", issue));
            }
        }
        section
    }
}

fn compact_json(value: &serde_json::Value) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    truncate(&text, MAX_CONTEXT_JSON_CHARS)
}
