//! Prompt domain
//!
//! Templates for the prompts sent at each extraction stage.

mod template;

pub use template::{ExtractionPromptTemplate, StagePromptInput};
