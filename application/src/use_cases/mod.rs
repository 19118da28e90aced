//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod execute_stage;
pub mod run_extraction;

#[cfg(test)]
pub(crate) mod testing;
