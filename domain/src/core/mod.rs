//! Core domain concepts shared across all subdomains.
//!
//! - [`model::ModelId`] — identifier of a vision model
//! - [`error`] — schema, model-call and run-level error taxonomy

pub mod error;
pub mod model;
pub mod string;
