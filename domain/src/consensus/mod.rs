//! Multi-model consensus
//!
//! - [`ConsensusResolver`] reconciles one stage's attempts into a [`StageResult`](crate::extraction::StageResult)
//! - [`ConsensusPolicy`] priority order and confidence defaults
//! - [`EscalationPolicy`] which unresolved disagreements need human review

pub mod checks;
pub mod policy;
pub mod resolver;

pub use checks::{
    CONFIDENCE_KEYS, ConsistencyScore, consistency_checks, reported_confidence, values_agree,
};
pub use policy::{ConsensusPolicy, EscalationPolicy};
pub use resolver::ConsensusResolver;
