//! Core engine: the preliminary → escalate → verdict batch pipeline.

pub mod escalation;
pub mod summary;

pub use escalation::{analyze_two_tier, BatchResult, EscalationOrchestrator};
pub use summary::{BatchOutcome, BatchSummary};
