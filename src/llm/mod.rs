//! Deep-analysis capabilities.
//!
//! Defines the `DeepAnalyzer` trait the escalation step calls, with an
//! LLM-backed implementation (Anthropic) and a local heuristic fallback.

pub mod anthropic;
pub mod heuristic;

use async_trait::async_trait;

use crate::types::{DeepAnalysisError, MarketRecord, Signal, Verdict};

/// Expensive second-tier check of a single market.
///
/// Receives only the escalated market and the signals raised for it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeepAnalyzer: Send + Sync {
    async fn evaluate(
        &self,
        market: &MarketRecord,
        signals: &[Signal],
    ) -> Result<Verdict, DeepAnalysisError>;
}
