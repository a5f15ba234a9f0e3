//! Batch summary: the per-batch record handed to reporting.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::signals::PreliminaryPass;
use crate::types::{EscalationError, Opportunity, Signal, SignalType};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// No market reached the escalation floor.
    NotEscalated,
    OpportunityFound,
    /// Deep analysis ran and declined.
    NoOpportunity,
    EscalationFailed,
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::NotEscalated => write!(f, "not escalated"),
            BatchOutcome::OpportunityFound => write!(f, "opportunity found"),
            BatchOutcome::NoOpportunity => write!(f, "no opportunity"),
            BatchOutcome::EscalationFailed => write!(f, "escalation failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub markets_received: usize,
    pub markets_analyzed: usize,
    pub markets_skipped: usize,
    /// Signal count per family; families that raised nothing are absent.
    pub signal_counts: BTreeMap<SignalType, usize>,
    /// Signals at or above the escalation floor, in preliminary order.
    pub strong_signals: Vec<Signal>,
    pub escalated_market: Option<String>,
    pub deep_analysis_calls: u32,
    pub outcome: BatchOutcome,
    /// Rendered verdict, or the failure message.
    pub verdict_text: String,
}

impl BatchSummary {
    pub fn build(
        batch_id: Uuid,
        markets_received: usize,
        pass: &PreliminaryPass,
        floor: Decimal,
        escalated_market: Option<String>,
        opportunity: &Result<Opportunity, EscalationError>,
    ) -> Self {
        let mut signal_counts = BTreeMap::new();
        for signal in &pass.signals {
            *signal_counts.entry(signal.signal_type).or_insert(0) += 1;
        }
        let strong_signals: Vec<Signal> = pass
            .signals
            .iter()
            .filter(|s| s.strength >= floor)
            .cloned()
            .collect();

        let outcome = match (&escalated_market, opportunity) {
            (None, _) => BatchOutcome::NotEscalated,
            (Some(_), Ok(o)) if o.found => BatchOutcome::OpportunityFound,
            (Some(_), Ok(_)) => BatchOutcome::NoOpportunity,
            (Some(_), Err(_)) => BatchOutcome::EscalationFailed,
        };

        let verdict_text = match opportunity {
            Ok(o) => o.to_string(),
            Err(e) => e.to_string(),
        };

        Self {
            batch_id,
            timestamp: Utc::now(),
            markets_received,
            markets_analyzed: pass.analyzed.len(),
            markets_skipped: pass.skipped.len(),
            signal_counts,
            strong_signals,
            deep_analysis_calls: u32::from(escalated_market.is_some()),
            escalated_market,
            outcome,
            verdict_text,
        }
    }

    pub fn total_signals(&self) -> usize {
        self.signal_counts.values().sum()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Batch {} at {}",
            self.batch_id,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(
            f,
            "Markets: {} received, {} analyzed, {} skipped",
            self.markets_received, self.markets_analyzed, self.markets_skipped
        )?;

        write!(f, "Signals: {} (", self.total_signals())?;
        for (i, kind) in SignalType::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let n = self.signal_counts.get(kind).copied().unwrap_or(0);
            write!(f, "{kind} {n}")?;
        }
        writeln!(f, "), {} strong", self.strong_signals.len())?;
        for signal in &self.strong_signals {
            writeln!(
                f,
                "  {} {} {}: {}",
                signal.market_id, signal.signal_type, signal.strength, signal.description
            )?;
        }

        match &self.escalated_market {
            Some(id) => writeln!(f, "Escalated: {id} ({})", self.outcome)?,
            None => writeln!(f, "Escalated: none")?,
        }
        write!(f, "{}", self.verdict_text)
    }
}
