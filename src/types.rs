//! Shared types for the KAIROS scanner.
//!
//! These types form the data model used across all modules: market
//! snapshots coming in from ingestion, signals produced by the preliminary
//! pass, and the opportunity verdict produced by escalation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Odds for one outcome of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeOdds {
    /// Outcome label, e.g. "Home", "Over 2.5".
    pub outcome: String,
    /// Current decimal odds.
    pub current: Decimal,
    /// Decimal odds recorded at an earlier reference time, if known.
    #[serde(default)]
    pub reference: Option<Decimal>,
}

/// A single market observation handed over by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub odds: Vec<OutcomeOdds>,
    /// Traded money volume in a single currency unit.
    #[serde(deserialize_with = "crate::ingest::deserialize_volume")]
    pub volume: Decimal,
    /// In-play (true) or pre-match (false).
    #[serde(default)]
    pub live: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Exchange link for the market, when the scraper captured one.
    #[serde(default)]
    pub url: Option<String>,
}

impl fmt::Display for MarketRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (vol: {}€ | {} outcomes | {})",
            self.id,
            self.name,
            self.volume.normalize(),
            self.odds.len(),
            if self.live { "live" } else { "pre-match" },
        )
    }
}

impl MarketRecord {
    /// Check the record invariants: non-empty id, volume ≥ 0 and every
    /// odds value above 1.0.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.id.trim().is_empty() {
            return Err(RecordError::MissingId);
        }
        if self.volume < Decimal::ZERO {
            return Err(RecordError::NegativeVolume {
                volume: self.volume,
            });
        }
        for odds in &self.odds {
            if odds.current <= Decimal::ONE {
                return Err(RecordError::InvalidOdds {
                    outcome: odds.outcome.clone(),
                    odds: odds.current,
                });
            }
            if let Some(reference) = odds.reference {
                if reference <= Decimal::ONE {
                    return Err(RecordError::InvalidOdds {
                        outcome: odds.outcome.clone(),
                        odds: reference,
                    });
                }
            }
        }
        Ok(())
    }

    /// Current odds for an outcome label.
    pub fn odds_for(&self, outcome: &str) -> Option<Decimal> {
        self.odds
            .iter()
            .find(|o| o.outcome == outcome)
            .map(|o| o.current)
    }

    /// The outcome with the shortest current odds.
    pub fn favourite(&self) -> Option<&OutcomeOdds> {
        self.odds.iter().min_by(|a, b| a.current.cmp(&b.current))
    }

    /// Helper to build a test/sample market with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: &str, volume: Decimal, live: bool) -> Self {
        MarketRecord {
            id: id.to_string(),
            name: format!("Match Odds - {id}"),
            odds: vec![
                OutcomeOdds {
                    outcome: "Home".to_string(),
                    current: dec!(2.10),
                    reference: None,
                },
                OutcomeOdds {
                    outcome: "Away".to_string(),
                    current: dec!(3.50),
                    reference: None,
                },
            ],
            volume,
            live,
            timestamp: Utc::now(),
            url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Rule family that produced a signal.
///
/// Variant order is the per-market emission order of the preliminary pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    MoneyWay,
    DropOdds,
    SharpBet,
}

impl SignalType {
    /// All known families in emission order.
    pub const ALL: &'static [SignalType] = &[
        SignalType::MoneyWay,
        SignalType::DropOdds,
        SignalType::SharpBet,
    ];

    /// Key of the family's table in `config.toml`.
    pub fn config_key(&self) -> &'static str {
        match self {
            SignalType::MoneyWay => "money_way",
            SignalType::DropOdds => "drop_odds",
            SignalType::SharpBet => "sharp_bet",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::MoneyWay => write!(f, "money-way"),
            SignalType::DropOdds => write!(f, "drop-odds"),
            SignalType::SharpBet => write!(f, "sharp-bet"),
        }
    }
}

/// A weighted, rule-triggered observation about one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub market_id: String,
    /// Outcome the signal refers to, for per-outcome families.
    pub outcome: Option<String>,
    pub description: String,
    /// One of the configured tier strengths of the family, in [0, 1].
    pub strength: Decimal,
    /// Raw metric that crossed the tier (volume or percentage drop).
    pub metric: Decimal,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] strength {}: {}",
            self.signal_type,
            self.market_id,
            self.strength.normalize(),
            self.description,
        )
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Ordinal confidence attached to a positive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Map a 0–1 score onto the ordinal scale (≥0.8 high, ≥0.6 medium).
    pub fn from_score(score: Decimal) -> Self {
        if score >= dec!(0.8) {
            Confidence::High
        } else if score >= dec!(0.6) {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "Low"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::High => write!(f, "High"),
        }
    }
}

/// Parse a confidence label (case-insensitive, accepts Portuguese labels
/// some prompts still produce).
impl std::str::FromStr for Confidence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "baixo" | "baixa" => Ok(Confidence::Low),
            "medium" | "med" | "médio" | "medio" | "média" | "media" => Ok(Confidence::Medium),
            "high" | "alto" | "alta" => Ok(Confidence::High),
            other => Err(anyhow::anyhow!("Unknown confidence level: {other}")),
        }
    }
}

/// Answer of a deep-analysis capability for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub found: bool,
    pub selection: Option<String>,
    pub confidence: Option<Confidence>,
    pub justification: Option<String>,
}

impl Verdict {
    /// "Checked and found nothing".
    pub fn no_opportunity() -> Self {
        Self {
            found: false,
            selection: None,
            confidence: None,
            justification: None,
        }
    }

    pub fn opportunity(
        selection: impl Into<String>,
        confidence: Confidence,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            found: true,
            selection: Some(selection.into()),
            confidence: Some(confidence),
            justification: Some(justification.into()),
        }
    }
}

/// Final verdict for a batch.
///
/// When `found` is false, selection, confidence and justification are
/// always `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub found: bool,
    pub market_id: Option<String>,
    pub market_label: Option<String>,
    pub selection: Option<String>,
    pub confidence: Option<Confidence>,
    pub justification: Option<String>,
    /// Signals of the escalated market.
    pub signals: Vec<Signal>,
    /// Current odds of the selected outcome, if it names one.
    pub odds: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub url: Option<String>,
}

impl Opportunity {
    /// Default verdict for batches where nothing qualified.
    pub fn not_found() -> Self {
        Self {
            found: false,
            market_id: None,
            market_label: None,
            selection: None,
            confidence: None,
            justification: None,
            signals: Vec::new(),
            odds: None,
            volume: None,
            url: None,
        }
    }

    /// Merge a deep-analysis verdict with the market it was produced for.
    pub fn from_verdict(market: &MarketRecord, signals: Vec<Signal>, verdict: Verdict) -> Self {
        if !verdict.found {
            return Self {
                signals,
                ..Self::not_found()
            };
        }

        let odds = verdict
            .selection
            .as_deref()
            .and_then(|selection| market.odds_for(selection));

        Self {
            found: true,
            market_id: Some(market.id.clone()),
            market_label: Some(market.name.clone()),
            selection: verdict.selection,
            confidence: verdict.confidence,
            justification: verdict.justification,
            signals,
            odds,
            volume: Some(market.volume),
            url: market.url.clone(),
        }
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let na = "N/A";
        writeln!(f, "1. Opportunity found: {}", if self.found { "Yes" } else { "No" })?;
        writeln!(f, "2. Market: {}", self.market_label.as_deref().unwrap_or(na))?;
        writeln!(f, "3. Selection: {}", self.selection.as_deref().unwrap_or(na))?;
        writeln!(f, "4. Justification: {}", self.justification.as_deref().unwrap_or(na))?;
        match self.confidence {
            Some(c) => write!(f, "5. Confidence: {c}")?,
            None => write!(f, "5. Confidence: {na}")?,
        }
        if let Some(url) = &self.url {
            write!(f, "\n   Link: {url}")?;
        }
        if let Some(volume) = self.volume {
            write!(f, "\n   Volume: {}€", volume.normalize())?;
        }
        if let Some(odds) = self.odds {
            write!(f, "\n   Odds: {}", odds.normalize())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a market record was rejected by the preliminary pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Market record has an empty id")]
    MissingId,

    #[error("Negative volume: {volume}")]
    NegativeVolume { volume: Decimal },

    #[error("Invalid odds {odds} for outcome {outcome} (must be > 1.0)")]
    InvalidOdds { outcome: String, odds: Decimal },

    #[error("Duplicate market id in batch: {0}")]
    DuplicateId(String),
}

/// Failure of a deep-analysis capability.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeepAnalysisError {
    #[error("Deep analysis timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Deep analysis API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed deep analysis response: {0}")]
    MalformedResponse(String),
}

/// An escalated market could not be checked.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Escalation failed for market {market_id}: {source}")]
pub struct EscalationError {
    pub market_id: String,
    #[source]
    pub source: DeepAnalysisError,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
