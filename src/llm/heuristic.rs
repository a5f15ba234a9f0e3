//! Local rule-of-thumb analyzer used when no LLM key is configured.
//!
//! Scores the escalated market by its type (read from the market name),
//! volume, the odds of the chosen selection and whether it is in play. The
//! chosen selection is the outcome with the biggest odds drop among the
//! signals, or the favourite when no outcome dropped.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::DeepAnalyzer;
use crate::types::{
    Confidence, DeepAnalysisError, MarketRecord, OutcomeOdds, Signal, SignalType, Verdict,
};

/// Market families the scorer knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    MatchOdds,
    OverUnder,
    BothTeamsToScore,
    Half,
}

impl MarketKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("match odds") {
            Some(MarketKind::MatchOdds)
        } else if lower.contains("over/under") {
            Some(MarketKind::OverUnder)
        } else if lower.contains("both teams to score") {
            Some(MarketKind::BothTeamsToScore)
        } else if lower.contains("half") {
            Some(MarketKind::Half)
        } else {
            None
        }
    }
}

/// First `d.d` token in a market name, e.g. "2.5" in "Over/Under 2.5 Goals".
pub fn goal_line(name: &str) -> Option<&str> {
    name.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|token| {
            let mut parts = token.split('.');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty()
            )
        })
}

#[derive(Debug, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn model_name(&self) -> &str {
        "heuristic"
    }

    fn pick_selection<'a>(market: &'a MarketRecord, signals: &[Signal]) -> Option<&'a OutcomeOdds> {
        let dropped = signals
            .iter()
            .filter(|s| s.signal_type == SignalType::DropOdds)
            .max_by(|a, b| a.metric.cmp(&b.metric))
            .and_then(|s| s.outcome.as_deref())
            .and_then(|label| market.odds.iter().find(|o| o.outcome == label));
        dropped.or_else(|| market.favourite())
    }

    /// Score a market; `None` when its type is unknown or it misses the
    /// per-type minimum.
    pub fn score(kind: MarketKind, market: &MarketRecord, odds: Decimal) -> Option<(Decimal, Vec<String>)> {
        let volume = market.volume;
        let mut score = Decimal::ZERO;
        let mut reasons = Vec::new();

        let minimum = match kind {
            MarketKind::MatchOdds => {
                if volume > dec!(50000) {
                    score += dec!(0.3);
                    reasons.push(format!("High volume of {}€ shows strong interest", volume.normalize()));
                } else if volume > dec!(20000) {
                    score += dec!(0.2);
                    reasons.push(format!("Moderate volume of {}€", volume.normalize()));
                }
                if (dec!(1.5)..=dec!(2.5)).contains(&odds) {
                    score += dec!(0.3);
                    reasons.push(format!("Odds of {} in the value range", odds.normalize()));
                }
                if market.live {
                    score += dec!(0.2);
                    reasons.push("Live market with room to move".to_string());
                }
                dec!(0.6)
            }
            MarketKind::OverUnder => {
                if volume > dec!(30000) {
                    score += dec!(0.25);
                    reasons.push(format!("Significant volume of {}€", volume.normalize()));
                }
                if (dec!(1.8)..=dec!(2.2)).contains(&odds) {
                    score += dec!(0.35);
                    reasons.push(format!("Balanced odds of {}", odds.normalize()));
                }
                if let Some(line @ ("2.5" | "1.5")) = goal_line(&market.name) {
                    score += dec!(0.2);
                    reasons.push(format!("Line {line} is liquid"));
                }
                if market.live {
                    score += dec!(0.15);
                    reasons.push("Favourable live dynamics".to_string());
                }
                dec!(0.6)
            }
            MarketKind::BothTeamsToScore => {
                if volume > dec!(15000) {
                    score += dec!(0.3);
                    reasons.push(format!("Volume of {}€ on BTTS", volume.normalize()));
                }
                if (dec!(1.6)..=dec!(2.4)).contains(&odds) {
                    score += dec!(0.4);
                    reasons.push(format!("Attractive odds of {}", odds.normalize()));
                }
                dec!(0.5)
            }
            MarketKind::Half => {
                if volume < dec!(10000) {
                    return None;
                }
                if volume > dec!(20000) {
                    score += dec!(0.25);
                    reasons.push(format!("Half-time volume of {}€", volume.normalize()));
                }
                if (dec!(1.5)..=dec!(3.0)).contains(&odds) {
                    score += dec!(0.3);
                    reasons.push(format!("Half-time odds of {}", odds.normalize()));
                }
                dec!(0.4)
            }
        };

        (score >= minimum).then_some((score, reasons))
    }
}

#[async_trait]
impl DeepAnalyzer for HeuristicAnalyzer {
    async fn evaluate(
        &self,
        market: &MarketRecord,
        signals: &[Signal],
    ) -> Result<Verdict, DeepAnalysisError> {
        let Some(kind) = MarketKind::from_name(&market.name) else {
            debug!(market_id = %market.id, name = %market.name, "Unknown market type");
            return Ok(Verdict::no_opportunity());
        };
        let Some(selection) = Self::pick_selection(market, signals) else {
            return Ok(Verdict::no_opportunity());
        };

        match Self::score(kind, market, selection.current) {
            Some((score, reasons)) => {
                debug!(market_id = %market.id, ?kind, score = %score, "Heuristic opportunity");
                Ok(Verdict::opportunity(
                    selection.outcome.clone(),
                    Confidence::from_score(score),
                    format!("{}.", reasons.join(". ")),
                ))
            }
            None => Ok(Verdict::no_opportunity()),
        }
    }
}
