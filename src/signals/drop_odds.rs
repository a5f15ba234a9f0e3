//! Drop odds: an outcome's price shortened against its reference odds.
//!
//! Evaluated per outcome, so one market can yield several signals. Outcomes
//! without reference odds are ignored.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::DropOddsConfig;
use crate::types::{MarketRecord, OutcomeOdds, Signal, SignalType};

use super::tiers::TierTable;
use super::Rule;

pub struct DropOddsRule {
    tiers: TierTable,
}

impl DropOddsRule {
    pub fn new(config: &DropOddsConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
        }
    }
}

/// Percentage drop from reference to current odds.
///
/// `None` when there is no reference or the odds did not fall.
pub fn drop_percent(odds: &OutcomeOdds) -> Option<Decimal> {
    let reference = odds.reference?;
    if reference <= Decimal::ZERO || odds.current >= reference {
        return None;
    }
    Some((reference - odds.current) / reference * dec!(100))
}

impl Rule for DropOddsRule {
    fn signal_type(&self) -> SignalType {
        SignalType::DropOdds
    }

    fn evaluate(&self, market: &MarketRecord) -> Vec<Signal> {
        market
            .odds
            .iter()
            .filter_map(|odds| {
                let reference = odds.reference?;
                let drop = drop_percent(odds)?;
                let tier = self.tiers.select(drop)?;
                Some(Signal {
                    signal_type: SignalType::DropOdds,
                    market_id: market.id.clone(),
                    outcome: Some(odds.outcome.clone()),
                    description: format!(
                        "Drop odds on {}: {} -> {} ({}% drop, {}% tier)",
                        odds.outcome,
                        reference.normalize(),
                        odds.current.normalize(),
                        drop.round_dp(2).normalize(),
                        tier.threshold.normalize(),
                    ),
                    strength: tier.strength,
                    metric: drop,
                })
            })
            .collect()
    }
}
