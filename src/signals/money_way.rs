//! Money way: large traded volume on a market, live or pre-match.

use crate::config::MoneyWayConfig;
use crate::types::{MarketRecord, Signal, SignalType};

use super::tiers::TierTable;
use super::Rule;

pub struct MoneyWayRule {
    tiers: TierTable,
}

impl MoneyWayRule {
    pub fn new(config: &MoneyWayConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
        }
    }
}

impl Rule for MoneyWayRule {
    fn signal_type(&self) -> SignalType {
        SignalType::MoneyWay
    }

    fn evaluate(&self, market: &MarketRecord) -> Vec<Signal> {
        let Some(tier) = self.tiers.select(market.volume) else {
            return Vec::new();
        };

        vec![Signal {
            signal_type: SignalType::MoneyWay,
            market_id: market.id.clone(),
            outcome: None,
            description: format!(
                "Money way: {}€ traded, above the {}€ tier",
                market.volume.normalize(),
                tier.threshold.normalize(),
            ),
            strength: tier.strength,
            metric: market.volume,
        }]
    }
}
