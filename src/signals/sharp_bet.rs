//! Sharp bet: heavy money arriving while the market is in play.

use crate::config::SharpBetConfig;
use crate::types::{MarketRecord, Signal, SignalType};

use rust_decimal::Decimal;

use super::tiers::TierTable;
use super::Rule;

pub struct SharpBetRule {
    tiers: TierTable,
    min_live_volume: Decimal,
}

impl SharpBetRule {
    pub fn new(config: &SharpBetConfig) -> Self {
        Self {
            tiers: config.tiers.clone(),
            min_live_volume: config.min_live_volume,
        }
    }
}

impl Rule for SharpBetRule {
    fn signal_type(&self) -> SignalType {
        SignalType::SharpBet
    }

    fn evaluate(&self, market: &MarketRecord) -> Vec<Signal> {
        if !market.live || market.volume < self.min_live_volume {
            return Vec::new();
        }
        let Some(tier) = self.tiers.select(market.volume) else {
            return Vec::new();
        };

        vec![Signal {
            signal_type: SignalType::SharpBet,
            market_id: market.id.clone(),
            outcome: None,
            description: format!(
                "Sharp bet: {}€ traded in play, above the {}€ tier",
                market.volume.normalize(),
                tier.threshold.normalize(),
            ),
            strength: tier.strength,
            metric: market.volume,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::tiers::Tier;
    use rust_decimal_macros::dec;

    fn strength_for(volume: Decimal, live: bool) -> Option<Decimal> {
        let rule = SharpBetRule::new(&SharpBetConfig::default());
        rule.evaluate(&MarketRecord::sample("m1", volume, live))
            .first()
            .map(|s| s.strength)
    }

    #[test]
    fn test_never_fires_pre_match() {
        for volume in [dec!(0), dec!(10000), dec!(20000), dec!(1000000)] {
            assert_eq!(strength_for(volume, false), None);
        }
    }

    #[test]
    fn test_live_tiers() {
        assert_eq!(strength_for(dec!(9999), true), None);
        assert_eq!(strength_for(dec!(10000), true), Some(dec!(0.7)));
        assert_eq!(strength_for(dec!(19999), true), Some(dec!(0.7)));
        assert_eq!(strength_for(dec!(20000), true), Some(dec!(0.9)));
    }

    #[test]
    fn test_live_volume_floor_applies_before_tiers() {
        let config = SharpBetConfig {
            enabled: true,
            tiers: TierTable::new(vec![Tier::new(dec!(1000), dec!(0.5))]),
            min_live_volume: dec!(8000),
        };
        let rule = SharpBetRule::new(&config);
        assert!(rule.evaluate(&MarketRecord::sample("m1", dec!(5000), true)).is_empty());
        assert_eq!(rule.evaluate(&MarketRecord::sample("m1", dec!(8000), true)).len(), 1);
    }

    #[test]
    fn test_signal_fields() {
        let rule = SharpBetRule::new(&SharpBetConfig::default());
        let signals = rule.evaluate(&MarketRecord::sample("m9", dec!(25000), true));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::SharpBet);
        assert_eq!(signals[0].market_id, "m9");
        assert_eq!(signals[0].metric, dec!(25000));
        assert!(signals[0].description.contains("in play"));
    }
}
