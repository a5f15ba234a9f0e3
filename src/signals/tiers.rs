//! Severity tiers shared by every rule family.
//!
//! A tier table is an ascending list of `(threshold, strength)` pairs. A
//! metric maps to the single highest tier whose threshold it meets; below
//! the lowest threshold it maps to nothing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One severity tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: Decimal,
    pub strength: Decimal,
}

impl Tier {
    pub fn new(threshold: Decimal, strength: Decimal) -> Self {
        Self {
            threshold,
            strength,
        }
    }
}

/// Ordered tier list for one rule family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable(Vec<Tier>);

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self(tiers)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.0
    }

    /// Lowest threshold, i.e. the point where the family starts firing.
    pub fn floor(&self) -> Option<Decimal> {
        self.0.first().map(|t| t.threshold)
    }

    /// The highest tier whose threshold `metric` meets or exceeds.
    pub fn select(&self, metric: Decimal) -> Option<&Tier> {
        self.0.iter().rev().find(|t| metric >= t.threshold)
    }

    /// Reject tables that would make tier selection ambiguous.
    pub fn validate(&self, family: &str) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::EmptyTiers {
                family: family.to_string(),
            });
        }

        for (i, tier) in self.0.iter().enumerate() {
            if tier.threshold < Decimal::ZERO {
                return Err(ConfigError::NegativeThreshold {
                    family: family.to_string(),
                    threshold: tier.threshold,
                });
            }
            if tier.strength < Decimal::ZERO || tier.strength > Decimal::ONE {
                return Err(ConfigError::StrengthOutOfRange {
                    family: family.to_string(),
                    strength: tier.strength,
                });
            }
            if i > 0 {
                let prev = &self.0[i - 1];
                if tier.threshold <= prev.threshold {
                    return Err(ConfigError::TiersOutOfOrder {
                        family: family.to_string(),
                        index: i,
                    });
                }
                if tier.strength < prev.strength {
                    return Err(ConfigError::StrengthDecreasing {
                        family: family.to_string(),
                        index: i,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> TierTable {
        TierTable::new(vec![
            Tier::new(dec!(10), dec!(0.5)),
            Tier::new(dec!(20), dec!(0.7)),
            Tier::new(dec!(40), dec!(0.9)),
        ])
    }

    #[test]
    fn test_select_highest_met_tier() {
        let t = table();
        assert!(t.select(dec!(9.99)).is_none());
        assert_eq!(t.select(dec!(10)).unwrap().strength, dec!(0.5));
        assert_eq!(t.select(dec!(39.99)).unwrap().strength, dec!(0.7));
        assert_eq!(t.select(dec!(40)).unwrap().strength, dec!(0.9));
        assert_eq!(t.select(dec!(1000)).unwrap().threshold, dec!(40));
    }

    #[test]
    fn test_floor() {
        assert_eq!(table().floor(), Some(dec!(10)));
        assert_eq!(TierTable::new(Vec::new()).floor(), None);
    }

    #[test]
    fn test_valid_table() {
        assert!(table().validate("test").is_ok());
    }

    #[test]
    fn test_empty_table_rejected() {
        let err = TierTable::new(Vec::new()).validate("money_way").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTiers { ref family } if family == "money_way"));
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let t = TierTable::new(vec![
            Tier::new(dec!(20), dec!(0.6)),
            Tier::new(dec!(10), dec!(0.8)),
        ]);
        assert!(matches!(
            t.validate("x"),
            Err(ConfigError::TiersOutOfOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_threshold_rejected() {
        let t = TierTable::new(vec![
            Tier::new(dec!(10), dec!(0.6)),
            Tier::new(dec!(10), dec!(0.8)),
        ]);
        assert!(matches!(t.validate("x"), Err(ConfigError::TiersOutOfOrder { .. })));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let t = TierTable::new(vec![Tier::new(dec!(-1), dec!(0.6))]);
        assert!(matches!(t.validate("x"), Err(ConfigError::NegativeThreshold { .. })));
    }

    #[test]
    fn test_strength_out_of_range_rejected() {
        let t = TierTable::new(vec![Tier::new(dec!(1), dec!(1.2))]);
        assert!(matches!(t.validate("x"), Err(ConfigError::StrengthOutOfRange { .. })));
    }

    #[test]
    fn test_decreasing_strength_rejected() {
        let t = TierTable::new(vec![
            Tier::new(dec!(1), dec!(0.8)),
            Tier::new(dec!(2), dec!(0.6)),
        ]);
        assert!(matches!(t.validate("x"), Err(ConfigError::StrengthDecreasing { .. })));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            tiers: TierTable,
        }
        let w: Wrapper = toml::from_str(
            "tiers = [{ threshold = 5000, strength = 0.6 }, { threshold = 15000, strength = 0.8 }]",
        )
        .unwrap();
        assert_eq!(w.tiers.tiers().len(), 2);
        assert_eq!(w.tiers.select(dec!(15000)).unwrap().strength, dec!(0.8));
    }
}
