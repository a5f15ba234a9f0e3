//! Preliminary analysis: cheap rule families that tag markets with signals.
//!
//! Each family implements [`Rule`] and is registered in a fixed order. The
//! analyzer validates records, runs every registered rule on each valid
//! record and concatenates the results, so the output order mirrors the
//! input order and a market's signals stay contiguous.

pub mod drop_odds;
pub mod money_way;
pub mod sharp_bet;
pub mod tiers;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::{ConfigError, RuleConfiguration};
use crate::types::{MarketRecord, RecordError, Signal, SignalType};

use drop_odds::DropOddsRule;
use money_way::MoneyWayRule;
use sharp_bet::SharpBetRule;

/// A rule family evaluated independently on one market.
pub trait Rule: Send + Sync {
    fn signal_type(&self) -> SignalType;

    /// Signals this family raises for `market`, possibly none.
    fn evaluate(&self, market: &MarketRecord) -> Vec<Signal>;
}

/// A record rejected before rule evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position in the input batch.
    pub index: usize,
    pub market_id: String,
    pub reason: RecordError,
}

/// Output of one preliminary pass.
#[derive(Debug, Clone, Default)]
pub struct PreliminaryPass {
    pub signals: Vec<Signal>,
    pub skipped: Vec<SkippedRecord>,
    /// Input positions of the records that were evaluated.
    pub analyzed: Vec<usize>,
}

pub struct PreliminaryAnalyzer {
    rules: Vec<Box<dyn Rule>>,
}

impl PreliminaryAnalyzer {
    /// Build the registry from validated configuration.
    pub fn new(config: &RuleConfiguration) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rules: Vec<Box<dyn Rule>> = Vec::with_capacity(SignalType::ALL.len());
        if config.money_way.enabled {
            rules.push(Box::new(MoneyWayRule::new(&config.money_way)));
        }
        if config.drop_odds.enabled {
            rules.push(Box::new(DropOddsRule::new(&config.drop_odds)));
        }
        if config.sharp_bet.enabled {
            rules.push(Box::new(SharpBetRule::new(&config.sharp_bet)));
        }

        Ok(Self { rules })
    }

    /// Build from an explicit rule list, evaluated in the given order.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn rule_types(&self) -> Vec<SignalType> {
        self.rules.iter().map(|r| r.signal_type()).collect()
    }

    pub fn run(&self, markets: &[MarketRecord]) -> PreliminaryPass {
        let mut pass = PreliminaryPass::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(markets.len());

        for (index, market) in markets.iter().enumerate() {
            let checked = market.validate().and_then(|()| {
                if seen.contains(market.id.as_str()) {
                    Err(RecordError::DuplicateId(market.id.clone()))
                } else {
                    Ok(())
                }
            });

            if let Err(reason) = checked {
                warn!(index, market_id = %market.id, reason = %reason, "Skipping market record");
                pass.skipped.push(SkippedRecord {
                    index,
                    market_id: market.id.clone(),
                    reason,
                });
                continue;
            }

            seen.insert(market.id.as_str());
            pass.analyzed.push(index);

            let before = pass.signals.len();
            for rule in &self.rules {
                pass.signals.extend(rule.evaluate(market));
            }
            let raised = pass.signals.len() - before;
            if raised > 0 {
                debug!(market_id = %market.id, signals = raised, "Market tagged");
            }
        }

        pass
    }
}

/// One-shot preliminary pass over a batch.
pub fn analyze_preliminary(
    markets: &[MarketRecord],
    config: &RuleConfiguration,
) -> Result<Vec<Signal>, ConfigError> {
    let analyzer = PreliminaryAnalyzer::new(config)?;
    Ok(analyzer.run(markets).signals)
}
