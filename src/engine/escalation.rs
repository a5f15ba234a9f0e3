//! Escalation orchestrator: preliminary pass → selection → deep analysis.
//!
//! Markets are scored by the strongest signal they raised. Markets at or
//! above the escalation floor become candidates; a [`SelectionPolicy`]
//! picks at most one of them, and only that market (with its own signals)
//! is sent to the deep analyzer under a timeout.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigError, RuleConfiguration};
use crate::engine::summary::BatchSummary;
use crate::llm::DeepAnalyzer;
use crate::signals::{PreliminaryAnalyzer, PreliminaryPass, SkippedRecord};
use crate::types::{DeepAnalysisError, EscalationError, MarketRecord, Opportunity, Signal};

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// A market that reached the escalation floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub market_id: String,
    /// Input position of the market in the batch.
    pub position: usize,
    /// Maximum strength among the market's signals.
    pub score: Decimal,
    pub signal_count: usize,
}

/// Chooses which candidate, if any, gets the single deep-analysis call.
pub trait SelectionPolicy: Send + Sync {
    /// `candidates` are in input order.
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// Highest score wins; ties go to the earliest market in the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrongestMarket;

impl SelectionPolicy for StrongestMarket {
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in candidates {
            match best {
                Some(b) if candidate.score <= b.score => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

/// Per-market scores for every analyzed market that reached `floor`, in
/// input order.
pub fn qualifying_candidates(
    markets: &[MarketRecord],
    pass: &PreliminaryPass,
    floor: Decimal,
) -> Vec<Candidate> {
    let mut scores: HashMap<&str, (Decimal, usize)> = HashMap::new();
    for signal in &pass.signals {
        let entry = scores
            .entry(signal.market_id.as_str())
            .or_insert((signal.strength, 0));
        entry.0 = entry.0.max(signal.strength);
        entry.1 += 1;
    }

    pass.analyzed
        .iter()
        .filter_map(|&position| {
            let market = markets.get(position)?;
            let &(score, signal_count) = scores.get(market.id.as_str())?;
            (score >= floor).then(|| Candidate {
                market_id: market.id.clone(),
                position,
                score,
                signal_count,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Batch result
// ---------------------------------------------------------------------------

/// Everything produced for one batch.
#[derive(Debug)]
pub struct BatchResult {
    /// Full preliminary signal list, kept even when escalation fails.
    pub signals: Vec<Signal>,
    pub skipped: Vec<SkippedRecord>,
    pub opportunity: Result<Opportunity, EscalationError>,
    pub summary: BatchSummary,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct EscalationOrchestrator {
    preliminary: PreliminaryAnalyzer,
    policy: Box<dyn SelectionPolicy>,
    floor: Decimal,
    timeout: Duration,
}

impl EscalationOrchestrator {
    /// Build from a rule configuration snapshot, validating it first.
    pub fn new(config: &RuleConfiguration) -> Result<Self, ConfigError> {
        Ok(Self {
            preliminary: PreliminaryAnalyzer::new(config)?,
            policy: Box::new(StrongestMarket),
            floor: config.escalation.floor,
            timeout: config.escalation.timeout(),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn floor(&self) -> Decimal {
        self.floor
    }

    /// Run both tiers over a batch. Makes at most one deep-analysis call.
    pub async fn analyze_two_tier(
        &self,
        markets: &[MarketRecord],
        deep: &dyn DeepAnalyzer,
    ) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let pass = self.preliminary.run(markets);
        let candidates = qualifying_candidates(markets, &pass, self.floor);

        debug!(
            %batch_id,
            markets = markets.len(),
            signals = pass.signals.len(),
            candidates = candidates.len(),
            "Preliminary pass complete"
        );

        let (escalated_market, opportunity) = match self.policy.select(&candidates) {
            None => {
                info!(%batch_id, floor = %self.floor, "No market reached the escalation floor");
                (None, Ok(Opportunity::not_found()))
            }
            Some(candidate) => {
                let market = &markets[candidate.position];
                let signals: Vec<Signal> = pass
                    .signals
                    .iter()
                    .filter(|s| s.market_id == market.id)
                    .cloned()
                    .collect();

                info!(
                    %batch_id,
                    market_id = %market.id,
                    score = %candidate.score,
                    signals = signals.len(),
                    candidates = candidates.len(),
                    "Escalating market to deep analysis"
                );

                let result = self.escalate(market, signals, deep).await;
                (Some(market.id.clone()), result)
            }
        };

        let summary = BatchSummary::build(
            batch_id,
            markets.len(),
            &pass,
            self.floor,
            escalated_market,
            &opportunity,
        );

        BatchResult {
            signals: pass.signals,
            skipped: pass.skipped,
            opportunity,
            summary,
        }
    }

    async fn escalate(
        &self,
        market: &MarketRecord,
        signals: Vec<Signal>,
        deep: &dyn DeepAnalyzer,
    ) -> Result<Opportunity, EscalationError> {
        let verdict = match tokio::time::timeout(self.timeout, deep.evaluate(market, &signals)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(source)) => {
                warn!(market_id = %market.id, error = %source, "Deep analysis failed");
                return Err(EscalationError {
                    market_id: market.id.clone(),
                    source,
                });
            }
            Err(_) => {
                let millis = self.timeout.as_millis() as u64;
                warn!(market_id = %market.id, timeout_ms = millis, "Deep analysis timed out");
                return Err(EscalationError {
                    market_id: market.id.clone(),
                    source: DeepAnalysisError::Timeout { millis },
                });
            }
        };

        // A positive verdict must name what to back, whatever the analyzer.
        let has_selection = verdict
            .selection
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if verdict.found && !has_selection {
            warn!(market_id = %market.id, "Deep analysis found an opportunity without a selection");
            return Err(EscalationError {
                market_id: market.id.clone(),
                source: DeepAnalysisError::MalformedResponse(
                    "positive verdict without a selection".into(),
                ),
            });
        }

        info!(
            market_id = %market.id,
            found = verdict.found,
            selection = ?verdict.selection,
            confidence = ?verdict.confidence,
            "Deep analysis verdict"
        );

        Ok(Opportunity::from_verdict(market, signals, verdict))
    }
}

/// One-shot two-tier analysis with a fresh orchestrator.
pub async fn analyze_two_tier(
    markets: &[MarketRecord],
    config: &RuleConfiguration,
    deep: &dyn DeepAnalyzer,
) -> Result<BatchResult, ConfigError> {
    let orchestrator = EscalationOrchestrator::new(config)?;
    Ok(orchestrator.analyze_two_tier(markets, deep).await)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::summary::BatchOutcome;
    use crate::llm::MockDeepAnalyzer;
    use crate::types::{Confidence, OutcomeOdds, Verdict};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn make_market(id: &str, volume: Decimal, live: bool) -> MarketRecord {
        MarketRecord::sample(id, volume, live)
    }

    fn make_dropping_market(id: &str, volume: Decimal, live: bool) -> MarketRecord {
        let mut m = MarketRecord::sample(id, volume, live);
        m.odds[0] = OutcomeOdds {
            outcome: "Home".into(),
            current: dec!(2.20),
            reference: Some(dec!(2.50)),
        };
        m
    }

    fn make_candidate(id: &str, position: usize, score: Decimal) -> Candidate {
        Candidate {
            market_id: id.into(),
            position,
            score,
            signal_count: 1,
        }
    }

    fn orchestrator() -> EscalationOrchestrator {
        EscalationOrchestrator::new(&RuleConfiguration::default()).unwrap()
    }

    // -- Selection ---------------------------------------------------------

    #[test]
    fn test_strongest_market_picks_highest() {
        let c = vec![
            make_candidate("a", 0, dec!(0.8)),
            make_candidate("b", 1, dec!(1.0)),
            make_candidate("c", 2, dec!(0.9)),
        ];
        assert_eq!(StrongestMarket.select(&c).unwrap().market_id, "b");
    }

    #[test]
    fn test_strongest_market_tie_goes_to_earliest() {
        let c = vec![
            make_candidate("a", 0, dec!(0.9)),
            make_candidate("b", 1, dec!(0.9)),
        ];
        assert_eq!(StrongestMarket.select(&c).unwrap().market_id, "a");
        assert!(StrongestMarket.select(&[]).is_none());
    }

    #[test]
    fn test_qualifying_candidates_uses_max_strength() {
        let markets = vec![
            make_market("low", dec!(6000), false),
            make_dropping_market("mid", dec!(100), false),
            make_market("high", dec!(35000), false),
        ];
        let pass = PreliminaryAnalyzer::new(&RuleConfiguration::default())
            .unwrap()
            .run(&markets);
        let c = qualifying_candidates(&markets, &pass, dec!(0.8));
        let ids: Vec<&str> = c.iter().map(|c| c.market_id.as_str()).collect();
        assert_eq!(ids, vec!["mid", "high"]);
        assert_eq!(c[0].score, dec!(0.8));
        assert_eq!(c[1].score, dec!(1.0));
        assert_eq!(c[1].position, 2);
    }

    // -- Two-tier ----------------------------------------------------------

    #[tokio::test]
    async fn test_below_floor_never_calls_deep_analysis() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate().times(0);

        let markets = vec![make_market("m1", dec!(6000), false), make_market("m2", dec!(12000), true)];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;

        assert_eq!(result.signals.len(), 3);
        let opp = result.opportunity.unwrap();
        assert!(!opp.found);
        assert_eq!(result.summary.deep_analysis_calls, 0);
        assert_eq!(result.summary.outcome, BatchOutcome::NotEscalated);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate().times(0);

        let result = orchestrator().analyze_two_tier(&[], &deep).await;
        assert!(result.signals.is_empty());
        assert!(!result.opportunity.unwrap().found);
        assert_eq!(result.summary.markets_received, 0);
    }

    #[tokio::test]
    async fn test_only_strongest_market_is_sent_with_its_own_signals() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate()
            .withf(|market, signals| {
                market.id == "m3" && !signals.is_empty() && signals.iter().all(|s| s.market_id == "m3")
            })
            .times(1)
            .returning(|_, _| Ok(Verdict::opportunity("Home", Confidence::High, "Money pouring in")));

        let markets = vec![
            make_dropping_market("m1", dec!(25000), true),
            make_market("m2", dec!(100), false),
            make_market("m3", dec!(40000), false),
        ];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;

        let opp = result.opportunity.unwrap();
        assert!(opp.found);
        assert_eq!(opp.market_id.as_deref(), Some("m3"));
        assert_eq!(opp.selection.as_deref(), Some("Home"));
        assert_eq!(opp.confidence, Some(Confidence::High));
        assert!(opp.signals.iter().all(|s| s.market_id == "m3"));
        assert_eq!(result.summary.escalated_market.as_deref(), Some("m3"));
        assert_eq!(result.summary.deep_analysis_calls, 1);
        // m1's signals are still reported
        assert!(result.signals.iter().any(|s| s.market_id == "m1"));
    }

    #[tokio::test]
    async fn test_declined_verdict_is_not_found() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate()
            .times(1)
            .returning(|_, _| Ok(Verdict::no_opportunity()));

        let markets = vec![make_market("m1", dec!(30000), false)];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;
        let opp = result.opportunity.unwrap();
        assert!(!opp.found);
        assert!(opp.selection.is_none());
        assert_eq!(opp.signals.len(), 1);
        assert_eq!(result.summary.outcome, BatchOutcome::NoOpportunity);
    }

    #[tokio::test]
    async fn test_failure_keeps_signals() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate()
            .times(1)
            .returning(|_, _| Err(DeepAnalysisError::Transport("connection refused".into())));

        let markets = vec![make_dropping_market("m1", dec!(25000), true)];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;

        assert_eq!(result.signals.len(), 3);
        let err = result.opportunity.unwrap_err();
        assert_eq!(err.market_id, "m1");
        assert!(matches!(err.source, DeepAnalysisError::Transport(_)));
        assert_eq!(result.summary.outcome, BatchOutcome::EscalationFailed);
    }

    struct StalledAnalyzer;

    #[async_trait]
    impl DeepAnalyzer for StalledAnalyzer {
        async fn evaluate(
            &self,
            _market: &MarketRecord,
            _signals: &[Signal],
        ) -> Result<Verdict, DeepAnalysisError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Verdict::no_opportunity())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_an_error_not_a_verdict() {
        let orch = orchestrator().with_timeout(Duration::from_millis(20));
        let markets = vec![make_market("m1", dec!(30000), false)];
        let result = orch.analyze_two_tier(&markets, &StalledAnalyzer).await;

        let err = result.opportunity.unwrap_err();
        assert_eq!(err.source, DeepAnalysisError::Timeout { millis: 20 });
        assert!(err.to_string().contains("20ms"));
        assert_eq!(result.signals.len(), 1);
    }

    #[tokio::test]
    async fn test_found_verdict_without_selection_is_malformed() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate().times(1).returning(|_, _| {
            Ok(Verdict {
                found: true,
                selection: None,
                confidence: None,
                justification: None,
            })
        });

        let markets = vec![make_dropping_market("m1", dec!(25000), true)];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;

        let err = result.opportunity.unwrap_err();
        assert_eq!(err.market_id, "m1");
        assert!(matches!(err.source, DeepAnalysisError::MalformedResponse(_)));
        assert_eq!(result.signals.len(), 3);
        assert_eq!(result.summary.outcome, BatchOutcome::EscalationFailed);
    }

    #[tokio::test]
    async fn test_found_verdict_with_blank_selection_is_malformed() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate()
            .times(1)
            .returning(|_, _| Ok(Verdict::opportunity("  ", Confidence::High, "Strong move")));

        let markets = vec![make_market("m1", dec!(30000), false)];
        let result = orchestrator().analyze_two_tier(&markets, &deep).await;

        let err = result.opportunity.unwrap_err();
        assert!(matches!(err.source, DeepAnalysisError::MalformedResponse(_)));
    }

    struct LastCandidate;

    impl SelectionPolicy for LastCandidate {
        fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
            candidates.last()
        }
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let mut deep = MockDeepAnalyzer::new();
        deep.expect_evaluate()
            .withf(|market, _| market.id == "b")
            .times(1)
            .returning(|_, _| Ok(Verdict::no_opportunity()));

        let orch = orchestrator().with_policy(Box::new(LastCandidate));
        let markets = vec![make_market("a", dec!(40000), false), make_market("b", dec!(16000), false)];
        let result = orch.analyze_two_tier(&markets, &deep).await;
        assert_eq!(result.summary.escalated_market.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_free_function_rejects_bad_config() {
        let mut config = RuleConfiguration::default();
        config.escalation.timeout_secs = 0;
        let deep = MockDeepAnalyzer::new();
        assert!(analyze_two_tier(&[], &config, &deep).await.is_err());
    }
}
