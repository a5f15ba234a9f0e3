//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Rule tiers fall back to built-in defaults for any table left out and are
//! validated before the first batch is analyzed. Secrets (API keys) are
//! referenced by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::signals::tiers::{Tier, TierTable};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub rules: RuleConfiguration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Seconds between batches; 0 runs a single batch and exits.
    pub scan_interval_secs: u64,
    /// JSON snapshot written by the ingestion side.
    pub snapshot_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// "anthropic" or "heuristic".
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
}

// ---------------------------------------------------------------------------
// Rule configuration
// ---------------------------------------------------------------------------

/// Tunables for the preliminary pass and the escalation step.
///
/// Built once at startup and treated as read-only while a batch runs.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RuleConfiguration {
    pub money_way: MoneyWayConfig,
    pub drop_odds: DropOddsConfig,
    pub sharp_bet: SharpBetConfig,
    pub escalation: EscalationConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MoneyWayConfig {
    pub enabled: bool,
    /// Tiers keyed on traded volume.
    pub tiers: TierTable,
}

impl Default for MoneyWayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiers: TierTable::new(vec![
                Tier::new(dec!(5000), dec!(0.6)),
                Tier::new(dec!(15000), dec!(0.8)),
                Tier::new(dec!(30000), dec!(1.0)),
            ]),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DropOddsConfig {
    pub enabled: bool,
    /// Tiers keyed on percentage drop from the reference odds.
    pub tiers: TierTable,
}

impl Default for DropOddsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiers: TierTable::new(vec![
                Tier::new(dec!(5), dec!(0.6)),
                Tier::new(dec!(10), dec!(0.8)),
                Tier::new(dec!(20), dec!(1.0)),
            ]),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SharpBetConfig {
    pub enabled: bool,
    /// Tiers keyed on in-play volume.
    pub tiers: TierTable,
    /// In-play volume below this never counts as a sharp bet.
    pub min_live_volume: Decimal,
}

impl Default for SharpBetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiers: TierTable::new(vec![
                Tier::new(dec!(10000), dec!(0.7)),
                Tier::new(dec!(20000), dec!(0.9)),
            ]),
            min_live_volume: dec!(10000),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EscalationConfig {
    /// Minimum signal strength that sends a market to deep analysis.
    pub floor: Decimal,
    /// Upper bound on a single deep-analysis call.
    pub timeout_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            floor: dec!(0.8),
            timeout_secs: 30,
        }
    }
}

impl EscalationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RuleConfiguration {
    /// Fail fast on settings that would silently pick wrong tiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.money_way.tiers.validate("money_way")?;
        self.drop_odds.tiers.validate("drop_odds")?;
        self.sharp_bet.tiers.validate("sharp_bet")?;

        if self.sharp_bet.min_live_volume < Decimal::ZERO {
            return Err(ConfigError::NegativeLiveFloor(self.sharp_bet.min_live_volume));
        }
        if self.escalation.floor < Decimal::ZERO || self.escalation.floor > Decimal::ONE {
            return Err(ConfigError::FloorOutOfRange(self.escalation.floor));
        }
        if self.escalation.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Invalid rule configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Rule family {family} has no tiers")]
    EmptyTiers { family: String },

    #[error("Rule family {family} has a negative threshold: {threshold}")]
    NegativeThreshold { family: String, threshold: Decimal },

    #[error("Rule family {family} has strength {strength} outside [0, 1]")]
    StrengthOutOfRange { family: String, strength: Decimal },

    #[error("Rule family {family}: tier {index} threshold is not above the previous one")]
    TiersOutOfOrder { family: String, index: usize },

    #[error("Rule family {family}: tier {index} strength is below the previous one")]
    StrengthDecreasing { family: String, index: usize },

    #[error("Sharp bet live volume floor is negative: {0}")]
    NegativeLiveFloor(Decimal),

    #[error("Escalation floor {0} outside [0, 1]")]
    FloorOutOfRange(Decimal),

    #[error("Deep analysis timeout must be at least one second")]
    ZeroTimeout,
}

impl AppConfig {
    /// Load configuration from a TOML file and validate the rule tables.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config
            .rules
            .validate()
            .context("Invalid rule configuration")?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
