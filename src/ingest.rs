//! Snapshot ingestion boundary.
//!
//! The scraper side hands over a JSON array of market records. Volume may
//! arrive as a plain number or as the exchange's display string
//! ("15 040€", "15,040 €"); both are normalised here so the core only ever
//! sees decimals.

use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::types::MarketRecord;

/// Parse a display volume such as "15 040€" into a decimal amount.
pub fn parse_volume(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '€' | ',' | ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVolume {
    Number(Decimal),
    Text(String),
}

/// Serde hook for `MarketRecord::volume`.
pub fn deserialize_volume<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    match RawVolume::deserialize(deserializer)? {
        RawVolume::Number(v) => Ok(v),
        RawVolume::Text(s) => parse_volume(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unparseable volume: {s:?}"))),
    }
}

/// Load a batch of market records from a JSON snapshot file.
pub fn load_snapshot(path: &str) -> Result<Vec<MarketRecord>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read market snapshot: {path}"))?;
    let markets: Vec<MarketRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse market snapshot: {path}"))?;
    info!(path, markets = markets.len(), "Snapshot loaded");
    Ok(markets)
}
