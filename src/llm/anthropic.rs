//! Anthropic Claude deep analyzer.
//!
//! Implements `DeepAnalyzer` using the Anthropic Messages API. Handles
//! prompt construction, verdict parsing, call tracking and rate limiting
//! with exponential backoff. Only the escalated market and its own
//! signals are put in the prompt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::DeepAnalyzer;
use crate::types::{Confidence, DeepAnalysisError, MarketRecord, Signal, Verdict};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;
/// Per-request HTTP timeout when none is configured.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Shape the model is asked to answer with.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "opportunity")]
    found: bool,
    #[serde(default)]
    selection: Option<String>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    justification: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicAnalyzer {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    request_timeout: Duration,
    total_calls: AtomicU64,
}

impl AnthropicAnalyzer {
    /// `request_timeout` bounds each HTTP attempt, not the whole retry loop.
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let request_timeout = request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key: SecretString::new(api_key),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            request_timeout,
            total_calls: AtomicU64::new(0),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Total number of successful API calls made.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Send a messages request with retry + backoff.
    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, DeepAnalysisError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
            system: Some(system.to_string()),
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Anthropic API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse = response.json().await.map_err(|e| {
                            DeepAnalysisError::MalformedResponse(format!("response body: {e}"))
                        })?;

                        let text = body
                            .content
                            .iter()
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("");

                        self.total_calls.fetch_add(1, Ordering::Relaxed);
                        return Ok(text);
                    }

                    // Retryable errors: 429 (rate limit), 500+, 529 (overloaded)
                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, error = %error_text, "Retryable Anthropic API error");
                        last_error = Some(DeepAnalysisError::Status {
                            status: status.as_u16(),
                            message: error_text,
                        });
                        continue;
                    }

                    return Err(DeepAnalysisError::Status {
                        status: status.as_u16(),
                        message: error_text,
                    });
                }
                Err(e) if e.is_timeout() => {
                    warn!(attempt, error = %e, "Anthropic request timed out");
                    last_error = Some(DeepAnalysisError::Timeout {
                        millis: self.request_timeout.as_millis() as u64,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Anthropic request failed");
                    last_error = Some(DeepAnalysisError::Transport(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DeepAnalysisError::Transport(format!("gave up after {MAX_RETRIES} retries"))
        }))
    }

    /// Build the system prompt for market verdicts.
    pub fn system_prompt() -> &'static str {
        "You are KAIROS, an analyst of Betfair exchange markets. You receive one \
         market that cheap screening rules flagged, together with the signals \
         that flagged it. Decide whether it is a genuine betting opportunity.\n\n\
         RULES:\n\
         1. Weigh volume, odds movement and whether the market is in play.\n\
         2. Only call it an opportunity if the signals point to one concrete selection.\n\
         3. Prefer saying no over guessing.\n\
         4. Answer with JSON only, no surrounding text, in exactly this shape:\n\
            {\"found\": true, \"selection\": \"<outcome label>\", \
         \"confidence\": \"low|medium|high\", \"justification\": \"<one or two sentences>\"}\n\
         5. When there is no opportunity answer {\"found\": false}."
    }

    /// Build the user prompt for the escalated market.
    pub fn build_prompt(market: &MarketRecord, signals: &[Signal]) -> String {
        let mut prompt = String::with_capacity(1024);

        prompt.push_str(&format!("MARKET: \"{}\" (ID: {})\n", market.name, market.id));
        prompt.push_str(&format!("STATE: {}\n", if market.live { "in play" } else { "pre-match" }));
        prompt.push_str(&format!("MATCHED VOLUME: {}€\n", market.volume.normalize()));

        prompt.push_str("\nODDS:\n");
        for odds in &market.odds {
            match odds.reference {
                Some(reference) => prompt.push_str(&format!(
                    "- {}: {} (was {})\n",
                    odds.outcome,
                    odds.current.normalize(),
                    reference.normalize()
                )),
                None => prompt.push_str(&format!("- {}: {}\n", odds.outcome, odds.current.normalize())),
            }
        }

        prompt.push_str("\nSIGNALS:\n");
        for signal in signals {
            prompt.push_str(&format!(
                "- [{}] strength {}: {}\n",
                signal.signal_type,
                signal.strength.normalize(),
                signal.description
            ));
        }

        prompt.push_str("\nGive your verdict as JSON.\n");
        prompt
    }

    /// Parse a verdict from the model's reply.
    ///
    /// The JSON object is taken from the first `{` to the last `}`, so code
    /// fences and stray prose around it are tolerated.
    pub fn parse_verdict(text: &str) -> Result<Verdict, DeepAnalysisError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if e > s => &text[s..=e],
            _ => {
                return Err(DeepAnalysisError::MalformedResponse(
                    "no JSON object in reply".to_string(),
                ))
            }
        };

        let raw: RawVerdict = serde_json::from_str(json)
            .map_err(|e| DeepAnalysisError::MalformedResponse(e.to_string()))?;

        if !raw.found {
            return Ok(Verdict::no_opportunity());
        }

        let selection = raw
            .selection
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DeepAnalysisError::MalformedResponse("opportunity without a selection".to_string())
            })?;

        let confidence = raw
            .confidence
            .as_ref()
            .and_then(Self::parse_confidence)
            .unwrap_or(Confidence::Low);

        Ok(Verdict {
            found: true,
            selection: Some(selection),
            confidence: Some(confidence),
            justification: raw.justification,
        })
    }

    /// Accepts a label ("high", "médio") or a 0–1 score.
    fn parse_confidence(value: &serde_json::Value) -> Option<Confidence> {
        match value {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n
                .as_f64()
                .and_then(Decimal::from_f64)
                .map(Confidence::from_score),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeepAnalyzer implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl DeepAnalyzer for AnthropicAnalyzer {
    async fn evaluate(
        &self,
        market: &MarketRecord,
        signals: &[Signal],
    ) -> Result<Verdict, DeepAnalysisError> {
        let system = Self::system_prompt();
        let user_msg = Self::build_prompt(market, signals);

        debug!(
            market_id = %market.id,
            model = %self.model,
            signals = signals.len(),
            "Requesting deep analysis"
        );

        let text = self.call_api(system, &user_msg).await?;
        let verdict = Self::parse_verdict(&text)?;

        info!(
            market_id = %market.id,
            found = verdict.found,
            selection = ?verdict.selection,
            "Anthropic verdict received"
        );

        Ok(verdict)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutcomeOdds, SignalType};
    use rust_decimal_macros::dec;

    fn make_market() -> MarketRecord {
        let mut m = MarketRecord::sample("1.234", dec!(25000), true);
        m.name = "Benfica v Porto - Match Odds".into();
        m.odds[0] = OutcomeOdds {
            outcome: "Benfica".into(),
            current: dec!(2.20),
            reference: Some(dec!(2.50)),
        };
        m
    }

    fn make_signal() -> Signal {
        Signal {
            signal_type: SignalType::DropOdds,
            market_id: "1.234".into(),
            outcome: Some("Benfica".into()),
            description: "Drop odds on Benfica: 2.5 -> 2.2 (12% drop, 10% tier)".into(),
            strength: dec!(0.8),
            metric: dec!(12),
        }
    }

    // -- Prompt construction tests ---------------------------------------

    #[test]
    fn test_system_prompt_not_empty() {
        let sp = AnthropicAnalyzer::system_prompt();
        assert!(sp.contains("KAIROS"));
        assert!(sp.contains("\"found\""));
        assert!(sp.contains("justification"));
    }

    #[test]
    fn test_build_prompt() {
        let prompt = AnthropicAnalyzer::build_prompt(&make_market(), &[make_signal()]);
        assert!(prompt.contains("Benfica v Porto"));
        assert!(prompt.contains("in play"));
        assert!(prompt.contains("25000€"));
        assert!(prompt.contains("Benfica: 2.2 (was 2.5)"));
        assert!(prompt.contains("[drop-odds] strength 0.8"));
    }

    // -- Parse tests -----------------------------------------------------

    #[test]
    fn test_parse_verdict_plain() {
        let text = r#"{"found": true, "selection": "Benfica", "confidence": "high", "justification": "Steam on the home side"}"#;
        let v = AnthropicAnalyzer::parse_verdict(text).unwrap();
        assert!(v.found);
        assert_eq!(v.selection.as_deref(), Some("Benfica"));
        assert_eq!(v.confidence, Some(Confidence::High));
        assert_eq!(v.justification.as_deref(), Some("Steam on the home side"));
    }

    #[test]
    fn test_parse_verdict_fenced() {
        let text = "Here you go:\n```json\n{\"found\": true, \"selection\": \"Over 2.5\", \"confidence\": 0.65}\n```";
        let v = AnthropicAnalyzer::parse_verdict(text).unwrap();
        assert_eq!(v.selection.as_deref(), Some("Over 2.5"));
        assert_eq!(v.confidence, Some(Confidence::Medium));
        assert!(v.justification.is_none());
    }

    #[test]
    fn test_parse_verdict_no_opportunity() {
        let v = AnthropicAnalyzer::parse_verdict(r#"{"found": false, "selection": "Draw"}"#).unwrap();
        assert_eq!(v, Verdict::no_opportunity());
    }

    #[test]
    fn test_parse_verdict_unknown_confidence_defaults_low() {
        let v = AnthropicAnalyzer::parse_verdict(
            r#"{"found": true, "selection": "Draw", "confidence": "certain"}"#,
        )
        .unwrap();
        assert_eq!(v.confidence, Some(Confidence::Low));
    }

    #[test]
    fn test_parse_verdict_garbage_fails() {
        assert!(matches!(
            AnthropicAnalyzer::parse_verdict("I cannot assess this market."),
            Err(DeepAnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            AnthropicAnalyzer::parse_verdict("{not json}"),
            Err(DeepAnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_verdict_found_without_selection_fails() {
        assert!(AnthropicAnalyzer::parse_verdict(r#"{"found": true, "selection": "  "}"#).is_err());
        assert!(AnthropicAnalyzer::parse_verdict(r#"{"found": true}"#).is_err());
    }

    // -- Client construction tests ---------------------------------------

    #[test]
    fn test_client_construction() {
        let client = AnthropicAnalyzer::new("test-key".to_string(), None, None, None).unwrap();
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(client.total_calls(), 0);
    }

    #[test]
    fn test_client_custom_model() {
        let client = AnthropicAnalyzer::new(
            "test-key".to_string(),
            Some("claude-3-5-haiku-latest".to_string()),
            Some(2048),
            None,
        )
        .unwrap();
        assert_eq!(client.model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_client_request_timeout_from_config() {
        let timeout = crate::config::EscalationConfig::default().timeout();
        let client =
            AnthropicAnalyzer::new("test-key".to_string(), None, None, Some(timeout)).unwrap();
        assert_eq!(client.request_timeout(), Duration::from_secs(30));

        let short = AnthropicAnalyzer::new(
            "test-key".to_string(),
            None,
            None,
            Some(Duration::from_millis(1500)),
        )
        .unwrap();
        assert_eq!(short.request_timeout(), Duration::from_millis(1500));
    }
}
