//! KAIROS: two-tier betting market signal scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! picks a deep analyzer and runs the snapshot → preliminary → escalate
//! loop with graceful shutdown.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use kairos::config;
use kairos::engine::{BatchSummary, EscalationOrchestrator};
use kairos::ingest;
use kairos::llm::anthropic::AnthropicAnalyzer;
use kairos::llm::heuristic::HeuristicAnalyzer;
use kairos::llm::DeepAnalyzer;

const BANNER: &str = r#"
 _  __    _    ___ ____   ___  ____
| |/ /   / \  |_ _|  _ \ / _ \/ ___|
| ' /   / _ \  | || |_) | | | \___ \
| . \  / ___ \ | ||  _ <| |_| |___) |
|_|\_\/_/   \_\___|_| \_\\___/|____/

  Betfair market signal scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");

    // Snapshot path: first CLI argument, else the configured one
    let snapshot_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| cfg.agent.snapshot_path.clone());

    info!(
        agent_name = %cfg.agent.name,
        scan_interval_secs = cfg.agent.scan_interval_secs,
        snapshot = %snapshot_path,
        floor = %cfg.rules.escalation.floor,
        "KAIROS starting up"
    );

    // -- Initialise components -------------------------------------------

    let orchestrator = EscalationOrchestrator::new(&cfg.rules)
        .context("Failed to build escalation orchestrator")?;
    let deep = build_analyzer(&cfg.llm, cfg.rules.escalation.timeout())?;

    // -- Main loop -------------------------------------------------------

    if cfg.agent.scan_interval_secs == 0 {
        if let Err(e) = run_batch(&orchestrator, deep.as_ref(), &snapshot_path).await {
            error!(error = %e, "Batch failed");
            return Err(e);
        }
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.scan_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_batch(&orchestrator, deep.as_ref(), &snapshot_path).await {
                    error!(error = %e, "Batch failed, continuing to next");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("KAIROS shut down cleanly.");
    Ok(())
}

/// Pick the deep analyzer: Anthropic when a key is available, otherwise
/// the local heuristic.
fn build_analyzer(
    llm: &config::LlmConfig,
    request_timeout: Duration,
) -> Result<Box<dyn DeepAnalyzer>> {
    match llm.provider.as_str() {
        "anthropic" => match config::AppConfig::resolve_env(&llm.api_key_env) {
            Ok(key) if !key.is_empty() => {
                let analyzer = AnthropicAnalyzer::new(
                    key,
                    Some(llm.model.clone()),
                    Some(llm.max_tokens),
                    Some(request_timeout),
                )?;
                info!(
                    model = %analyzer.model_name(),
                    request_timeout_ms = analyzer.request_timeout().as_millis() as u64,
                    "Using Anthropic deep analyzer"
                );
                Ok(Box::new(analyzer))
            }
            _ => {
                warn!(
                    env = %llm.api_key_env,
                    "No LLM API key configured, falling back to heuristic analyzer"
                );
                Ok(Box::new(HeuristicAnalyzer::new()))
            }
        },
        "heuristic" => {
            info!("Using heuristic deep analyzer");
            Ok(Box::new(HeuristicAnalyzer::new()))
        }
        other => {
            warn!(provider = other, "Unknown LLM provider, using heuristic analyzer");
            Ok(Box::new(HeuristicAnalyzer::new()))
        }
    }
}

/// Load one snapshot and run it through both tiers.
async fn run_batch(
    orchestrator: &EscalationOrchestrator,
    deep: &dyn DeepAnalyzer,
    snapshot_path: &str,
) -> Result<BatchSummary> {
    let markets = ingest::load_snapshot(snapshot_path)?;
    let result = orchestrator.analyze_two_tier(&markets, deep).await;

    for skipped in &result.skipped {
        warn!(
            index = skipped.index,
            market_id = %skipped.market_id,
            reason = %skipped.reason,
            "Record skipped"
        );
    }

    log_batch_summary(&result.summary);
    println!("{}", result.summary);

    Ok(result.summary)
}

/// Log a structured batch summary.
fn log_batch_summary(summary: &BatchSummary) {
    info!(
        batch_id = %summary.batch_id,
        received = summary.markets_received,
        analyzed = summary.markets_analyzed,
        skipped = summary.markets_skipped,
        signals = summary.total_signals(),
        strong = summary.strong_signals.len(),
        escalated = ?summary.escalated_market,
        calls = summary.deep_analysis_calls,
        outcome = %summary.outcome,
        "Batch complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kairos=info"));

    let json_logging = std::env::var("KAIROS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
