//! Thin CLI: run one debate session against an OpenAI-compatible endpoint
//! and stream observer events to stdout.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rostrum::events::DebateEvent;
use rostrum::{
    init_tracing, AnalysisKind, ArgumentAnalyzer, BreakerConfig, BreakerTable, CostTier,
    DebateConfig, DebateService, EventBus, ModelClient, ModelPool, ModelSpec,
    OpenAiCompatProvider, ResilientClient, RetryLedger, RetryPolicy, RotationStrategy,
    SessionRequest,
};

#[derive(Parser, Debug)]
#[command(name = "rostrum", about = "Multi-model debate orchestrator")]
struct Args {
    /// The motion to debate.
    topic: String,

    /// Number of debaters (a judge is always added).
    #[arg(long, default_value_t = 2)]
    debaters: u8,

    /// Models available to the pool, as `id` or `id:tier`
    /// (tier one of economy|standard|premium).
    #[arg(long = "model", required = true)]
    models: Vec<String>,

    /// Chat-completions endpoint URL. Falls back to ROSTRUM_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the endpoint. Falls back to ROSTRUM_API_KEY.
    #[arg(long)]
    api_key: Option<String>,

    /// Rotation strategy
    /// (fixed|round_robin|performance_based|adaptive|balanced).
    #[arg(long, default_value = "adaptive")]
    strategy: String,

    /// Cap on middle-phase rounds.
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Optional reference material file passed to every prompt.
    #[arg(long)]
    reference: Option<std::path::PathBuf>,

    /// Optional TOML config file.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn parse_model(raw: &str) -> Result<ModelSpec> {
    match raw.split_once(':') {
        None => Ok(ModelSpec::new(raw, CostTier::Standard)),
        Some((id, tier)) => {
            let tier = match tier {
                "economy" => CostTier::Economy,
                "standard" => CostTier::Standard,
                "premium" => CostTier::Premium,
                other => anyhow::bail!("unknown tier: {other}"),
            };
            Ok(ModelSpec::new(id, tier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DebateConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DebateConfig::default(),
    };

    let strategy: RotationStrategy = args
        .strategy
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let specs = args
        .models
        .iter()
        .map(|raw| parse_model(raw))
        .collect::<Result<Vec<_>>>()?;
    let pool = Arc::new(ModelPool::new(specs)?);

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| std::env::var("ROSTRUM_ENDPOINT").ok())
        .context("no endpoint: pass --endpoint or set ROSTRUM_ENDPOINT")?;
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("ROSTRUM_API_KEY").ok());

    let provider = Arc::new(OpenAiCompatProvider::new(endpoint, api_key)?);
    let client = Arc::new(ResilientClient::new(
        ModelClient::new(provider).with_prices(HashMap::new()),
        RetryPolicy::from_config(&config),
        Arc::new(RetryLedger::new()),
        Arc::new(BreakerTable::new(BreakerConfig::from_config(&config))),
    ));
    let analyzer = Arc::new(ArgumentAnalyzer::new(config.strength_weights)?);

    let service = DebateService::new(
        config,
        pool,
        client,
        analyzer,
        EventBus::new().shared(),
    )?;

    let reference = match &args.reference {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading reference from {}", path.display()))?,
        ),
        None => None,
    };

    let mut request = SessionRequest::new(args.topic, args.debaters).with_strategy(strategy);
    if let Some(reference) = reference {
        request = request.with_reference(reference);
    }
    if let Some(max_rounds) = args.max_rounds {
        request = request.with_max_rounds(max_rounds);
    }

    let created = service.create_session(request)?;
    info!(session_id = %created.id, "session created");
    for (role, model) in &created.assignment {
        println!("{role} → {model}");
    }

    let mut events = service.subscribe();
    service.start_session(&created.id)?;

    loop {
        let sequenced = events.recv().await.context("event stream closed")?;
        if sequenced.event.session_id() != created.id {
            continue;
        }
        match &sequenced.event {
            DebateEvent::PhaseEntered { phase, .. } => println!("── phase: {phase}"),
            DebateEvent::TurnCompleted { turn, .. } => {
                println!(
                    "[{}] {} ({}, strength {:.2}):\n{}\n",
                    turn.index, turn.role, turn.model, turn.analysis.strength, turn.content
                );
            }
            DebateEvent::RoundClosed { round_index, decision, .. } => {
                println!(
                    "── round {round_index} closed: {} (score {:.2})",
                    decision.action, decision.score
                );
            }
            DebateEvent::RotationApplied { decision, .. } => {
                println!(
                    "── rotation: {} {} → {} ({})",
                    decision.role, decision.old_model, decision.new_model, decision.reason
                );
            }
            DebateEvent::SessionEnded { status, reason, .. } => {
                println!("── session ended: {status} {}", reason.as_deref().unwrap_or(""));
                break;
            }
            DebateEvent::SessionStarted { .. } => {}
        }
    }

    if let Ok(rostrum::AnalyticsArtifact::Report(report)) =
        service.get_analytics(&created.id, AnalysisKind::Report).await
    {
        println!("\n{}", report.summary);
    }

    Ok(())
}
