//! Paperforge CLI entry point.
//!
//! Binary name: `paperforge`
//!
//! Parses arguments, initializes telemetry and the OpenRouter-backed task
//! service, then runs a single research task to completion. Ctrl-C requests
//! cooperative cancellation; the task stops at the next node boundary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use paperforge_core::resilience::BreakerRegistry;
use paperforge_core::service::TaskService;
use paperforge_infra::audit::JsonlRecorder;
use paperforge_infra::config::AppConfig;
use paperforge_infra::llm::{OpenRouterClient, StaticPricingTable};

/// Generate a sourced research paper on a topic.
#[derive(Parser)]
#[command(name = "paperforge", version, about, long_about = None)]
struct Cli {
    /// Research topic.
    topic: String,

    /// Extra requirements passed to the planner (length, angle, audience).
    #[arg(long, default_value = "")]
    requirements: String,

    /// Config file; a missing file falls back to built-in defaults.
    #[arg(long, default_value = "paperforge.toml")]
    config: PathBuf,

    /// Write the finished paper here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bridge tracing spans to an OpenTelemetry stdout exporter.
    #[arg(long)]
    otel: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info,paperforge=debug",
        _ => "trace",
    };
    let _telemetry = paperforge_observe::init(filter, cli.otel)?;

    let config = AppConfig::load(&cli.config)?;
    let api_key = AppConfig::api_key()?;

    let generator = Arc::new(OpenRouterClient::new(api_key, config.openrouter.clone())?);
    let pricing = Arc::new(StaticPricingTable::new(&config.pricing));
    let recorder = Arc::new(JsonlRecorder::new(&config.audit.dir)?);
    let service = TaskService::new(
        generator,
        recorder,
        pricing,
        config.retry,
        Arc::new(BreakerRegistry::with_defaults()),
        config.models.clone(),
    );

    let task_id = service.start(cli.topic, cli.requirements);
    tracing::info!(%task_id, "task submitted");

    // The wait future is pinned once so the Ctrl-C arm can resume it after
    // requesting cancellation.
    let wait = service.wait(task_id);
    tokio::pin!(wait);
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(%task_id, "interrupt received; cancelling");
            service.cancel(task_id)?;
            wait.as_mut().await?;
        }
        res = &mut wait => res?,
    }

    let result = service.result(task_id)?;
    let status = service.status(task_id)?;
    tracing::info!(
        %task_id,
        sources = result.sources.len(),
        contradictions = result.contradictions.len(),
        tokens = status.tokens_used,
        cost_usd = status.cost_usd,
        "task completed"
    );

    match cli.output {
        Some(path) => std::fs::write(&path, &result.final_paper)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", result.final_paper),
    }

    Ok(())
}
