//! datasquad - multi-agent PySpark pipeline squad CLI
//!
//! ## Commands
//!
//! - `run`: generate, validate and translate a pipeline for a task
//! - `check`: run the validation gate over a local script
//! - `rules`: print the active rule set
//! - `show`: verify and print a recorded run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};

use datasquad_core::metrics::METRICS;
use datasquad_core::obs::RequestSpan;
use datasquad_core::{
    extract_code_blocks, read_run_record, write_rejected_candidate, write_run_artifacts,
    CancellationHandle, ModelClient, OrchestrationError, Orchestrator, PipelineSpec, ScaleTier,
    SquadConfig, ValidationGate,
};
use datasquad_gateway::GatewayClient;

#[derive(Parser)]
#[command(name = "datasquad")]
#[command(author = "Datasquad Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent PySpark pipeline generation with a deterministic gate", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Squad configuration file (TOML)
    #[arg(short, long, global = true, default_value = "datasquad.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, validate and translate a pipeline
    Run {
        /// Task description handed to the Architect
        task: String,

        /// Source schema field as name:type (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,

        /// Date partition column
        #[arg(long, default_value = "event_date")]
        partition_column: String,

        /// Timestamp column the partition is derived from
        #[arg(long, default_value = "event_timestamp")]
        timestamp_column: String,

        /// Workload scale tier (small, medium, large)
        #[arg(long, default_value = "medium")]
        scale_tier: ScaleTier,

        /// Override budget.max_validation_attempts
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Root directory for run artifacts
        #[arg(short, long, default_value = "datasquad_output")]
        out_dir: PathBuf,
    },

    /// Check a local script against the validation gate
    Check {
        /// Script (or model reply with fenced code) to check
        file: PathBuf,
    },

    /// Print the active rule set
    Rules,

    /// Verify and print a recorded run
    Show {
        /// Request ID of the run
        request_id: String,

        /// Root directory for run artifacts
        #[arg(short, long, default_value = "datasquad_output")]
        out_dir: PathBuf,
    },
}

fn parse_field(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, ty)) if !name.trim().is_empty() && !ty.trim().is_empty() => {
            Ok((name.trim().to_string(), ty.trim().to_string()))
        }
        _ => Err(format!("expected name:type, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    datasquad_core::init_tracing(cli.json, level);

    let config = SquadConfig::load(Some(&cli.config))
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    let result = match cli.command {
        Commands::Run {
            task,
            fields,
            partition_column,
            timestamp_column,
            scale_tier,
            max_attempts,
            out_dir,
        } => {
            let mut spec = PipelineSpec::new(task)
                .with_partition_column(partition_column)
                .with_timestamp_column(timestamp_column)
                .with_scale_tier(scale_tier);
            for (name, ty) in fields {
                spec = spec.with_field(name, ty);
            }
            cmd_run(&config, &spec, max_attempts, &out_dir).await
        }
        Commands::Check { file } => cmd_check(&config, &file),
        Commands::Rules => cmd_rules(&config),
        Commands::Show { request_id, out_dir } => cmd_show(&request_id, &out_dir),
    };

    METRICS.flush();
    result
}

/// Run one request against the configured gateway
async fn cmd_run(
    config: &SquadConfig,
    spec: &PipelineSpec,
    max_attempts: Option<u32>,
    out_dir: &Path,
) -> Result<()> {
    let client: Arc<dyn ModelClient> =
        Arc::new(GatewayClient::from_env().context("Failed to configure model gateway")?);
    let orchestrator = Orchestrator::from_config(config, client.clone(), client)
        .context("Failed to build orchestrator")?;

    let cancel = CancellationHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling request");
            on_interrupt.cancel();
        }
    });

    let attempts = max_attempts.unwrap_or(config.budget.max_validation_attempts);
    info!(targets = ?orchestrator.targets(), attempts, "starting request");

    match orchestrator
        .run_pipeline_request_with_cancel(spec, attempts, &cancel)
        .await
    {
        Ok(outcome) => {
            let run_dir = write_run_artifacts(&outcome, out_dir)
                .with_context(|| format!("Failed to write artifacts under {:?}", out_dir))?;
            println!(
                "Approved after {} attempt(s): {}",
                outcome.attempts,
                run_dir.join("pipeline.py").display()
            );
            for translation in &outcome.translations {
                match &translation.result {
                    Ok(_) => println!("  {}: ok", translation.target),
                    Err(failure) => println!("  {}: FAILED ({})", translation.target, failure.reason),
                }
            }
            println!("Tokens charged: {}", outcome.tokens_charged);
            Ok(())
        }
        Err(OrchestrationError::ValidationExhausted {
            attempts,
            last_verdict,
            last_candidate,
            ..
        }) => {
            let review_id = format!("rejected-{}", last_candidate.id);
            let path = write_rejected_candidate(&review_id, &last_candidate, &last_verdict, out_dir)
                .context("Failed to save rejected candidate")?;
            for finding in &last_verdict.findings {
                println!("  {}", finding.reason);
            }
            anyhow::bail!(
                "Validation failed after {} attempt(s); candidate saved for review at {}",
                attempts,
                path.display()
            )
        }
        Err(e) => Err(e).context("Request failed"),
    }
}

/// Gate a local script and report every finding
fn cmd_check(config: &SquadConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script: {:?}", file))?;
    let gate = ValidationGate::new(config.rule_set().context("Failed to load rules")?);
    let verdict = gate
        .check_source(&extract_code_blocks(&text))
        .with_context(|| format!("Cannot check {:?}", file))?;

    println!("{}", verdict.message);
    for finding in &verdict.findings {
        println!("  {}", finding.reason);
    }
    if !verdict.passed {
        anyhow::bail!("Validation failed for {:?}", file);
    }
    Ok(())
}

/// Print the active rule set
fn cmd_rules(config: &SquadConfig) -> Result<()> {
    let rules = config.rule_set().context("Failed to load rules")?;
    for rule in rules.rules() {
        let def = rule.definition();
        println!("{}: {}", rule.id(), rule.description());
        for marker in &def.require_any {
            println!("  require: {}", serde_json::to_string(marker)?);
        }
        for marker in &def.forbid {
            println!("  forbid:  {}", serde_json::to_string(marker)?);
        }
    }
    Ok(())
}

/// Verify a recorded run's digest and print its record
fn cmd_show(request_id: &str, out_dir: &Path) -> Result<()> {
    let _span = RequestSpan::enter(request_id);
    debug!(dir = ?out_dir, "verifying recorded run");
    let record = read_run_record(request_id, out_dir)
        .with_context(|| format!("Failed to read run {}", request_id))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
