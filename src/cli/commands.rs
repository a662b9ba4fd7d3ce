//! CLI command definitions for synth-forge.
//!
//! This module provides the command-line interface for generating synthetic
//! datasets and managing the CSV files they are written to.

use crate::catalog::{DataFormat, Domain};
use crate::enrichment::{
    ContextEnricher, ResearchConfig, ResearchEnricher, StaticContextEnricher, WebContextEnricher,
};
use crate::export::{file_stats, read_sample, CsvExporter, DEFAULT_OUTPUT_DIR};
use crate::llm::{LiteLlmClient, LlmProvider, OpenRouterProvider};
use crate::pipeline::{
    CancellationFlag, GenerationRequest, GenerationResult, PipelineConfig, PipelineEvent,
    PipelineOrchestrator, RunStats,
};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Progress events buffered between the pipeline and the console.
const EVENT_BUFFER: usize = 64;

/// Synthetic dataset generator for LLM training and evaluation.
#[derive(Parser)]
#[command(name = "synth-forge")]
#[command(about = "Generate domain-specific synthetic datasets with an LLM")]
#[command(version)]
#[command(
    long_about = "synth-forge generates validated, deduplicated synthetic records (Q&A pairs, entity relationships, RAG chunks, fine-tuning examples) for a chosen domain and writes them as CSV.\n\nExample usage:\n  synth-forge generate -d healthcare -f qna -n 25 -c cardiology"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a dataset and write it as CSV.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// List supported domains.
    Domains,

    /// List supported data formats.
    Formats,

    /// Preview rows of an exported CSV file.
    Sample(SampleArgs),

    /// Delete old CSV exports.
    Cleanup(CleanupArgs),

    /// Show statistics for an exported CSV file.
    Stats(StatsArgs),
}

/// Arguments for `synth-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Domain to generate for (see `synth-forge domains`).
    #[arg(short = 'd', long)]
    pub domain: String,

    /// Output format (see `synth-forge formats`).
    #[arg(short = 'f', long)]
    pub format: String,

    /// Number of records to generate.
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Focus within the domain, e.g. "cardiology".
    #[arg(short = 'c', long)]
    pub context: Option<String>,

    /// Directory CSV files are written to.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,

    /// Model identifier; overrides FORGE_MODEL and the config file.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY env var).
    /// Without it, the LiteLLM client is configured from LITELLM_* variables.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// YAML file overriding pipeline settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip web research and use the built-in domain context.
    #[arg(long)]
    pub no_web: bool,

    /// Use the gathered context as-is instead of having the model distill it.
    #[arg(long)]
    pub no_research: bool,

    /// Write and accept partial results when the target is not reached.
    #[arg(long)]
    pub allow_partial: bool,

    /// Output a JSON summary instead of progress lines.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `synth-forge sample`.
#[derive(Parser, Debug)]
pub struct SampleArgs {
    /// CSV file to preview.
    #[arg(long)]
    pub file: PathBuf,

    /// Number of rows to show.
    #[arg(short = 'n', long, default_value = "5")]
    pub rows: usize,

    /// Output rows as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `synth-forge cleanup`.
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Delete files last modified more than this many days ago.
    #[arg(long, default_value = "7")]
    pub days: u32,

    /// Directory to clean.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,
}

/// Arguments for `synth-forge stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// CSV file to inspect.
    #[arg(long)]
    pub file: PathBuf,

    /// Output statistics as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// JSON summary printed by `generate -j`.
#[derive(Debug, Serialize)]
struct GenerationOutput {
    status: String,
    run_id: String,
    domain: String,
    format: String,
    model: String,
    target_count: usize,
    accepted_count: usize,
    attempted_batches: u32,
    failure: Option<String>,
    output_file: Option<String>,
    stats: RunStats,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Domains => {
            run_domains_command();
            Ok(())
        }
        Commands::Formats => {
            run_formats_command();
            Ok(())
        }
        Commands::Sample(args) => run_sample_command(args),
        Commands::Cleanup(args) => run_cleanup_command(args),
        Commands::Stats(args) => run_stats_command(args),
    }
}

/// Loads pipeline settings: FORGE_* variables first, then the optional
/// YAML file, then the `--model` flag.
fn load_config(
    config_path: Option<&PathBuf>,
    model: Option<&str>,
) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Invalid FORGE_* environment configuration: {}", e))?;
    if let Some(path) = config_path {
        config = config
            .merge_yaml_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?;
    }
    if let Some(model) = model {
        config = config.with_model(model);
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn build_llm_client(
    api_key: Option<String>,
    model: &str,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        info!(model = %model, "Using OpenRouter with specified API key");
        return Ok(Arc::new(OpenRouterProvider::with_model(
            key,
            model.to_string(),
        )));
    }

    info!("Using LiteLLM client from environment");
    Ok(Arc::new(LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Please provide --api-key or set \
             OPENROUTER_API_KEY / LITELLM_API_KEY env vars.",
            e
        )
    })?))
}

fn build_enricher(
    args: &GenerateArgs,
    llm: Arc<dyn LlmProvider>,
    config: &PipelineConfig,
) -> Arc<dyn ContextEnricher> {
    let gathered: Arc<dyn ContextEnricher> = if args.no_web {
        Arc::new(StaticContextEnricher)
    } else {
        Arc::new(WebContextEnricher::new())
    };
    if args.no_research {
        return gathered;
    }
    let research = ResearchConfig::new(config.model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
    Arc::new(ResearchEnricher::new(gathered, llm, research))
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let request = GenerationRequest::parse(
        &args.domain,
        &args.format,
        args.count,
        args.context.as_deref(),
    )?;

    let config = load_config(args.config.as_ref(), args.model.as_deref())?;
    let model = config.model.clone();
    let llm = build_llm_client(args.api_key.clone(), &model)?;
    let enricher = build_enricher(&args, llm.clone(), &config);
    let orchestrator = PipelineOrchestrator::new(llm, enricher, config)?;

    let cancel = CancellationFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current batch");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let reporter = tokio::spawn(report_progress(rx, args.json));

    if !args.json {
        println!(
            "Generating {} {} records for {}...",
            request.target_count, request.format, request.domain
        );
    }

    let outcome = orchestrator.run_with(request, &cancel, Some(&tx)).await;
    drop(tx);
    interrupt.abort();
    let _ = reporter.await;

    let result = outcome?;
    let exporter = CsvExporter::new(&args.output);
    let should_write =
        !result.accepted_records.is_empty() && (result.is_success() || args.allow_partial);
    let output_file = if should_write {
        Some(exporter.write(
            &result.accepted_records,
            result.request.domain,
            result.request.format,
        )?)
    } else {
        None
    };

    if args.json {
        let output = GenerationOutput {
            status: result.status.to_string(),
            run_id: result.run_id.to_string(),
            domain: result.request.domain.to_string(),
            format: result.request.format.to_string(),
            model,
            target_count: result.request.target_count,
            accepted_count: result.accepted_count,
            attempted_batches: result.attempted_batches,
            failure: result.failure.map(|f| f.to_string()),
            output_file: output_file.as_ref().map(|p| p.display().to_string()),
            stats: result.stats.clone(),
        };
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
    } else {
        print_summary(&result, output_file.as_ref());
    }

    if args.allow_partial {
        return Ok(());
    }
    result.into_result()?;
    Ok(())
}

async fn report_progress(mut rx: mpsc::Receiver<PipelineEvent>, quiet: bool) {
    while let Some(event) = rx.recv().await {
        if quiet {
            continue;
        }
        match event {
            PipelineEvent::EnrichmentDegraded { reason, .. } => {
                println!("  ! Web research unavailable ({}), using built-in context", reason);
            }
            PipelineEvent::BatchCompleted {
                batch,
                accepted,
                total,
                target,
                ..
            } => {
                println!("  batch {:>3}: +{:<2} ({}/{})", batch, accepted, total, target);
            }
            PipelineEvent::BatchFailed { batch, reason, .. } => {
                println!("  batch {:>3}: failed ({})", batch, reason);
            }
            PipelineEvent::StageStarted { .. } | PipelineEvent::RunFinished { .. } => {}
        }
    }
}

fn print_summary(result: &GenerationResult, output_file: Option<&PathBuf>) {
    let stats = &result.stats;
    println!();
    println!("Status:            {}", result.status);
    if let Some(failure) = &result.failure {
        println!("Reason:            {}", failure);
    }
    println!(
        "Records:           {}/{} ({:.0}%)",
        result.accepted_count,
        result.request.target_count,
        result.progress_percentage()
    );
    println!("Batches:           {}", result.attempted_batches);
    println!(
        "Rejected:          {} structural, {} quality, {} duplicate",
        stats.structural_rejections, stats.quality_rejections, stats.duplicate_rejections
    );
    println!(
        "Success rate:      {:.1}%",
        stats.success_rate(result.accepted_count) * 100.0
    );
    println!("Duration:          {:.1}s", stats.elapsed().as_secs_f64());
    match output_file {
        Some(path) => println!("Output:            {}", path.display()),
        None if !result.accepted_records.is_empty() => {
            println!("Output:            not written (use --allow-partial to keep partial results)")
        }
        None => println!("Output:            none"),
    }
}

fn run_domains_command() {
    println!("Supported domains:");
    for domain in Domain::all() {
        println!("  {:<12} {}", domain.as_str(), domain.description());
    }
}

fn run_formats_command() {
    println!("Supported formats:");
    for format in DataFormat::all() {
        println!("  {:<22} {}", format.as_str(), format.description());
        println!("  {:<22} fields: {}", "", format.fields().join(", "));
    }
}

fn run_sample_command(args: SampleArgs) -> anyhow::Result<()> {
    let rows = read_sample(&args.file, args.rows)?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&rows)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{} has no data rows", args.file.display());
        return Ok(());
    }
    for (i, row) in rows.iter().enumerate() {
        println!("--- Row {} ---", i + 1);
        for (column, value) in row {
            println!("{}: {}", column, value);
        }
    }
    Ok(())
}

fn run_cleanup_command(args: CleanupArgs) -> anyhow::Result<()> {
    let removed = CsvExporter::new(&args.output).cleanup_older_than(args.days)?;
    println!(
        "Removed {} file(s) older than {} day(s) from {}",
        removed, args.days, args.output
    );
    Ok(())
}

fn run_stats_command(args: StatsArgs) -> anyhow::Result<()> {
    let stats = file_stats(&args.file)?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&stats)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("File:      {}", stats.path.display());
    println!("Records:   {}", stats.record_count);
    println!("Size:      {} bytes", stats.size_bytes);
    println!("Modified:  {}", stats.modified.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}
