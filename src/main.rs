use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use fleetsync_cli::{
    config::EngineConfig,
    orchestrator::Engine,
    stores::{InMemoryCredentialStore, InMemoryPlatformConfigStore, InMemoryRecordStore},
    telemetry,
};
use fleetsync_core_types::{ExecutionId, Period, PlatformId, TenantId};
use fleetsync_report_parse::{normalize, parse_report};

#[derive(Parser)]
#[command(
    name = "fleetsync",
    about = "Configuration-driven RPA engine for fleet platform synchronization"
)]
struct Cli {
    /// Engine configuration file (YAML). Defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one synchronization execution and wait for its terminal status.
    Run(RunArgs),
    /// Parse a downloaded artifact and print the normalized record.
    Parse(ParseArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    tenant: String,
    #[arg(long)]
    platform: String,
    /// Period start, YYYY-MM-DD.
    #[arg(long)]
    start: NaiveDate,
    /// Period end, YYYY-MM-DD.
    #[arg(long)]
    end: NaiveDate,
    /// YAML bundle of platform programs.
    #[arg(long)]
    platforms: PathBuf,
    /// YAML bundle of tenant credentials.
    #[arg(long)]
    credentials: Option<PathBuf>,
}

#[derive(Args)]
struct ParseArgs {
    file: PathBuf,
    #[arg(long)]
    platform: String,
    #[arg(long)]
    tenant: String,
    #[arg(long)]
    start: NaiveDate,
    #[arg(long)]
    end: NaiveDate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level);

    let engine_config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading engine config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Run(args) => run(engine_config, args).await,
        Command::Parse(args) => parse(args),
    }
}

async fn run(engine_config: EngineConfig, args: RunArgs) -> Result<()> {
    if args.end < args.start {
        bail!("period end {} precedes start {}", args.end, args.start);
    }

    let platforms = Arc::new(InMemoryPlatformConfigStore::new());
    let loaded = platforms
        .load_yaml(&args.platforms)
        .with_context(|| format!("loading platforms from {}", args.platforms.display()))?;
    tracing::info!(target: "fleetsync", loaded, "platform programs loaded");

    let credentials = Arc::new(InMemoryCredentialStore::new());
    if let Some(path) = &args.credentials {
        let loaded = credentials
            .load_yaml(path)
            .with_context(|| format!("loading credentials from {}", path.display()))?;
        tracing::info!(target: "fleetsync", loaded, "credential sets loaded");
    }

    let records = Arc::new(InMemoryRecordStore::new());
    let engine = Arc::new(Engine::new(
        engine_config,
        credentials,
        platforms,
        Arc::clone(&records) as _,
    ));

    let id = engine
        .start_execution(
            TenantId::new(args.tenant),
            PlatformId::new(args.platform),
            Period::new(args.start, args.end),
        )
        .await?;
    tracing::info!(target: "fleetsync", execution = %id, "execution started");

    let record = wait_for_terminal(&engine, id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    for normalized in records.financial_records() {
        println!("{}", serde_json::to_string_pretty(&normalized)?);
    }
    Ok(())
}

async fn wait_for_terminal(
    engine: &Arc<Engine>,
    id: ExecutionId,
) -> Result<fleetsync_core_types::ExecutionRecord> {
    loop {
        match engine.get_execution(id).await {
            Some(record) if record.status.is_terminal() => return Ok(record),
            Some(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            None => bail!("execution {id} vanished from the record store"),
        }
    }
}

fn parse(args: ParseArgs) -> Result<()> {
    let platform = PlatformId::new(args.platform);
    let tenant = TenantId::new(args.tenant);
    let period = Period::new(args.start, args.end);

    let raw = parse_report(&args.file, &platform);
    if let Some(reason) = &raw.error {
        bail!("could not parse {}: {reason}", args.file.display());
    }
    let record = normalize(&platform, &tenant, period, &raw);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
