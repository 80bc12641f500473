//! racr command line interface
//!
//! Ingests provider exports into tables, trains the lap-time model, runs
//! single scenarios and serves predictions over HTTP.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use racr_core::config::RacrConfig;
use racr_core::ingest::{ingest_season, FsSessionSource};
use racr_core::inference::format_lap_time;
use racr_core::store::{BASELINE_REFERENCES, CIRCUIT_INFO, TRACKS};
use racr_core::tables::{build_tables, track_reference};
use racr_core::types::{BaselineRecord, CircuitPoint, Compound, TrackRecord};
use racr_core::{BaselineTable, LapTimePredictor, ModelArtifact, Scenario, TableStore, TrackTable};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod serve;

#[derive(Parser)]
#[command(name = "racr")]
#[command(about = "Race lap-time simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to racr.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the tables from a provider export
    Ingest(IngestCommand),
    /// Train the lap-time model on the stored tables
    Train,
    /// Predict one scenario against the baseline
    Predict(PredictCommand),
    /// Serve predictions over HTTP
    Serve {
        /// Listen address, overrides [serve] bind
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args)]
struct IngestCommand {
    /// Root directory of the provider export
    #[arg(long)]
    source: PathBuf,
    /// Season to ingest
    #[arg(long)]
    year: i32,
}

#[derive(Args)]
struct PredictCommand {
    /// Track (event) name, e.g. "Monaco Grand Prix"
    #[arg(long)]
    track: String,
    #[arg(long)]
    compound: Option<Compound>,
    /// Tire age in laps
    #[arg(long)]
    tire_age: Option<f64>,
    #[arg(long)]
    rain: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RacrConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(&config.log_level, cli.verbose);

    match cli.command {
        Commands::Ingest(cmd) => handle_ingest(&config, cmd),
        Commands::Train => handle_train(&config),
        Commands::Predict(cmd) => handle_predict(&config, cmd),
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.serve.bind.clone());
            let state = serve::AppState {
                predictor: load_predictor(&config)?,
                circuits: TableStore::new(&config.data.tables_dir)
                    .read_optional::<CircuitPoint>(CIRCUIT_INFO)
                    .context("failed to read circuit geometry")?,
            };
            serve::start_server(state, &addr).await
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let default = if verbose { "debug" } else { level };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn handle_ingest(config: &RacrConfig, cmd: IngestCommand) -> Result<()> {
    let source = FsSessionSource::new(&cmd.source);
    let (season, report) = ingest_season(&source, cmd.year)
        .with_context(|| format!("failed to ingest {} from {}", cmd.year, cmd.source.display()))?;

    for (event, reason) in report.skip_reasons() {
        warn!("skipped {}: {}", event, reason);
    }
    info!(
        "season {}: {} races loaded, {} skipped",
        report.year,
        report.loaded(),
        report.skipped()
    );
    if report.loaded() == 0 {
        anyhow::bail!("no races could be loaded for {}", cmd.year);
    }

    let tables = build_tables(&season);
    TableStore::new(&config.data.tables_dir)
        .write_all(&tables)
        .context("failed to write tables")?;
    println!(
        "{} laps from {} races written to {}",
        tables.laps.len(),
        tables.races.len(),
        config.data.tables_dir.display()
    );
    Ok(())
}

fn handle_train(config: &RacrConfig) -> Result<()> {
    let report = racr_trainer::train_and_save(config).context("training failed")?;
    let metrics = &report.metrics;

    println!("train races: {}", report.split.train_races.len());
    println!("test races:  {}", report.split.test_races.len());
    println!("train RMSE:  {:.4}", metrics.train_rmse);
    println!("test RMSE:   {:.4}", metrics.test_rmse);
    match metrics.test_r2 {
        Some(r2) => println!("test R²:     {r2:.4}"),
        None => println!("test R²:     undefined"),
    }
    if let Some(best) = metrics.best_iteration {
        println!("best round:  {best}");
    }
    println!("trees:       {}", metrics.rounds);
    println!("model hash:  {}", report.model_hash);
    if let Some(digest) = &report.artifact_digest {
        println!("artifact:    {} ({})", config.data.model_dir.display(), digest);
    }
    Ok(())
}

fn handle_predict(config: &RacrConfig, cmd: PredictCommand) -> Result<()> {
    let predictor = load_predictor(config)?;
    let prediction = predictor
        .predict(&Scenario {
            track: Some(cmd.track.clone()),
            compound: cmd.compound,
            tire_age: cmd.tire_age,
            rain: cmd.rain,
        })
        .with_context(|| format!("cannot predict a lap at {}", cmd.track))?;

    println!(
        "baseline:  {:>10.3}s  {}",
        prediction.baseline_seconds,
        format_lap_time(prediction.baseline_seconds)
    );
    println!(
        "predicted: {:>10.3}s  {}",
        prediction.predicted_seconds,
        format_lap_time(prediction.predicted_seconds)
    );
    println!("delta:     {:>+10.3}s", prediction.delta_seconds);
    Ok(())
}

/// Load the artifact and reference tables once for inference
fn load_predictor(config: &RacrConfig) -> Result<LapTimePredictor> {
    let artifact = ModelArtifact::load(&config.data.model_dir).with_context(|| {
        format!(
            "failed to load model artifact from {}",
            config.data.model_dir.display()
        )
    })?;

    let store = TableStore::new(&config.data.tables_dir);
    let mut tracks: Vec<TrackRecord> = store.read_optional(TRACKS)?;
    if tracks.is_empty() {
        tracks = track_reference();
    }
    let baselines: Vec<BaselineRecord> = store
        .read(BASELINE_REFERENCES)
        .context("baseline references are required for prediction")?;

    info!(
        trees = artifact.model.num_trees(),
        baselines = baselines.len(),
        "model loaded"
    );
    Ok(LapTimePredictor::new(
        Arc::new(artifact),
        TrackTable::new(tracks)?,
        BaselineTable::new(&baselines),
    ))
}
