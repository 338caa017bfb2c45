//! polynet
//!
//! Command-line front end: one surrogate prediction or one simulation
//! ensemble per invocation, JSON on stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use polynet::{
    EnsembleOrchestrator, ExternalSimulator, ParameterRecord, PredictorConfig, PresetLibrary,
    SurrogatePredictor,
};

// ──────────────────────────────────────────────────────────────────────────────
// ARGUMENTS
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "polynet", version, about = "Polymer network property prediction")]
struct Cli {
    /// Predictor configuration (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Polymer preset library used to fill missing material fields
    #[arg(long, global = true)]
    presets: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Single forward pass through the trained surrogate
    Surrogate {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Repeated simulation runs, aggregated to mean ± error
    Ensemble {
        #[arg(short, long)]
        input: PathBuf,
        /// Requested number of runs (clamped to the configured maximum)
        #[arg(short, long, allow_negative_numbers = true)]
        runs: Option<i64>,
        /// Cap on the simulated system size
        #[arg(long)]
        max_beads: Option<u64>,
    },
}

// ──────────────────────────────────────────────────────────────────────────────
// HELPERS
// ──────────────────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<PredictorConfig> {
    let mut config = match path {
        Some(path) => PredictorConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PredictorConfig::default(),
    };
    config.apply_env_overrides().context("Invalid POLYNET_* environment override")?;
    Ok(config)
}

fn load_record(input: &Path, presets: Option<&Path>) -> Result<ParameterRecord> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read parameters {}", input.display()))?;
    let mut request: Map<String, Value> =
        serde_json::from_str(&content).context("Parameters must be a JSON object")?;
    if let Some(presets) = presets {
        let library = PresetLibrary::load(presets)?;
        library.fill_request(&mut request)?;
    }
    let record: ParameterRecord =
        serde_json::from_value(Value::Object(request)).context("Invalid parameter record")?;
    Ok(record)
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    polynet::telemetry::init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    let output = match cli.command {
        Command::Surrogate { input } => {
            let record = load_record(&input, cli.presets.as_deref())?;
            let predictor = SurrogatePredictor::load(&config).context("Failed to load surrogate artifacts")?;
            predictor.predict(&record)?.to_json()
        }
        Command::Ensemble { input, runs, max_beads } => {
            let record = load_record(&input, cli.presets.as_deref())?;
            let mut engine = config.simulator.clone();
            if engine.timeout_secs.is_none() {
                engine.timeout_secs = config.ensemble.timeout_secs;
            }
            let simulator = ExternalSimulator::from_settings(&engine)?;
            let mut settings = config.ensemble.clone();
            if max_beads.is_some() {
                settings.max_beads = max_beads;
            }
            let requested = runs.unwrap_or(settings.default_runs as i64);
            let orchestrator = EnsembleOrchestrator::new(Arc::new(simulator), settings);
            info!("Starting ensemble of {} requested runs", requested);
            orchestrator.predict_ensemble(&record, requested).await?.to_json()
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
