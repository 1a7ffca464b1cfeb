use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overdose_risk::pipeline::error_response;
use overdose_risk::{DirectorySource, PipelineConfig, RiskPipeline};
use serde_json::Value;
use tracing::{info, warn};

mod logging;

#[derive(Parser)]
#[command(name = "risk-score")]
#[command(about = "Score opioid overdose risk from JSON request bodies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Pipeline configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Artifact directory, used when no config file is given
    #[arg(long, conflicts_with = "config")]
    artifacts: Option<PathBuf>,

    /// Request body file; reads stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Treat the input as one JSON body per line
    #[arg(long)]
    jsonl: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of an artifact directory
    Fingerprint {
        /// Artifact directory
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => match &cli.artifacts {
            Some(dir) => Ok(PipelineConfig::with_artifact_dir(dir.clone())),
            None => Ok(PipelineConfig::default()),
        },
    }
}

fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Score every body in `reader`, writing one response envelope per body.
///
/// Returns the number of bodies scored.
fn score_stream<R: BufRead, W: Write>(
    pipeline: &RiskPipeline,
    mut reader: R,
    writer: &mut W,
    jsonl: bool,
) -> Result<usize> {
    if !jsonl {
        let mut body = String::new();
        reader
            .read_to_string(&mut body)
            .context("Failed to read request body")?;
        let response = respond_to(pipeline, &body);
        writeln!(writer, "{}", response)?;
        return Ok(1);
    }

    let mut scored = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input line")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = respond_to(pipeline, &line);
        if response["status"] == "error" {
            warn!(line = index + 1, detail = %response["detail"], "Request failed");
        }
        writeln!(writer, "{}", response)?;
        scored += 1;
    }
    Ok(scored)
}

fn respond_to(pipeline: &RiskPipeline, body: &str) -> Value {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => pipeline.respond(&value),
        Err(e) => error_response(&format!("Invalid JSON body: {}", e)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    let config = load_config(&cli)?;

    if let Some(Commands::Fingerprint { artifacts }) = &cli.command {
        let dir = artifacts.clone().unwrap_or_else(|| config.artifact_dir.clone());
        let fingerprint = DirectorySource::new(dir.clone())
            .fingerprint()
            .with_context(|| format!("Failed to fingerprint {}", dir.display()))?;
        println!("{}", fingerprint);
        return Ok(());
    }

    let pipeline = RiskPipeline::from_config(&config).with_context(|| {
        format!(
            "Failed to load artifacts from {}",
            config.artifact_dir.display()
        )
    })?;

    let reader = open_input(cli.input.as_ref())?;
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let scored = score_stream(&pipeline, reader, &mut writer, cli.jsonl)?;
    writer.flush()?;

    info!(scored, "Scoring finished");
    Ok(())
}
