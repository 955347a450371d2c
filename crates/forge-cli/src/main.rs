//! IBIS Forge CLI: buffer-model completion and transistor-level correlation.
//!
//! This is the main entry point for the `ibis-forge` tool.

mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ibis-forge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in model data from defaults and link component pins
    Complete {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Write the completed models as a model-description file
        #[arg(long)]
        emit: Option<PathBuf>,

        /// Exit with an error if any reference is unresolved
        #[arg(long)]
        strict: bool,
    },

    /// Prepare a subcircuit wrapper for a netlist
    Subckt {
        /// Transistor-level netlist
        netlist: PathBuf,

        /// Subcircuit name
        #[arg(short, long)]
        name: String,

        /// Directory for a synthesized wrapper
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Build and run correlation decks for every I/O and 3-state model
    Correlate {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write decks only, do not start the simulator
        #[arg(long)]
        no_run: bool,
    },

    /// Decode a fixed-width transient output file
    Waveform {
        /// Transient output file
        file: PathBuf,
    },

    /// List the numeric tables in a model-description file
    Tables {
        /// Model-description file
        file: PathBuf,

        /// Show only these tables, e.g. "1,3-5"; includes their data
        #[arg(short, long)]
        select: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Complete { config, emit, strict } => {
            run_completion(&config, emit.as_deref(), strict, cli.format)?;
        }
        Commands::Subckt { netlist, name, output } => {
            prepare_subckt(&netlist, &name, &output, cli.format)?;
        }
        Commands::Correlate { config, output, no_run } => {
            run_correlation(&config, output.as_deref(), !no_run, cli.format)?;
        }
        Commands::Waveform { file } => {
            decode_waveform(&file, cli.format)?;
        }
        Commands::Tables { file, select } => {
            list_tables(&file, select.as_deref(), cli.format)?;
        }
    }

    Ok(())
}

fn run_completion(config_path: &Path, emit: Option<&Path>, strict: bool, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let mut orchestrator = orchestrator::Orchestrator::new(config);

    let report = orchestrator.complete().clone();
    output::write_completion(&mut std::io::stdout().lock(), &report, format)?;

    if let Some(path) = emit {
        orchestrator.emit(path)?;
        tracing::info!("Model description written to {:?}", path);
    }

    if strict && !report.is_clean() {
        anyhow::bail!("{} unresolved references", report.errors.len());
    }
    Ok(())
}

fn prepare_subckt(netlist: &Path, name: &str, output_dir: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Preparing subcircuit '{}' from {:?}", name, netlist);

    let subckt = lib_spice::prepare_subcircuit(netlist, name, output_dir)
        .with_context(|| format!("Failed to prepare subcircuit from {:?}", netlist))?;
    output::write_subckt(&mut std::io::stdout().lock(), &subckt, format)
}

fn run_correlation(config_path: &Path, output_dir: Option<&Path>, run: bool, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.correlation.output_dir.clone());
    let mut orchestrator = orchestrator::Orchestrator::new(config);

    tracing::info!("Starting correlation...");
    let outcomes = orchestrator.correlate(&output_dir, run)?;

    output::write_correlation(&mut std::io::stdout().lock(), &outcomes, format)?;
    output::write_correlation_summary(&outcomes, &output_dir, format)?;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} correlation runs failed", failed, outcomes.len());
    }

    tracing::info!("Correlation complete. Results written to {:?}", output_dir);
    Ok(())
}

fn decode_waveform(file: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Decoding waveform file: {:?}", file);

    let set = lib_spice::decode_waveform_file(file)
        .with_context(|| format!("Failed to decode waveform {:?}", file))?;
    output::write_waveform(&mut std::io::stdout().lock(), &set, format)
}

fn list_tables(file: &Path, select: Option<&str>, format: OutputFormat) -> Result<()> {
    tracing::info!("Extracting tables from {:?}", file);

    let records = lib_ibis::extract_tables_from_path(file)
        .with_context(|| format!("Failed to extract tables from {:?}", file))?;

    let chosen: Vec<_> = match select {
        Some(text) => {
            let indices = lib_ibis::select_indices(text, records.len());
            if indices.is_empty() {
                tracing::warn!("Selection '{}' matched no tables (1..={})", text, records.len());
            }
            indices.iter().map(|&i| &records[i - 1]).collect()
        }
        None => records.iter().collect(),
    };

    output::write_tables(&mut std::io::stdout().lock(), &chosen, select.is_some(), format)
}
