/// eeg2source: localize EEG recordings onto the Desikan-Killiany atlas.
///
/// ```text
/// eeg2source process data/ --recursive --output-dir out --summary out/batch.json
/// eeg2source validate --config autoclean_config.json
/// ```
///
/// Exit code 0 when every file succeeds, 1 if any file fails or a command
/// errors. Log verbosity follows `EEG2SOURCE_LOG` (e.g. `info`, `debug`).
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;

use eeg2source::config::Configuration;
use eeg2source::pipeline::{Pipeline, DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_DIR};
use eeg2source::provenance::ProcessingLog;

#[derive(Parser, Debug)]
#[command(name = "eeg2source", version, about = "EEG source localization onto 68 atlas regions")]
struct Cli {
    /// Only print errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Print debug output.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one recording or every recording in a directory.
    Process {
        /// Input file or directory.
        input: PathBuf,

        /// Output directory.
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Search subdirectories.
        #[arg(long)]
        recursive: bool,

        /// Configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Write a JSON batch summary here.
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Load and range-check a configuration file.
    Validate {
        /// Configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("eeg2source error: {e:#}");
        return ExitCode::FAILURE;
    }
    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("eeg2source error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(true)` when everything succeeded.
fn run(command: Command) -> Result<bool> {
    match command {
        Command::Process { input, output_dir, recursive, config, summary } => {
            let pipeline = Pipeline::from_config_file(&config, &output_dir)
                .with_context(|| format!("loading configuration {}", config.display()))?;
            let inputs = pipeline.discover(&input, recursive)?;
            println!("Processing {} file(s) from {}", inputs.len(), input.display());

            let batch = pipeline.process_many(&inputs).with_parameters(json!({
                "input": input,
                "output_dir": output_dir,
                "recursive": recursive,
                "config": config,
            }));

            println!("\nBatch processing complete:");
            println!("  Successful: {}/{}", batch.successful, batch.total);
            println!("  Failed: {}/{}", batch.failed, batch.total);
            let mut failures = batch.failures().peekable();
            if failures.peek().is_some() {
                println!("\nFailed files:");
                for (file, error) in failures {
                    println!("  {}: {error}", file.display());
                }
            }
            println!("Results saved to: {}", output_dir.display());

            if let Some(path) = summary {
                batch
                    .write(&path)
                    .with_context(|| format!("writing batch summary {}", path.display()))?;
                println!("Summary written to: {}", path.display());
            }
            Ok(batch.all_succeeded())
        }
        Command::Validate { config } => {
            let mut log = ProcessingLog::new();
            let cfg = Configuration::load(&config, &mut log)?;
            cfg.validate(&mut log)?;
            println!("Configuration is valid!");
            println!("Configuration file: {}", config.display());
            println!("Version: {}", cfg.metadata.version);
            for entry in log.entries().iter().filter(|e| e.action.starts_with("Using default")) {
                println!("  {} ({})", entry.action, entry.details);
            }
            Ok(true)
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("EEG2SOURCE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
