//! photomux - turn live photo pairs into Motion Photos
//!
//! Entry point: parses arguments, sets up logging, loads configuration
//! and hands the work to the batch workflow.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::Path;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use photomux::cli::{Args, Commands};
use photomux::config::Config;
use photomux::progress::Progress;
use photomux::workflow::{BatchReport, DirectoryOptions, PairOptions, ResidualReason, Workflow};

const DEFAULT_CONFIG: &str = "photomux.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting photomux");

    let report = match args.command {
        Commands::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(());
        }
        Commands::Dir {
            dir,
            recurse,
            output,
            heic,
            report,
        } => {
            let workflow = build_workflow(args.config.as_deref(), args.json_progress)?;
            workflow.check_availability(heic).await?;
            let options = DirectoryOptions {
                recursive: recurse,
                output_dir: output,
                transcode_heic: heic,
            };
            let batch = workflow.process_directory(&dir, &options).await?;
            if let Some(report_path) = report {
                batch.save_to_file(&report_path)?;
                info!("Report written to {}", report_path.display());
            }
            batch
        }
        Commands::Pair {
            photo,
            video,
            output,
            heic,
            force,
        } => {
            let workflow = build_workflow(args.config.as_deref(), args.json_progress)?;
            workflow
                .check_availability(heic && photomux::media::is_heic(&photo))
                .await?;
            let options = PairOptions {
                output_dir: output,
                transcode_heic: heic,
                force,
            };
            workflow.process_pair(&photo, &video, &options).await?
        }
    };

    if !args.json_progress {
        print_summary(&report);
    }

    if report.muxed.is_empty() && !report.failures.is_empty() {
        bail!("No Motion Photos were created ({} failures)", report.failures.len());
    }
    Ok(())
}

/// Load configuration from --config, else ./photomux.toml, else defaults
fn build_workflow(config_path: Option<&Path>, json_progress: bool) -> Result<Workflow> {
    let config = match config_path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG);
                Config::from_file(DEFAULT_CONFIG)?
            } else {
                Config::default()
            }
        }
    };

    let progress = if json_progress {
        Progress::json()
    } else {
        Progress::bar()
    };
    Ok(Workflow::new(config, progress))
}

fn print_summary(report: &BatchReport) {
    println!("\nMotion Photos created: {}", report.muxed.len());
    for muxed in &report.muxed {
        println!("  {}", muxed.output.display());
        for warning in &muxed.warnings {
            println!("    warning: {}", warning);
        }
    }

    let unmatched = report.residuals(ResidualReason::UnmatchedPhoto).count()
        + report.residuals(ResidualReason::UnmatchedVideo).count();
    println!("Unmatched files moved: {}", unmatched);

    if !report.failures.is_empty() {
        println!("Failures: {}", report.failures.len());
        for failure in &report.failures {
            let files: Vec<String> = failure.files.iter().map(|f| f.display().to_string()).collect();
            warn!("{:?} failure for {}: {}", failure.kind, files.join(", "), failure.message);
            println!("  {}: {}", files.join(", "), failure.message);
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".photomux").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "photomux.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stdout is reserved for progress events
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}
