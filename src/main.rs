use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use ui_align::batch::{self, BatchReport};
use ui_align::config::load_config;
use ui_align::logging::init_logging;
use ui_align::{AlignMethod, AlignOptions, Aligner, AlignmentOutcome, DetectorKind};

#[derive(Parser)]
#[command(name = "ui-align")]
#[command(about = "Align UI screenshots captured at different scroll positions or viewport sizes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML or JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Align a target screenshot onto a reference screenshot
    Align {
        /// Reference image; the output has its dimensions
        reference: PathBuf,

        /// Image to move onto the reference
        target: PathBuf,

        /// Where to write the aligned target
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = AlignMethod::Subimage)]
        method: AlignMethod,

        /// Fraction of feature matches to keep (opencv method)
        #[arg(long)]
        threshold: Option<f64>,

        /// Keypoint detector (opencv method)
        #[arg(long, value_enum)]
        detector: Option<DetectorKind>,
    },

    /// Align every pair listed in a JSON manifest
    Batch {
        /// JSON array of {reference, target, output, options?}
        #[arg(short, long)]
        manifest: PathBuf,

        /// Worker count; defaults to the configured batch concurrency
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Write the batch report here as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref());
    let _logging = init_logging(&loaded.config.logging.clone().with_verbosity(cli.verbose))?;
    loaded.report(cli.config.as_deref());
    let config = loaded.config;

    let aligner = Aligner::from_config(config)?;

    match cli.command {
        Commands::Align {
            reference,
            target,
            output,
            method,
            threshold,
            detector,
        } => {
            let options = AlignOptions {
                method,
                threshold,
                opencv_detector: detector,
            };
            let outcome = aligner.align(&reference, &target, &output, &options)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Batch {
            manifest,
            concurrency,
            report,
        } => {
            let jobs = batch::load_manifest(&manifest)?;
            let concurrency = concurrency.unwrap_or(aligner.config().batch.concurrency);
            let start = Instant::now();
            let entries = batch::align_batch(&aligner, jobs, concurrency)?;
            let summary =
                BatchReport::from_entries(&entries, start.elapsed().as_secs_f64() * 1000.0);

            if let Some(path) = report {
                std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for entry in &entries {
                    match &entry.result {
                        Ok(outcome) => print_outcome(outcome),
                        Err(e) => println!("FAILED {}: {}", entry.job.target.display(), e),
                    }
                }
                println!(
                    "{} pairs, {} aligned, {} failed in {:.1}ms",
                    summary.total, summary.succeeded, summary.failed, summary.elapsed_ms
                );
            }
            if summary.failed > 0 {
                anyhow::bail!("{} of {} pairs failed", summary.failed, summary.total);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &AlignmentOutcome) {
    let region = outcome.matching_region;
    println!("{}", outcome.aligned_path.display());
    println!(
        "  method: {}  offset: {}  score: {}",
        outcome.method,
        outcome.offset,
        outcome
            .score
            .map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
    );
    println!(
        "  matching region: {}x{} at ({}, {})",
        region.width, region.height, region.x, region.y
    );
}
