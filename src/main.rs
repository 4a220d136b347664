//! McM test log analyzer command line
//!
//! Extracts generator metrics from HTCondor test-job logs, and wraps the job
//! submission and proxy helpers used to run those jobs.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use log::{debug, LevelFilter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use mcmtest::config::load_config;
use mcmtest::grid::{condor, proxy};
use mcmtest::utils::output_formatter;
use mcmtest::LogAnalyzer;

/// Command line argument structure
#[derive(Parser, Debug)]
#[command(
    name = "mcmtest",
    version,
    about = "Extracts generator metrics from HTCondor test-job logs",
    long_about = "Scans the out_<prepid>.txt and err_<prepid>.txt logs of McM test jobs for:
- Cross section after filtering
- Filter and matching efficiencies
- Time and size per event
and writes one CSV row per prepID."
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to JSON configuration file
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Set logging level (default: INFO)
    #[arg(long = "log-level", default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract metrics from a directory of job logs
    Analyze {
        /// Directory containing the out_*.txt and err_*.txt files
        directory: PathBuf,

        /// CSV report path
        #[arg(long = "csv", default_value = "results.csv")]
        csv: PathBuf,

        /// Also export the records to a JSON file
        #[arg(long = "json")]
        json: Option<PathBuf>,

        /// Fail instead of writing zeros for missing metrics
        #[arg(long = "strict", action = ArgAction::SetTrue)]
        strict: bool,

        /// Suppress the summary table
        #[arg(long = "quiet", action = ArgAction::SetTrue)]
        quiet: bool,
    },

    /// Submit a job description to HTCondor
    Submit {
        /// Submission descriptor
        jobfile: PathBuf,
    },

    /// Show the active VOMS proxy, optionally caching a copy
    Proxy {
        /// Copy the proxy into the cache directory
        #[arg(long = "copy", action = ArgAction::SetTrue)]
        copy: bool,

        /// Cache directory (default: ~/mcm_testarea/.voms)
        #[arg(long = "cache-dir")]
        cache_dir: Option<PathBuf>,
    },
}

/// Main entry point function
fn main() {
    let args = Args::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("{} {:#}", "Warning:".yellow(), e);
    }

    if let Err(e) = run(args) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Analyze {
            ref directory,
            ref csv,
            ref json,
            strict,
            quiet,
        } => run_analyze(&args, directory, csv, json.as_deref(), strict, quiet),
        Commands::Submit { ref jobfile } => {
            let job_id = condor::condor_submit(jobfile)?;
            println!("{}", job_id);
            Ok(())
        }
        Commands::Proxy { copy, ref cache_dir } => {
            let path = if copy {
                let cache_dir = match cache_dir {
                    Some(dir) => dir.clone(),
                    None => proxy::default_proxy_cache_dir()?,
                };
                proxy::copy_proxy(&cache_dir)?
            } else {
                proxy::voms_proxy_path()?
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Analyze a log directory and write the requested reports
fn run_analyze(
    args: &Args,
    directory: &Path,
    csv: &Path,
    json: Option<&Path>,
    strict: bool,
    quiet: bool,
) -> Result<()> {
    let start_time = Instant::now();

    let config = load_config(args.config.as_deref());
    debug!("Using configuration: {:?}", config);

    let analyzer = LogAnalyzer::from_config(directory, &config)
        .with_context(|| format!("Failed to initialize analyzer for {}", directory.display()))?;
    let analyzer = analyzer.strict(strict || config.strict);

    let analysis = analyzer.export_all(csv, json)?;
    analysis.log_diagnostics();

    if !quiet {
        println!("\n{}", "Analysis Complete".bold());
        println!("{} {}", "Jobs analyzed:".green(), analysis.records.len());
        println!("{} {}", "Report:".green(), csv.display());
        println!(
            "{} {:.2} seconds\n",
            "Time elapsed:".green(),
            start_time.elapsed().as_secs_f64()
        );
        print!("{}", output_formatter::format_summary(&analysis));
    }

    Ok(())
}

/// Set up logging with file or console output
fn setup_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(args.log_level);

    builder.format(|buf, record| {
        use chrono::Local;
        use std::io::Write;
        writeln!(
            buf,
            "{} - {} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    // Fall back to stderr if the log file cannot be created
    if let Some(log_file) = &args.log_file {
        match File::create(log_file) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!(
                "{} cannot open log file {}: {}",
                "Warning:".yellow(),
                log_file.display(),
                e
            ),
        }
    }

    builder.try_init()?;

    Ok(())
}
