//! CLI binary reporting binary classification metrics

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use varca_tools::{
    metrics::{compute_metrics, validate_metrics_config},
    utils::{validate_file_readable, Timer},
    MetricsConfig, VarcaError, VarcaResult,
};

#[derive(Parser)]
#[command(name = "varca_metrics")]
#[command(about = "Compute classification metrics from truth/prediction/probability tables")]
#[command(long_about = "
This tool reads a headerless, tab-separated table with three columns: the
truth label (0/1), the predicted label (0/1) and the predicted probability of
class 1. Label 1 is the positive class.

The output file has one value per line, in this order:
1. Recall
2. Precision
3. F-beta score (beta 0.5 unless --beta is given)
4. Predicted-negative count (confusion matrix column 0)
5. Predicted-positive count (confusion matrix column 1)
6. ROC-AUC
7. Average precision

The truth column must contain both classes.
")]
struct Args {
    /// Path to the truth/prediction/probability table
    #[arg(value_name = "TABLE")]
    table: PathBuf,

    /// Path to the output metrics file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Weight of recall in the F-beta score
    #[arg(long, default_value = "0.5")]
    beta: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn run() -> VarcaResult<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    log::info!("Starting metrics computation");
    log::info!("Input table: {:?}", args.table);
    log::info!("Output file: {:?}", args.output);

    validate_file_readable(&args.table)?;

    let config = MetricsConfig { beta: args.beta };
    validate_metrics_config(&config)?;

    let _timer = Timer::new("Computing metrics");
    let report = compute_metrics(&args.table, &args.output, &config)?;

    log::info!("Results summary:");
    log::info!("  Recall: {:.4}", report.recall);
    log::info!("  Precision: {:.4}", report.precision);
    log::info!("  F{}: {:.4}", config.beta, report.f_beta);
    log::info!("  ROC-AUC: {:.4}", report.roc_auc);
    log::info!("  Average precision: {:.4}", report.average_precision);

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: VarcaError) -> ! {
    match error {
        VarcaError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        VarcaError::SingleClass(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!("ROC-AUC and average precision are undefined without both truth classes.");
        }
        VarcaError::InvalidRecord(msg) => {
            eprintln!("Error: Invalid record: {}", msg);
            eprintln!("Labels must be 0 or 1 and probabilities numeric.");
        }
        VarcaError::Csv(ref e) => {
            eprintln!("Error: Table parsing error: {}", e);
            eprintln!("Please check that the table has three tab-separated numeric columns.");
        }
        VarcaError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        VarcaError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        VarcaError::MissingColumn(msg) => {
            eprintln!("Error: Missing column: {}", msg);
        }
        VarcaError::SiteNotFound(key) => {
            eprintln!("Error: Site {} not found", key);
        }
        VarcaError::Htslib(ref e) => {
            eprintln!("Error: HTSlib error: {}", e);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}
