//! CLI binary converting classifier predictions back into VCF

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use varca_tools::{
    convert::convert_to_vcf,
    utils::{format_file_size, validate_file_readable, Timer},
    ConvertConfig, MissingSitePolicy, VarcaError, VarcaResult,
};

#[derive(Parser)]
#[command(name = "varca2vcf")]
#[command(about = "Convert classified site tables into VCF")]
#[command(long_about = "
This tool joins a classifier's per-site predictions with the prepared site
table by CHROM and POS and writes one VCF record per classified site, in the
order of the classified table.

The classified table needs CHROM, POS and columns ending in ~prob.1 and
~CLASS:. The prepared table needs CHROM, POS, REF and columns ending in ~REF
and ~ALT. Either table may be gzip-compressed.

Record fields:
- ALT: the caller's alternate allele, '.' for reference calls
- QUAL: -10*log10(1 - probability), capped at 100
- FILTER: PASS for class 1, REJECT for class 0
- INFO/PROB and FORMAT/PR: the alternate-class probability
- FORMAT/GT: 0/1 for class 1, 0/0 for class 0, ./. for class 1 without ALT

Output paths ending in .gz are written BGZF-compressed.
")]
struct Args {
    /// Path to the classified site table
    #[arg(value_name = "CLASSIFIED")]
    classified: PathBuf,

    /// Path to the prepared site table
    #[arg(value_name = "PREPARED")]
    prepared: PathBuf,

    /// Path to the output VCF file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Sample column name (defaults to the model name of the probability column)
    #[arg(long, value_name = "NAME")]
    sample: Option<String>,

    /// Skip classified sites missing from the prepared table instead of failing
    #[arg(long)]
    skip_missing: bool,

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

    log::info!("Starting VCF conversion");
    log::info!("Classified table: {:?}", args.classified);
    log::info!("Prepared table: {:?}", args.prepared);
    log::info!("Output file: {:?}", args.output);

    validate_file_readable(&args.classified)?;
    validate_file_readable(&args.prepared)?;

    let config = ConvertConfig {
        sample_name: args.sample,
        missing_sites: if args.skip_missing {
            MissingSitePolicy::Skip
        } else {
            MissingSitePolicy::Abort
        },
    };

    let _timer = Timer::new("Converting classified sites to VCF");
    let summary = convert_to_vcf(&args.classified, &args.prepared, &args.output, &config)?;

    log::info!("Results summary:");
    log::info!("  Records written: {}", summary.written);
    log::info!("  Predicted variants: {}", summary.variants);
    if summary.skipped > 0 {
        log::warn!("Skipped {} sites missing from the prepared table", summary.skipped);
    }

    if let Ok(size) = std::fs::metadata(&args.output).map(|m| m.len()) {
        log::info!("Output VCF size: {}", format_file_size(size));
    }

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: VarcaError) -> ! {
    match error {
        VarcaError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        VarcaError::MissingColumn(msg) => {
            eprintln!("Error: Missing column: {}", msg);
            eprintln!("The classified table needs *~prob.1 and *~CLASS: columns; the prepared table needs REF, *~REF and *~ALT.");
        }
        VarcaError::InvalidRecord(msg) => {
            eprintln!("Error: Invalid record: {}", msg);
            eprintln!("Please check that both tables are properly formatted.");
        }
        VarcaError::SiteNotFound(key) => {
            eprintln!("Error: Site {} is not in the prepared table", key);
            eprintln!("Use --skip-missing to drop such sites with a warning.");
        }
        VarcaError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        VarcaError::Htslib(ref e) => {
            eprintln!("Error: VCF writing error: {}", e);
            eprintln!("Please check the chromosome names and alleles in the prepared table.");
        }
        VarcaError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        VarcaError::Csv(ref e) => {
            eprintln!("Error: Table parsing error: {}", e);
            eprintln!("Please check that both tables are tab-separated with a header row.");
        }
        VarcaError::SingleClass(msg) => {
            eprintln!("Error: {}", msg);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}
