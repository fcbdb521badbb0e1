//! # varca-tools - Classifier reporting utilities
//!
//! Companion tools for the varca variant classifier: convert per-site
//! predictions back into VCF and compute binary classification metrics
//! from truth/prediction/probability tables.

pub mod convert;
pub mod metrics;
pub mod table;
pub mod utils;
pub mod vcf;

use std::fmt;

/// Genomic coordinate used to join the prepared and classified tables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey {
    pub chrom: String,
    pub pos: u32,
}

impl SiteKey {
    pub fn new(chrom: String, pos: u32) -> Self {
        Self { chrom, pos }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.pos)
    }
}

/// A row of the prepared site table
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSite {
    pub key: SiteKey,
    /// REF of the caller that supplied the ALT, else the table's REF column
    pub ref_allele: String,
    /// Alternate allele reported by the upstream caller, `None` for a reference call
    pub alt_allele: Option<String>,
}

/// A row of the classified site table
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSite {
    pub key: SiteKey,
    pub probability: f64,
    pub class: u8,
}

/// A prepared site joined with its classifier prediction
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCall {
    pub site: PreparedSite,
    pub probability: f64,
    pub class: u8,
}

impl SiteCall {
    pub fn new(site: PreparedSite, probability: f64, class: u8) -> Self {
        Self {
            site,
            probability,
            class,
        }
    }

    pub fn is_variant(&self) -> bool {
        self.class == 1
    }
}

/// What to do with a classified site that has no prepared counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSitePolicy {
    #[default]
    Abort,
    Skip,
}

/// Configuration for the VCF conversion
#[derive(Debug, Clone, Default)]
pub struct ConvertConfig {
    /// Sample column name; defaults to the model name of the probability column
    pub sample_name: Option<String>,
    pub missing_sites: MissingSitePolicy,
}

/// Configuration for the metrics report
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub beta: f64, // Weight of recall in the F-beta score
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { beta: 0.5 }
    }
}

/// Error types for the varca-tools library
#[derive(Debug, thiserror::Error)]
pub enum VarcaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Site {0} not found in prepared table")]
    SiteNotFound(SiteKey),

    #[error("Truth labels contain a single class: {0}")]
    SingleClass(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type VarcaResult<T> = Result<T, VarcaError>;
