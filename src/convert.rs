//! Conversion of classified site tables into VCF

use crate::{
    table::{read_classified_sites, read_prepared_sites},
    utils::{discard_partial_output, ensure_parent_dirs},
    vcf::SiteCallWriter,
    ClassifiedSite, ConvertConfig, MissingSitePolicy, PreparedSite, SiteCall, SiteKey, VarcaError,
    VarcaResult,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const DEFAULT_SAMPLE: &str = "SAMPLE";

/// Counts reported after a conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub written: usize,
    pub skipped: usize,
    pub variants: usize,
}

/// Validate conversion configuration parameters
pub fn validate_convert_config(config: &ConvertConfig) -> VarcaResult<()> {
    if let Some(sample) = &config.sample_name {
        if sample.is_empty() || sample.chars().any(char::is_whitespace) {
            return Err(VarcaError::InvalidConfig(format!(
                "sample name must be non-empty without whitespace, got {:?}",
                sample
            )));
        }
    }
    Ok(())
}

/// Pick the VCF sample name: explicit setting, then model name, then a fixed default
pub fn resolve_sample_name(config: &ConvertConfig, model: &str) -> String {
    match &config.sample_name {
        Some(sample) => sample.clone(),
        None if !model.is_empty() => model.to_string(),
        None => DEFAULT_SAMPLE.to_string(),
    }
}

/// Join classified sites to prepared sites, preserving classified order
pub fn join_sites(
    prepared: &HashMap<SiteKey, PreparedSite>,
    classified: Vec<ClassifiedSite>,
    policy: MissingSitePolicy,
) -> VarcaResult<(Vec<SiteCall>, usize)> {
    let mut calls = Vec::with_capacity(classified.len());
    let mut skipped = 0;

    for site in classified {
        match prepared.get(&site.key) {
            Some(prepared_site) => {
                calls.push(SiteCall::new(prepared_site.clone(), site.probability, site.class));
            }
            None => match policy {
                MissingSitePolicy::Abort => return Err(VarcaError::SiteNotFound(site.key)),
                MissingSitePolicy::Skip => {
                    log::warn!("Skipping site {} missing from prepared table", site.key);
                    skipped += 1;
                }
            },
        }
    }

    Ok((calls, skipped))
}

/// Chromosomes in order of first appearance
pub fn contigs_in_order(calls: &[SiteCall]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut contigs = Vec::new();
    for call in calls {
        if seen.insert(call.site.key.chrom.as_str()) {
            contigs.push(call.site.key.chrom.clone());
        }
    }
    contigs
}

/// Write joined calls to a VCF file; a failed write leaves no output behind
pub fn write_site_calls<P: AsRef<Path>>(
    calls: &[SiteCall],
    sample: &str,
    output_path: P,
) -> VarcaResult<()> {
    let output_path = output_path.as_ref();
    ensure_parent_dirs(output_path)?;

    let contigs = contigs_in_order(calls);
    let result = SiteCallWriter::create(output_path, sample, &contigs).and_then(|mut writer| {
        for call in calls {
            writer.write_call(call)?;
        }
        writer.finish()
    });

    if result.is_err() {
        discard_partial_output(output_path);
    }
    result
}

/// Convert a classified table and its prepared table into a VCF file
pub fn convert_to_vcf<P: AsRef<Path>>(
    classified_path: P,
    prepared_path: P,
    output_path: P,
    config: &ConvertConfig,
) -> VarcaResult<ConversionSummary> {
    validate_convert_config(config)?;

    let prepared = read_prepared_sites(&prepared_path)?;
    log::info!("Read {} sites from prepared table", prepared.len());

    let (model, classified) = read_classified_sites(&classified_path)?;
    log::info!("Read {} sites from classified table (model {:?})", classified.len(), model);

    let (calls, skipped) = join_sites(&prepared, classified, config.missing_sites)?;
    let sample = resolve_sample_name(config, &model);

    write_site_calls(&calls, &sample, &output_path)?;

    Ok(ConversionSummary {
        written: calls.len(),
        skipped,
        variants: calls.iter().filter(|call| call.is_variant()).count(),
    })
}
