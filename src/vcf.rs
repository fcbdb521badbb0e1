//! VCF output for classified site calls

use crate::{utils::has_extension, SiteCall, VarcaError, VarcaResult};
use rust_htslib::bcf::{record::GenotypeAllele, Format, Header, Writer};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub const SOURCE: &str = "varca2vcf";

/// Highest QUAL emitted, reached when the alternate probability is 1
pub const MAX_QUAL: f64 = 100.0;
const MIN_ERROR_PROB: f64 = 1e-10;

/// Empty block htslib appends when closing a BGZF stream
const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

const PROB_TAG: &[u8] = b"PROB";
const PR_TAG: &[u8] = b"PR";

/// Phred-scaled confidence that the site carries the alternate allele
pub fn phred_quality(probability: f64) -> f64 {
    let error = (1.0 - probability).max(MIN_ERROR_PROB);
    let qual = -10.0 * error.log10();
    if qual > 0.0 {
        qual.min(MAX_QUAL)
    } else {
        0.0
    }
}

/// Predicted diploid genotype of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genotype {
    HomRef,
    Het,
    NoCall,
}

impl Genotype {
    /// Class 1 means the caller's ALT is real; without an ALT there is nothing to genotype
    pub fn from_call(call: &SiteCall) -> Self {
        match (call.is_variant(), call.site.alt_allele.is_some()) {
            (false, _) => Genotype::HomRef,
            (true, true) => Genotype::Het,
            (true, false) => Genotype::NoCall,
        }
    }

    pub fn alleles(&self) -> [GenotypeAllele; 2] {
        match self {
            Genotype::HomRef => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(0)],
            Genotype::Het => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(1)],
            Genotype::NoCall => [GenotypeAllele::UnphasedMissing, GenotypeAllele::UnphasedMissing],
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Genotype::HomRef => "0/0",
            Genotype::Het => "0/1",
            Genotype::NoCall => "./.",
        };
        f.write_str(text)
    }
}

/// FILTER value for a call: PASS when the classifier kept the site
pub fn site_filter(call: &SiteCall) -> &'static str {
    if call.is_variant() {
        "PASS"
    } else {
        "REJECT"
    }
}

/// Build the VCF header for a single-sample classifier output
pub fn build_header(sample: &str, contigs: &[String]) -> Header {
    let mut header = Header::new();

    header.push_record(format!("##source={}", SOURCE).as_bytes());
    for contig in contigs {
        header.push_record(format!("##contig=<ID={}>", contig).as_bytes());
    }
    header.push_record(
        br#"##FILTER=<ID=REJECT,Description="Classifier predicted the reference class">"#,
    );
    header.push_record(
        br#"##INFO=<ID=PROB,Number=1,Type=Float,Description="Classifier probability of the alternate class">"#,
    );
    header.push_record(br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#);
    header.push_record(
        br#"##FORMAT=<ID=PR,Number=1,Type=Float,Description="Classifier probability of the alternate class">"#,
    );
    header.push_sample(sample.as_bytes());

    header
}

/// Writes site calls as VCF records, BGZF-compressed when the path ends in `.gz`
pub struct SiteCallWriter {
    writer: Writer,
    path: PathBuf,
    compressed: bool,
}

impl SiteCallWriter {
    pub fn create<P: AsRef<Path>>(path: P, sample: &str, contigs: &[String]) -> VarcaResult<Self> {
        let header = build_header(sample, contigs);
        let compressed = has_extension(&path, "gz");
        let writer = Writer::from_path(path.as_ref(), &header, !compressed, Format::Vcf)?;

        Ok(SiteCallWriter {
            writer,
            path: path.as_ref().to_path_buf(),
            compressed,
        })
    }

    /// Close the file and check that it was written out in full.
    ///
    /// htslib flushes and closes on drop without reporting failures.
    pub fn finish(self) -> VarcaResult<()> {
        let SiteCallWriter {
            writer,
            path,
            compressed,
        } = self;
        drop(writer);
        verify_complete_output(&path, compressed)
    }

    pub fn write_call(&mut self, call: &SiteCall) -> VarcaResult<()> {
        let site = &call.site;
        let genotype = Genotype::from_call(call);
        log::debug!("Writing {} as {} (p={})", site.key, genotype, call.probability);

        let mut record = self.writer.empty_record();

        let rid = self.writer.header().name2rid(site.key.chrom.as_bytes())?;
        record.set_rid(Some(rid));
        record.set_pos(i64::from(site.key.pos) - 1);

        let mut alleles: Vec<&[u8]> = vec![site.ref_allele.as_bytes()];
        if let Some(alt) = &site.alt_allele {
            alleles.push(alt.as_bytes());
        }
        record.set_alleles(&alleles)?;

        record.set_qual(phred_quality(call.probability) as f32);
        record.push_filter(site_filter(call).as_bytes())?;
        record.push_info_float(PROB_TAG, &[call.probability as f32])?;
        record.push_genotypes(&genotype.alleles())?;
        record.push_format_float(PR_TAG, &[call.probability as f32])?;

        self.writer.write(&record)?;
        Ok(())
    }
}

/// Check that a closed VCF ends cleanly: a final newline, or the BGZF EOF block
pub fn verify_complete_output(path: &Path, compressed: bool) -> VarcaResult<()> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let expected: &[u8] = if compressed { &BGZF_EOF } else { b"\n" };

    let mut tail = vec![0u8; expected.len()];
    let complete = len >= expected.len() as u64 && {
        file.seek(SeekFrom::End(-(expected.len() as i64)))?;
        file.read_exact(&mut tail)?;
        tail == expected
    };

    if !complete {
        return Err(VarcaError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("VCF output {:?} is incomplete", path),
        )));
    }
    Ok(())
}
