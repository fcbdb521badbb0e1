//! Tab-separated table loading for prepared and classified site tables

use crate::{
    utils::open_text_reader, ClassifiedSite, PreparedSite, SiteKey, VarcaError, VarcaResult,
};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

pub const ALT_SENTINEL: &str = ".";

const CALLER_REF_SUFFIX: &str = "~REF";
const CALLER_ALT_SUFFIX: &str = "~ALT";
const PROBABILITY_SUFFIX: &str = "~prob.1";
const CLASS_SUFFIX: &str = "~CLASS:";

/// REF/ALT column pair of one upstream caller, matched by the `<caller>~` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerColumns {
    pub name: String,
    pub ref_allele: usize,
    pub alt_allele: usize,
}

/// Column indices for the prepared site table
#[derive(Debug, Clone)]
pub struct PreparedColumns {
    pub chrom: usize,
    pub pos: usize,
    pub ref_allele: usize,
    /// Callers in header order
    pub callers: Vec<CallerColumns>,
}

impl PreparedColumns {
    pub fn from_header(header: &StringRecord) -> VarcaResult<Self> {
        Ok(PreparedColumns {
            chrom: find_column(header, "CHROM")?,
            pos: find_column(header, "POS")?,
            ref_allele: find_column(header, "REF")?,
            callers: find_caller_columns(header)?,
        })
    }
}

fn find_caller_columns(header: &StringRecord) -> VarcaResult<Vec<CallerColumns>> {
    let mut callers = Vec::new();

    for (alt_allele, col) in header.iter().enumerate() {
        let name = match col.strip_suffix(CALLER_ALT_SUFFIX) {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };
        let ref_name = format!("{}{}", name, CALLER_REF_SUFFIX);
        let ref_allele = find_column(header, &ref_name)?;

        callers.push(CallerColumns {
            name: name.to_string(),
            ref_allele,
            alt_allele,
        });
    }

    for col in header.iter() {
        if let Some(name) = col.strip_suffix(CALLER_REF_SUFFIX) {
            if !name.is_empty() && !callers.iter().any(|c| c.name == name) {
                log::warn!("Ignoring {} without a matching {}{} column", col, name, CALLER_ALT_SUFFIX);
            }
        }
    }

    if callers.is_empty() {
        return Err(VarcaError::MissingColumn(format!(
            "no *{} / *{} column pair found in table header",
            CALLER_REF_SUFFIX, CALLER_ALT_SUFFIX
        )));
    }

    Ok(callers)
}

/// Column indices for the classified site table
#[derive(Debug, Clone)]
pub struct ClassifiedColumns {
    pub chrom: usize,
    pub pos: usize,
    pub probability: usize,
    pub class: usize,
    /// Model name, the part of the probability column before `~`
    pub model: String,
}

impl ClassifiedColumns {
    pub fn from_header(header: &StringRecord) -> VarcaResult<Self> {
        let probability = find_suffix_column(header, PROBABILITY_SUFFIX)?;
        let model = header[probability]
            .strip_suffix(PROBABILITY_SUFFIX)
            .unwrap_or_default()
            .to_string();

        Ok(ClassifiedColumns {
            chrom: find_column(header, "CHROM")?,
            pos: find_column(header, "POS")?,
            probability,
            class: find_suffix_column(header, CLASS_SUFFIX)?,
            model,
        })
    }
}

fn find_column(header: &StringRecord, name: &str) -> VarcaResult<usize> {
    header
        .iter()
        .position(|col| col == name)
        .ok_or_else(|| VarcaError::MissingColumn(format!("{} column not found in table header", name)))
}

fn find_suffix_column(header: &StringRecord, suffix: &str) -> VarcaResult<usize> {
    let matches: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, col)| col.len() > suffix.len() && col.ends_with(suffix))
        .map(|(idx, _)| idx)
        .collect();

    match matches.as_slice() {
        [] => Err(VarcaError::MissingColumn(format!(
            "no column matching *{} found in table header",
            suffix
        ))),
        [first, rest @ ..] => {
            if !rest.is_empty() {
                log::warn!(
                    "{} columns match *{}, using {}",
                    matches.len(),
                    suffix,
                    &header[*first]
                );
            }
            Ok(*first)
        }
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn field<'r>(record: &'r StringRecord, index: usize) -> VarcaResult<&'r str> {
    record.get(index).ok_or_else(|| {
        VarcaError::InvalidRecord(format!(
            "line {}: expected at least {} fields, found {}",
            line_of(record),
            index + 1,
            record.len()
        ))
    })
}

/// Parse a 1-based genomic position
pub fn parse_position(value: &str) -> VarcaResult<u32> {
    match value.parse::<u32>() {
        Ok(pos) if pos >= 1 => Ok(pos),
        _ => Err(VarcaError::InvalidRecord(format!("Invalid position: {}", value))),
    }
}

/// Parse a probability in [0, 1]
pub fn parse_probability(value: &str) -> VarcaResult<f64> {
    match value.parse::<f64>() {
        Ok(p) if (0.0..=1.0).contains(&p) => Ok(p),
        _ => Err(VarcaError::InvalidRecord(format!("Invalid probability: {}", value))),
    }
}

/// Parse a binary class label, accepting integer or float notation
pub fn parse_label(value: &str) -> VarcaResult<u8> {
    let label = match value {
        "0" => Some(0),
        "1" => Some(1),
        _ => match value.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(0),
            Ok(v) if v == 1.0 => Some(1),
            _ => None,
        },
    };

    label.ok_or_else(|| VarcaError::InvalidRecord(format!("Invalid class label: {}", value)))
}

fn tsv_reader<P: AsRef<Path>>(path: P) -> VarcaResult<csv::Reader<Box<dyn std::io::BufRead>>> {
    let reader = open_text_reader(path)?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(reader))
}

/// Allele cell value, `None` for the sentinel or an empty cell
fn called_allele(value: &str) -> Option<&str> {
    if value.is_empty() || value == ALT_SENTINEL {
        None
    } else {
        Some(value)
    }
}

/// First caller, in header order, with a real ALT: (caller, caller REF, ALT)
fn first_called_alt<'r>(
    record: &'r StringRecord,
    callers: &'r [CallerColumns],
) -> VarcaResult<Option<(&'r str, Option<&'r str>, &'r str)>> {
    for caller in callers {
        if let Some(alt) = called_allele(field(record, caller.alt_allele)?) {
            let caller_ref = called_allele(field(record, caller.ref_allele)?);
            return Ok(Some((caller.name.as_str(), caller_ref, alt)));
        }
    }
    Ok(None)
}

/// Read the prepared site table into a map keyed by (CHROM, POS)
pub fn read_prepared_sites<P: AsRef<Path>>(path: P) -> VarcaResult<HashMap<SiteKey, PreparedSite>> {
    let mut reader = tsv_reader(path)?;
    let columns = PreparedColumns::from_header(reader.headers()?)?;
    log::debug!("Prepared table columns: {:?}", columns);

    let mut sites = HashMap::new();

    for result in reader.records() {
        let record = result?;

        let key = SiteKey::new(
            field(&record, columns.chrom)?.to_string(),
            parse_position(field(&record, columns.pos)?)?,
        );
        let ref_column = field(&record, columns.ref_allele)?;
        if ref_column.is_empty() {
            return Err(VarcaError::InvalidRecord(format!(
                "line {}: empty REF at {}",
                line_of(&record),
                key
            )));
        }

        let (ref_allele, alt_allele) = match first_called_alt(&record, &columns.callers)? {
            Some((caller, caller_ref, alt)) => {
                let ref_allele = caller_ref.unwrap_or(ref_column);
                if ref_allele == alt {
                    return Err(VarcaError::InvalidRecord(format!(
                        "line {}: {} ALT {} equals REF at {}",
                        line_of(&record),
                        caller,
                        alt,
                        key
                    )));
                }
                if ref_allele != ref_column {
                    log::debug!("Using {} REF {} over REF {} at {}", caller, ref_allele, ref_column, key);
                }
                (ref_allele.to_string(), Some(alt.to_string()))
            }
            None => (ref_column.to_string(), None),
        };

        let site = PreparedSite {
            key: key.clone(),
            ref_allele,
            alt_allele,
        };

        if sites.insert(key.clone(), site).is_some() {
            return Err(VarcaError::InvalidRecord(format!(
                "line {}: duplicate site {} in prepared table",
                line_of(&record),
                key
            )));
        }
    }

    Ok(sites)
}

/// Read the classified site table in file order, returning the model name as well
pub fn read_classified_sites<P: AsRef<Path>>(path: P) -> VarcaResult<(String, Vec<ClassifiedSite>)> {
    let mut reader = tsv_reader(path)?;
    let columns = ClassifiedColumns::from_header(reader.headers()?)?;
    log::debug!("Classified table columns: {:?}", columns);

    let mut sites = Vec::new();

    for result in reader.records() {
        let record = result?;

        let key = SiteKey::new(
            field(&record, columns.chrom)?.to_string(),
            parse_position(field(&record, columns.pos)?)?,
        );
        let probability = parse_probability(field(&record, columns.probability)?)?;
        let class = parse_label(field(&record, columns.class)?)?;

        sites.push(ClassifiedSite {
            key,
            probability,
            class,
        });
    }

    Ok((columns.model, sites))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_table(lines: &[&str]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(temp_file, "{}", line).unwrap();
        }
        temp_file
    }

    #[test]
    fn test_read_prepared_sites() {
        let table = write_table(&[
            "CHROM\tPOS\tREF\tcall-snp~REF\tcall-snp~ALT",
            "1\t100\tA\tA\tG",
            "1\t200\tT\tT\t.",
        ]);

        let sites = read_prepared_sites(table.path()).unwrap();
        assert_eq!(sites.len(), 2);

        let site = &sites[&SiteKey::new("1".to_string(), 100)];
        assert_eq!(site.ref_allele, "A");
        assert_eq!(site.alt_allele.as_deref(), Some("G"));

        let site = &sites[&SiteKey::new("1".to_string(), 200)];
        assert_eq!(site.alt_allele, None);
    }

    #[test]
    fn test_prepared_missing_alt_column() {
        let table = write_table(&["CHROM\tPOS\tREF\tcall-snp~REF", "1\t100\tA\tA"]);
        let result = read_prepared_sites(table.path());
        assert!(matches!(result, Err(VarcaError::MissingColumn(_))));
    }

    #[test]
    fn test_prepared_indel_uses_caller_ref() {
        let table = write_table(&[
            "CHROM\tPOS\tREF\tcall-indel~REF\tcall-indel~ALT",
            "1\t100\tA\tAT\tA",
            "1\t300\tC\t.\tCG",
        ]);

        let sites = read_prepared_sites(table.path()).unwrap();

        let site = &sites[&SiteKey::new("1".to_string(), 100)];
        assert_eq!(site.ref_allele, "AT");
        assert_eq!(site.alt_allele.as_deref(), Some("A"));

        let site = &sites[&SiteKey::new("1".to_string(), 300)];
        assert_eq!(site.ref_allele, "C");
        assert_eq!(site.alt_allele.as_deref(), Some("CG"));
    }

    #[test]
    fn test_prepared_alt_equal_to_ref() {
        let table = write_table(&["CHROM\tPOS\tREF\tc~REF\tc~ALT", "1\t100\tA\tAT\tAT"]);
        let result = read_prepared_sites(table.path());
        assert!(matches!(result, Err(VarcaError::InvalidRecord(_))));
    }

    #[test]
    fn test_prepared_takes_first_caller_with_alt() {
        let table = write_table(&[
            "CHROM\tPOS\tREF\tgatk~REF\tgatk~ALT\tvarscan~REF\tvarscan~ALT",
            "1\t100\tA\t.\t.\tA\tG",
            "1\t200\tT\tT\tC\tT\tG",
            "1\t300\tG\tG\t.\tG\t.",
        ]);

        let sites = read_prepared_sites(table.path()).unwrap();
        let alt = |pos| sites[&SiteKey::new("1".to_string(), pos)].alt_allele.clone();

        assert_eq!(alt(100).as_deref(), Some("G"));
        assert_eq!(alt(200).as_deref(), Some("C"));
        assert_eq!(alt(300), None);
    }

    #[test]
    fn test_caller_columns_paired_by_prefix() {
        let header = StringRecord::from(vec![
            "CHROM", "POS", "REF", "gatk~ALT", "varscan~REF", "gatk~REF", "varscan~ALT",
        ]);
        let columns = PreparedColumns::from_header(&header).unwrap();
        assert_eq!(
            columns.callers,
            vec![
                CallerColumns { name: "gatk".to_string(), ref_allele: 5, alt_allele: 3 },
                CallerColumns { name: "varscan".to_string(), ref_allele: 4, alt_allele: 6 },
            ]
        );

        let header = StringRecord::from(vec!["CHROM", "POS", "REF", "gatk~ALT"]);
        assert!(matches!(
            PreparedColumns::from_header(&header),
            Err(VarcaError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_prepared_duplicate_site() {
        let table = write_table(&[
            "CHROM\tPOS\tREF\tc~REF\tc~ALT",
            "1\t100\tA\tA\tG",
            "1\t100\tA\tA\tT",
        ]);
        let result = read_prepared_sites(table.path());
        assert!(matches!(result, Err(VarcaError::InvalidRecord(_))));
    }

    #[test]
    fn test_read_classified_sites() {
        let table = write_table(&[
            "CHROM\tPOS\tvarca~prob.1\tvarca~CLASS:",
            "1\t100\t0.9\t1",
            "2\t50\t0.3\t0",
        ]);

        let (model, sites) = read_classified_sites(table.path()).unwrap();
        assert_eq!(model, "varca");
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].key, SiteKey::new("1".to_string(), 100));
        assert_eq!(sites[0].probability, 0.9);
        assert_eq!(sites[0].class, 1);
        assert_eq!(sites[1].key.chrom, "2");
        assert_eq!(sites[1].class, 0);
    }

    #[test]
    fn test_classified_missing_class_column() {
        let table = write_table(&["CHROM\tPOS\tvarca~prob.1", "1\t100\t0.9"]);
        let result = read_classified_sites(table.path());
        assert!(matches!(result, Err(VarcaError::MissingColumn(_))));
    }

    #[test]
    fn test_classified_malformed_probability() {
        let table = write_table(&[
            "CHROM\tPOS\tvarca~prob.1\tvarca~CLASS:",
            "1\t100\thigh\t1",
        ]);
        let result = read_classified_sites(table.path());
        assert!(matches!(result, Err(VarcaError::InvalidRecord(_))));
    }

    #[test]
    fn test_classified_wrong_field_count() {
        let table = write_table(&[
            "CHROM\tPOS\tvarca~prob.1\tvarca~CLASS:",
            "1\t100\t0.9",
        ]);
        let result = read_classified_sites(table.path());
        assert!(matches!(result, Err(VarcaError::Csv(_))));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_position("100").unwrap(), 100);
        assert!(parse_position("0").is_err());
        assert!(parse_position("-5").is_err());

        assert_eq!(parse_probability("0.25").unwrap(), 0.25);
        assert!(parse_probability("1.5").is_err());
        assert!(parse_probability("NaN").is_err());

        assert_eq!(parse_label("1").unwrap(), 1);
        assert_eq!(parse_label("0.0").unwrap(), 0);
        assert!(parse_label("2").is_err());
    }
}
