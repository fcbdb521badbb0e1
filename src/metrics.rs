//! Binary classification metrics for truth/prediction/probability tables
//!
//! Label 1 is the positive class throughout. Threshold-free metrics (ROC-AUC,
//! average precision) rank sites by probability and group tied scores into a
//! single threshold.

use crate::{
    table::parse_label,
    utils::{discard_partial_output, ensure_parent_dirs, open_text_reader},
    MetricsConfig, VarcaError, VarcaResult,
};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One evaluated instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsRow {
    pub truth: u8,
    pub predicted: u8,
    pub probability: f64,
}

#[derive(Debug, Deserialize)]
struct RawMetricsRow {
    truth: String,
    predicted: String,
    probability: f64,
}

impl TryFrom<RawMetricsRow> for MetricsRow {
    type Error = VarcaError;

    fn try_from(raw: RawMetricsRow) -> VarcaResult<Self> {
        if !raw.probability.is_finite() {
            return Err(VarcaError::InvalidRecord(format!(
                "Invalid probability: {}",
                raw.probability
            )));
        }
        Ok(MetricsRow {
            truth: parse_label(&raw.truth)?,
            predicted: parse_label(&raw.predicted)?,
            probability: raw.probability,
        })
    }
}

/// Read a headerless three-column metrics table
pub fn read_metrics_table<P: AsRef<Path>>(path: P) -> VarcaResult<Vec<MetricsRow>> {
    let reader = open_text_reader(path)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        if record.len() != 3 {
            return Err(VarcaError::InvalidRecord(format!(
                "line {}: expected 3 fields, found {}",
                record.position().map(|p| p.line()).unwrap_or(0),
                record.len()
            )));
        }
        let raw: RawMetricsRow = record.deserialize(None)?;
        rows.push(MetricsRow::try_from(raw)?);
    }

    if rows.is_empty() {
        return Err(VarcaError::InvalidRecord("metrics table is empty".to_string()));
    }

    Ok(rows)
}

/// 2x2 confusion matrix, rows are truth and columns are predictions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_rows(rows: &[MetricsRow]) -> Self {
        let mut matrix = ConfusionMatrix::default();
        for row in rows {
            match (row.truth, row.predicted) {
                (0, 0) => matrix.true_negatives += 1,
                (0, _) => matrix.false_positives += 1,
                (_, 0) => matrix.false_negatives += 1,
                _ => matrix.true_positives += 1,
            }
        }
        matrix
    }

    /// Sum of column 0
    pub fn predicted_negatives(&self) -> usize {
        self.true_negatives + self.false_negatives
    }

    /// Sum of column 1
    pub fn predicted_positives(&self) -> usize {
        self.true_positives + self.false_positives
    }

    pub fn actual_positives(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    pub fn precision(&self) -> f64 {
        ratio_or_zero(self.true_positives, self.predicted_positives(), "precision")
    }

    pub fn recall(&self) -> f64 {
        ratio_or_zero(self.true_positives, self.actual_positives(), "recall")
    }

    pub fn f_beta(&self, beta: f64) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let beta2 = beta * beta;
        let denominator = beta2 * precision + recall;

        if denominator == 0.0 {
            log::warn!("F-score is ill-defined with zero precision and recall, reporting 0");
            0.0
        } else {
            (1.0 + beta2) * precision * recall / denominator
        }
    }
}

fn ratio_or_zero(numerator: usize, denominator: usize, name: &str) -> f64 {
    if denominator == 0 {
        log::warn!("{} is ill-defined with an empty denominator, reporting 0", name);
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Cumulative (false positive, true positive) counts at each distinct threshold,
/// highest threshold first
fn ranked_counts(labels: &[bool], scores: &[f64]) -> Vec<(usize, usize)> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut counts = Vec::new();
    let mut tp = 0usize;
    let mut fp = 0usize;

    let mut i = 0;
    while i < indices.len() {
        let current_score = scores[indices[i]];
        while i < indices.len() && scores[indices[i]] == current_score {
            if labels[indices[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        counts.push((fp, tp));
    }

    counts
}

fn require_both_classes(labels: &[bool]) -> VarcaResult<(usize, usize)> {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;

    if positives == 0 || negatives == 0 {
        let present = if positives == 0 { 0 } else { 1 };
        return Err(VarcaError::SingleClass(format!(
            "all {} truth labels are {}; ROC-AUC and average precision need both classes",
            labels.len(),
            present
        )));
    }

    Ok((positives, negatives))
}

/// Area under the ROC curve by the trapezoidal rule
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> VarcaResult<f64> {
    let (positives, negatives) = require_both_classes(labels)?;
    let p = positives as f64;
    let n = negatives as f64;

    let mut auc = 0.0;
    let (mut prev_fpr, mut prev_tpr) = (0.0, 0.0);
    for (fp, tp) in ranked_counts(labels, scores) {
        let fpr = fp as f64 / n;
        let tpr = tp as f64 / p;
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_fpr = fpr;
        prev_tpr = tpr;
    }

    Ok(auc)
}

/// Average precision: precision at each threshold weighted by the recall gained there
pub fn average_precision(labels: &[bool], scores: &[f64]) -> VarcaResult<f64> {
    let (positives, _) = require_both_classes(labels)?;
    let p = positives as f64;

    let mut ap = 0.0;
    let mut prev_recall = 0.0;
    for (fp, tp) in ranked_counts(labels, scores) {
        let recall = tp as f64 / p;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }

    Ok(ap)
}

/// The seven reported metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsReport {
    pub precision: f64,
    pub recall: f64,
    pub f_beta: f64,
    pub predicted_negatives: f64,
    pub predicted_positives: f64,
    pub roc_auc: f64,
    pub average_precision: f64,
}

impl MetricsReport {
    /// Values in output order: recall, precision, F-beta, column sums, ROC-AUC, AP
    pub fn values(&self) -> [f64; 7] {
        [
            self.recall,
            self.precision,
            self.f_beta,
            self.predicted_negatives,
            self.predicted_positives,
            self.roc_auc,
            self.average_precision,
        ]
    }
}

/// Validate metrics configuration parameters
pub fn validate_metrics_config(config: &MetricsConfig) -> VarcaResult<()> {
    if !config.beta.is_finite() || config.beta <= 0.0 {
        return Err(VarcaError::InvalidConfig(format!(
            "beta must be a positive number, got {}",
            config.beta
        )));
    }
    Ok(())
}

/// Compute the report for a set of rows
pub fn compute_report(rows: &[MetricsRow], config: &MetricsConfig) -> VarcaResult<MetricsReport> {
    validate_metrics_config(config)?;

    let labels: Vec<bool> = rows.iter().map(|r| r.truth == 1).collect();
    let scores: Vec<f64> = rows.iter().map(|r| r.probability).collect();
    require_both_classes(&labels)?;

    let matrix = ConfusionMatrix::from_rows(rows);
    log::debug!("Confusion matrix: {:?}", matrix);

    Ok(MetricsReport {
        precision: matrix.precision(),
        recall: matrix.recall(),
        f_beta: matrix.f_beta(config.beta),
        predicted_negatives: matrix.predicted_negatives() as f64,
        predicted_positives: matrix.predicted_positives() as f64,
        roc_auc: roc_auc(&labels, &scores)?,
        average_precision: average_precision(&labels, &scores)?,
    })
}

/// Write the report one value per line
pub fn write_report<P: AsRef<Path>>(report: &MetricsReport, output_path: P) -> VarcaResult<()> {
    let output_path = output_path.as_ref();
    ensure_parent_dirs(output_path)?;

    let result = File::create(output_path)
        .map_err(VarcaError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            for value in report.values() {
                writeln!(writer, "{}", value)?;
            }
            writer.flush()?;
            Ok(())
        });

    if result.is_err() {
        discard_partial_output(output_path);
    }
    result
}

/// Read a metrics table, compute the report and write it out
pub fn compute_metrics<P: AsRef<Path>>(
    table_path: P,
    output_path: P,
    config: &MetricsConfig,
) -> VarcaResult<MetricsReport> {
    let rows = read_metrics_table(&table_path)?;
    log::info!("Read {} rows from metrics table", rows.len());

    let report = compute_report(&rows, config)?;
    write_report(&report, &output_path)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn row(truth: u8, predicted: u8, probability: f64) -> MetricsRow {
        MetricsRow {
            truth,
            predicted,
            probability,
        }
    }

    fn example_rows() -> Vec<MetricsRow> {
        vec![
            row(1, 1, 0.9),
            row(1, 0, 0.2),
            row(0, 0, 0.1),
            row(0, 1, 0.8),
        ]
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_confusion_matrix() {
        let matrix = ConfusionMatrix::from_rows(&example_rows());
        assert_eq!(
            matrix,
            ConfusionMatrix {
                true_negatives: 1,
                false_positives: 1,
                false_negatives: 1,
                true_positives: 1,
            }
        );
        assert_eq!(matrix.predicted_negatives(), 2);
        assert_eq!(matrix.predicted_positives(), 2);
        assert_close(matrix.precision(), 0.5);
        assert_close(matrix.recall(), 0.5);
        assert_close(matrix.f_beta(0.5), 0.5);
    }

    #[test]
    fn test_f_beta_weights_precision() {
        // precision 1.0, recall 0.5
        let rows = vec![row(1, 1, 0.9), row(1, 0, 0.4), row(0, 0, 0.1)];
        let matrix = ConfusionMatrix::from_rows(&rows);
        assert_close(matrix.precision(), 1.0);
        assert_close(matrix.recall(), 0.5);
        assert_close(matrix.f_beta(0.5), 1.25 * 0.5 / (0.25 + 0.5));
        assert_close(matrix.f_beta(1.0), 2.0 / 3.0);
    }

    #[test]
    fn test_zero_division_reports_zero() {
        let rows = vec![row(1, 0, 0.4), row(0, 0, 0.1)];
        let matrix = ConfusionMatrix::from_rows(&rows);
        assert_eq!(matrix.precision(), 0.0);
        assert_eq!(matrix.recall(), 0.0);
        assert_eq!(matrix.f_beta(0.5), 0.0);
    }

    #[test]
    fn test_roc_auc_and_average_precision() {
        let labels = [true, true, false, false];
        let scores = [0.9, 0.2, 0.1, 0.8];
        assert_close(roc_auc(&labels, &scores).unwrap(), 0.75);
        assert_close(average_precision(&labels, &scores).unwrap(), 5.0 / 6.0);
    }

    #[test]
    fn test_tied_scores_share_a_threshold() {
        let labels = [false, true, false, true];
        let scores = [0.5, 0.5, 0.2, 0.8];
        assert_close(roc_auc(&labels, &scores).unwrap(), 0.875);
        assert_close(average_precision(&labels, &scores).unwrap(), 5.0 / 6.0);

        let labels = [true, false];
        let scores = [0.3, 0.3];
        assert_close(roc_auc(&labels, &scores).unwrap(), 0.5);
        assert_close(average_precision(&labels, &scores).unwrap(), 0.5);
    }

    #[test]
    fn test_perfect_ranking() {
        let labels = [false, false, true, true];
        let scores = [0.1, 0.2, 0.7, 0.9];
        assert_close(roc_auc(&labels, &scores).unwrap(), 1.0);
        assert_close(average_precision(&labels, &scores).unwrap(), 1.0);
    }

    #[test]
    fn test_single_class_is_an_error() {
        let rows = vec![row(0, 0, 0.1), row(0, 1, 0.7)];
        let result = compute_report(&rows, &MetricsConfig::default());
        assert!(matches!(result, Err(VarcaError::SingleClass(_))));

        assert!(roc_auc(&[true, true], &[0.2, 0.4]).is_err());
        assert!(average_precision(&[false, false], &[0.2, 0.4]).is_err());
    }

    #[test]
    fn test_report_order() {
        let report = compute_report(&example_rows(), &MetricsConfig::default()).unwrap();
        let values = report.values();
        let expected = [0.5, 0.5, 0.5, 2.0, 2.0, 0.75, 5.0 / 6.0];
        for (actual, expected) in values.iter().zip(expected.iter()) {
            assert_close(*actual, *expected);
        }

        // Recall comes before precision in the output
        let rows = vec![row(1, 1, 0.9), row(1, 0, 0.4), row(0, 0, 0.1)];
        let values = compute_report(&rows, &MetricsConfig::default()).unwrap().values();
        assert_close(values[0], 0.5);
        assert_close(values[1], 1.0);
    }

    #[test]
    fn test_validate_metrics_config() {
        assert!(validate_metrics_config(&MetricsConfig::default()).is_ok());
        assert!(validate_metrics_config(&MetricsConfig { beta: 0.0 }).is_err());
        assert!(validate_metrics_config(&MetricsConfig { beta: f64::NAN }).is_err());
    }

    #[test]
    fn test_read_metrics_table() {
        let mut table = NamedTempFile::new().unwrap();
        write!(table, "1\t1\t0.9\n1\t0\t0.2\n0.0\t0\t0.1\n0\t1.0\t0.8").unwrap();

        let rows = read_metrics_table(table.path()).unwrap();
        assert_eq!(rows, example_rows());
    }

    #[test]
    fn test_read_metrics_table_rejects_bad_rows() {
        let mut table = NamedTempFile::new().unwrap();
        writeln!(table, "1\t1\tabc").unwrap();
        assert!(matches!(read_metrics_table(table.path()), Err(VarcaError::Csv(_))));

        let mut table = NamedTempFile::new().unwrap();
        writeln!(table, "2\t1\t0.5").unwrap();
        assert!(matches!(
            read_metrics_table(table.path()),
            Err(VarcaError::InvalidRecord(_))
        ));

        let mut table = NamedTempFile::new().unwrap();
        writeln!(table, "1\t1\t0.5\t7").unwrap();
        assert!(matches!(
            read_metrics_table(table.path()),
            Err(VarcaError::InvalidRecord(_))
        ));

        let table = NamedTempFile::new().unwrap();
        assert!(matches!(
            read_metrics_table(table.path()),
            Err(VarcaError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_compute_metrics_is_deterministic() {
        let mut table = NamedTempFile::new().unwrap();
        write!(table, "1\t1\t0.9\n1\t0\t0.2\n0\t0\t0.1\n0\t1\t0.8").unwrap();
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");

        compute_metrics(table.path(), first.as_path(), &MetricsConfig::default()).unwrap();
        compute_metrics(table.path(), second.as_path(), &MetricsConfig::default()).unwrap();

        let first = std::fs::read(&first).unwrap();
        assert_eq!(first, std::fs::read(&second).unwrap());

        let text = String::from_utf8(first).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(&lines[..6], &["0.5", "0.5", "0.5", "2", "2", "0.75"]);
    }

    #[test]
    fn test_compute_metrics_single_class_writes_nothing() {
        let mut table = NamedTempFile::new().unwrap();
        write!(table, "0\t0\t0.1\n0\t1\t0.8").unwrap();
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.txt");

        let result = compute_metrics(table.path(), output.as_path(), &MetricsConfig::default());
        assert!(matches!(result, Err(VarcaError::SingleClass(_))));
        assert!(!output.exists());
    }
}
