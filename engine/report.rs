//! Result records and the serialized artifact.
//!
//! The artifact is one `ComparisonReport`: the configuration that produced it
//! plus six `ResultSet`s in the fixed order CSF→temporal tau, CSF→cortical tau,
//! CSF→amyloid, plasma→temporal tau, plasma→cortical tau, plasma→amyloid. It is
//! written as TOML, or as JSON when the output path ends in `.json`. JSON has no
//! NaN, so undefined values from degenerate resamples are written as `null` and
//! read back as NaN.

use crate::bootstrap::Variant;
use crate::ols::LinearFit;
use crate::pvalue::{self, BootstrapSummary, ImprovementTest};
use crate::study::config::{Outcome, Panel, StudyConfig};
use crate::subset::SubsetMode;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML report file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Failed to read or write JSON report: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to write summary table: {0}")]
    CsvError(#[from] csv::Error),
}

/// Full-data fit and bootstrap distribution of one predictor variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant: Variant,
    /// Column the variant was fit on.
    pub predictor: String,
    pub fit: LinearFit,
    pub r2_summary: BootstrapSummary,
    pub beta_summary: BootstrapSummary,
    #[serde(deserialize_with = "crate::float_serde::vec_f64_or_nan")]
    pub bootstrap_r2: Vec<f64>,
    /// Per-iteration standardized beta.
    #[serde(deserialize_with = "crate::float_serde::vec_f64_or_nan")]
    pub bootstrap_beta: Vec<f64>,
}

/// Paired comparison of a biomarker and its normalized ratio for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerComparison {
    pub biomarker: String,
    pub ratio_column: String,
    /// Rows shared by both fits.
    pub nobs: usize,
    /// Benjamini–Hochberg adjusted p-value within the result set.
    pub p_value_fdr: f64,
    pub significance: String,
    pub improvement: ImprovementTest,
    /// Summary of `normalized - raw` R² over finite iterations.
    pub difference: BootstrapSummary,
    pub raw: VariantRecord,
    pub normalized: VariantRecord,
}

impl BiomarkerComparison {
    pub fn variant(&self, variant: Variant) -> &VariantRecord {
        match variant {
            Variant::Raw => &self.raw,
            Variant::Normalized => &self.normalized,
        }
    }

    /// Per-iteration R² differences, degenerate iterations excluded.
    pub fn differences(&self) -> Vec<f64> {
        pvalue::paired_differences(&self.raw.bootstrap_r2, &self.normalized.bootstrap_r2)
    }
}

/// The reference protein fit alone against the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub predictor: String,
    pub fit: LinearFit,
    pub r2_summary: BootstrapSummary,
    pub beta_summary: BootstrapSummary,
    #[serde(deserialize_with = "crate::float_serde::vec_f64_or_nan")]
    pub bootstrap_r2: Vec<f64>,
    #[serde(deserialize_with = "crate::float_serde::vec_f64_or_nan")]
    pub bootstrap_beta: Vec<f64>,
}

/// All comparisons of one panel against one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub panel: Panel,
    pub outcome: Outcome,
    pub outcome_column: String,
    pub subset_mode: SubsetMode,
    /// Rows left after outcome subsetting.
    pub n_subjects: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_protein: Option<ReferenceRecord>,
    pub comparisons: Vec<BiomarkerComparison>,
}

impl ResultSet {
    pub fn comparison(&self, biomarker: &str) -> Option<&BiomarkerComparison> {
        self.comparisons.iter().find(|c| c.biomarker == biomarker)
    }

    /// Comparisons ordered by mean R² improvement, largest first. Undefined
    /// means sort last.
    pub fn ranked_by_improvement(&self) -> Vec<&BiomarkerComparison> {
        let mut ranked: Vec<&BiomarkerComparison> = self.comparisons.iter().collect();
        ranked.sort_by(|a, b| {
            let (x, y) = (a.difference.mean, b.difference.mean);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => y.total_cmp(&x),
            }
        });
        ranked
    }
}

/// The complete output of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Name and version of the program that wrote the report.
    pub generator: String,
    pub config: StudyConfig,
    pub result_sets: Vec<ResultSet>,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    panel: Panel,
    outcome: Outcome,
    biomarker: &'a str,
    variant: &'a str,
    predictor: &'a str,
    nobs: usize,
    r_squared: f64,
    slope: f64,
    intercept: f64,
    standardized_beta: f64,
    r2_mean: f64,
    r2_lower: f64,
    r2_upper: f64,
    beta_mean: f64,
    beta_lower: f64,
    beta_upper: f64,
    r2_difference_mean: Option<f64>,
    r2_difference_lower: Option<f64>,
    r2_difference_upper: Option<f64>,
    p_value: Option<f64>,
    p_value_fdr: Option<f64>,
    significance: Option<&'a str>,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

impl ComparisonReport {
    pub fn new(config: StudyConfig, result_sets: Vec<ResultSet>) -> Self {
        Self {
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            config,
            result_sets,
        }
    }

    pub fn result_set(&self, panel: Panel, outcome: Outcome) -> Option<&ResultSet> {
        self.result_sets
            .iter()
            .find(|set| set.panel == panel && set.outcome == outcome)
    }

    /// Looks up one record by its (panel, outcome, biomarker, variant) key.
    pub fn record(
        &self,
        panel: Panel,
        outcome: Outcome,
        biomarker: &str,
        variant: Variant,
    ) -> Option<&VariantRecord> {
        self.result_set(panel, outcome)?
            .comparison(biomarker)
            .map(|c| c.variant(variant))
    }

    /// Writes the report to `path`, as JSON for a `.json` extension and TOML
    /// otherwise.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let text = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Reads a report previously written by `save`. NaN values written to JSON
    /// as `null` are read back as NaN.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let text = fs::read_to_string(path)?;
        if is_json(path) {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(toml::from_str(&text)?)
        }
    }

    /// Writes one tab-separated row per (panel, outcome, biomarker, variant),
    /// plus one row per reference-protein fit.
    pub fn write_summary(&self, path: &Path) -> Result<(), ReportError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;

        for set in &self.result_sets {
            if let Some(reference) = &set.reference_protein {
                writer.serialize(SummaryRow {
                    panel: set.panel,
                    outcome: set.outcome,
                    biomarker: &reference.predictor,
                    variant: "reference",
                    predictor: &reference.predictor,
                    nobs: reference.fit.nobs,
                    r_squared: reference.fit.r_squared,
                    slope: reference.fit.slope,
                    intercept: reference.fit.intercept,
                    standardized_beta: reference.fit.standardized_beta,
                    r2_mean: reference.r2_summary.mean,
                    r2_lower: reference.r2_summary.lower,
                    r2_upper: reference.r2_summary.upper,
                    beta_mean: reference.beta_summary.mean,
                    beta_lower: reference.beta_summary.lower,
                    beta_upper: reference.beta_summary.upper,
                    r2_difference_mean: None,
                    r2_difference_lower: None,
                    r2_difference_upper: None,
                    p_value: None,
                    p_value_fdr: None,
                    significance: None,
                })?;
            }

            for comparison in &set.comparisons {
                for record in [&comparison.raw, &comparison.normalized] {
                    let tested = record.variant == Variant::Normalized;
                    let variant = record.variant.to_string();
                    writer.serialize(SummaryRow {
                        panel: set.panel,
                        outcome: set.outcome,
                        biomarker: &comparison.biomarker,
                        variant: &variant,
                        predictor: &record.predictor,
                        nobs: record.fit.nobs,
                        r_squared: record.fit.r_squared,
                        slope: record.fit.slope,
                        intercept: record.fit.intercept,
                        standardized_beta: record.fit.standardized_beta,
                        r2_mean: record.r2_summary.mean,
                        r2_lower: record.r2_summary.lower,
                        r2_upper: record.r2_summary.upper,
                        beta_mean: record.beta_summary.mean,
                        beta_lower: record.beta_summary.lower,
                        beta_upper: record.beta_summary.upper,
                        r2_difference_mean: tested.then_some(comparison.difference.mean),
                        r2_difference_lower: tested.then_some(comparison.difference.lower),
                        r2_difference_upper: tested.then_some(comparison.difference.upper),
                        p_value: tested.then_some(comparison.improvement.p_value),
                        p_value_fdr: tested.then_some(comparison.p_value_fdr),
                        significance: tested.then_some(comparison.significance.as_str()),
                    })?;
                }
            }
        }

        writer.flush()?;
        Ok(())
    }
}
