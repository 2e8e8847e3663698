//! # Study Pipeline
//!
//! `run_study` is the single computational entry point. Given a loaded table and
//! a `StudyConfig` it:
//!
//! 1. validates the configuration and checks every referenced column exists,
//! 2. appends the ratio columns of both panels,
//! 3. for each (panel, outcome) in the fixed output order, subsets the table,
//!    fits and bootstraps every biomarker pair, and adjusts the p-values of the
//!    set with Benjamini–Hochberg,
//! 4. returns the typed `ComparisonReport`.
//!
//! Every bootstrap draws its seed, in a fixed order, from one master RNG seeded
//! with `config.seed`, so a run is reproducible end to end.

use crate::bootstrap::{self, PairedSample, Variant};
use crate::ols;
use crate::progress::BootstrapProgress;
use crate::pvalue;
use crate::ratio::{self, RatioError};
use crate::report::{BiomarkerComparison, ComparisonReport, ReferenceRecord, ResultSet, VariantRecord};
use crate::study::config::{ConfigError, Outcome, Panel, PanelConfig, StudyConfig};
use crate::study::data::{self, DataError};
use crate::subset::{self, SubsetError, SubsetMode};
use ndarray::Array1;
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

/// Fewest rows a regression is attempted on.
pub const MINIMUM_PAIRED_ROWS: usize = 3;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid study configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Ratio(#[from] RatioError),
    #[error(transparent)]
    Subset(#[from] SubsetError),
    #[error(
        "No subjects remain for outcome '{outcome}' when evaluating the {panel} panel ({mode}). {}",
        empty_subset_hint(.mode)
    )]
    EmptySubset {
        panel: Panel,
        outcome: String,
        mode: SubsetMode,
    },
    #[error(
        "Only {found} usable rows for {panel} predictor '{predictor}' against outcome '{outcome}'; at least {required} are required."
    )]
    InsufficientRows {
        panel: Panel,
        outcome: String,
        predictor: String,
        found: usize,
        required: usize,
    },
}

fn empty_subset_hint(mode: &SubsetMode) -> &'static str {
    match mode {
        SubsetMode::MaximizeAvailability => "The outcome column has no present values.",
        SubsetMode::CommonSubset => {
            "No subject has the outcome, the reference protein and every raw and normalized biomarker of the panel all present."
        }
    }
}

/// Everything needed to evaluate one panel against one outcome.
struct SetJob<'a> {
    panel: Panel,
    outcome: Outcome,
    settings: &'a PanelConfig,
    ratio_columns: &'a [String],
    mode: SubsetMode,
}

/// Runs the whole analysis on `table`.
pub fn run_study(
    table: &DataFrame,
    config: &StudyConfig,
    progress: &dyn BootstrapProgress,
) -> Result<ComparisonReport, PipelineError> {
    config.validate()?;
    data::require_columns(table, &config.required_columns())?;

    let mut table = table.clone();
    let csf_ratios = ratio::create_biomarker_ratios(
        &mut table,
        &config.csf.biomarkers,
        &config.csf.reference_protein,
        &config.ratio_suffix,
    )?;
    let plasma_ratios = ratio::create_biomarker_ratios(
        &mut table,
        &config.plasma.biomarkers,
        &config.plasma.reference_protein,
        &config.ratio_suffix,
    )?;

    let mode = SubsetMode::from_flag(config.subset);
    log::info!(
        "Comparing {} CSF and {} plasma biomarkers over {} subjects ({mode}, {} bootstrap iterations)",
        config.csf.biomarkers.len(),
        config.plasma.biomarkers.len(),
        table.height(),
        config.n_iter
    );

    let mut seeds = StdRng::seed_from_u64(config.seed);
    let mut result_sets = Vec::with_capacity(6);
    for (panel, outcome) in StudyConfig::result_order() {
        let ratio_columns = match panel {
            Panel::Csf => &csf_ratios,
            Panel::Plasma => &plasma_ratios,
        };
        let job = SetJob {
            panel,
            outcome,
            settings: config.panel(panel),
            ratio_columns,
            mode,
        };
        result_sets.push(evaluate_set(&table, config, &job, &mut seeds, progress)?);
    }

    Ok(ComparisonReport::new(config.clone(), result_sets))
}

fn evaluate_set(
    table: &DataFrame,
    config: &StudyConfig,
    job: &SetJob<'_>,
    seeds: &mut StdRng,
    progress: &dyn BootstrapProgress,
) -> Result<ResultSet, PipelineError> {
    let outcome_column = config.outcomes.column(job.outcome);
    let mut panel_columns = job.settings.biomarkers.clone();
    panel_columns.extend(job.ratio_columns.iter().cloned());
    panel_columns.push(job.settings.reference_protein.clone());

    let subset = subset::outcome_subset(table, outcome_column, &panel_columns, job.mode)?;
    if subset.height() == 0 {
        return Err(PipelineError::EmptySubset {
            panel: job.panel,
            outcome: outcome_column.to_string(),
            mode: job.mode,
        });
    }
    log::info!(
        "{} → {}: {} subjects",
        job.panel,
        job.outcome,
        subset.height()
    );

    let outcome_values = data::column_values(&subset, outcome_column)?;
    let reference_seed = seeds.next_u64();

    let mut comparisons = Vec::with_capacity(job.settings.biomarkers.len());
    for (biomarker, ratio_column) in job.settings.biomarkers.iter().zip(job.ratio_columns) {
        let sample = PairedSample::from_columns(
            &data::column_values(&subset, biomarker)?,
            &data::column_values(&subset, ratio_column)?,
            &outcome_values,
        );
        if sample.len() < MINIMUM_PAIRED_ROWS {
            return Err(PipelineError::InsufficientRows {
                panel: job.panel,
                outcome: outcome_column.to_string(),
                predictor: biomarker.clone(),
                found: sample.len(),
                required: MINIMUM_PAIRED_ROWS,
            });
        }

        let label = format!("{biomarker} → {outcome_column}");
        comparisons.push(compare_biomarker(
            &sample,
            biomarker,
            ratio_column,
            config,
            seeds.next_u64(),
            &label,
            progress,
        ));
    }

    let adjusted = pvalue::benjamini_hochberg(
        &comparisons
            .iter()
            .map(|c| c.improvement.p_value)
            .collect::<Vec<_>>(),
    );
    for (comparison, p_fdr) in comparisons.iter_mut().zip(adjusted) {
        comparison.p_value_fdr = p_fdr;
        comparison.significance = pvalue::significance_marker(p_fdr).to_string();
        log::debug!(
            "{}: ΔR² = {:.4}, p = {:.4}, p(FDR) = {:.4}",
            comparison.biomarker,
            comparison.difference.mean,
            comparison.improvement.p_value,
            p_fdr
        );
    }

    let reference_protein = if config.include_reference_protein {
        Some(evaluate_reference(
            &subset,
            config,
            job,
            &outcome_values,
            reference_seed,
            progress,
        )?)
    } else {
        None
    };

    Ok(ResultSet {
        panel: job.panel,
        outcome: job.outcome,
        outcome_column: outcome_column.to_string(),
        subset_mode: job.mode,
        n_subjects: subset.height(),
        reference_protein,
        comparisons,
    })
}

fn compare_biomarker(
    sample: &PairedSample,
    biomarker: &str,
    ratio_column: &str,
    config: &StudyConfig,
    seed: u64,
    label: &str,
    progress: &dyn BootstrapProgress,
) -> BiomarkerComparison {
    let (raw_fit, normalized_fit) = sample.fit_full();

    progress.on_start(label, config.n_iter);
    let boot = bootstrap::bootstrap_paired(sample, config.n_iter, seed, progress);
    progress.on_finish();

    let improvement =
        pvalue::improvement_test(&boot.raw_r2, &boot.normalized_r2, config.alternative);
    let difference = pvalue::summarize(
        &pvalue::paired_differences(&boot.raw_r2, &boot.normalized_r2),
        config.ci_level,
    );

    BiomarkerComparison {
        biomarker: biomarker.to_string(),
        ratio_column: ratio_column.to_string(),
        nobs: sample.len(),
        p_value_fdr: improvement.p_value,
        significance: String::new(),
        improvement,
        difference,
        raw: VariantRecord {
            variant: Variant::Raw,
            predictor: biomarker.to_string(),
            fit: raw_fit,
            r2_summary: pvalue::summarize(&boot.raw_r2, config.ci_level),
            beta_summary: pvalue::summarize(&boot.raw_beta, config.ci_level),
            bootstrap_r2: boot.raw_r2,
            bootstrap_beta: boot.raw_beta,
        },
        normalized: VariantRecord {
            variant: Variant::Normalized,
            predictor: ratio_column.to_string(),
            fit: normalized_fit,
            r2_summary: pvalue::summarize(&boot.normalized_r2, config.ci_level),
            beta_summary: pvalue::summarize(&boot.normalized_beta, config.ci_level),
            bootstrap_r2: boot.normalized_r2,
            bootstrap_beta: boot.normalized_beta,
        },
    }
}

fn evaluate_reference(
    subset: &DataFrame,
    config: &StudyConfig,
    job: &SetJob<'_>,
    outcome_values: &[Option<f64>],
    seed: u64,
    progress: &dyn BootstrapProgress,
) -> Result<ReferenceRecord, PipelineError> {
    let reference = &job.settings.reference_protein;
    let (x, y): (Vec<f64>, Vec<f64>) = data::column_values(subset, reference)?
        .into_iter()
        .zip(outcome_values)
        .filter_map(|(x, &y)| Some((x?, y?)))
        .unzip();
    if y.len() < MINIMUM_PAIRED_ROWS {
        return Err(PipelineError::InsufficientRows {
            panel: job.panel,
            outcome: config.outcomes.column(job.outcome).to_string(),
            predictor: reference.clone(),
            found: y.len(),
            required: MINIMUM_PAIRED_ROWS,
        });
    }

    let (x, y) = (Array1::from_vec(x), Array1::from_vec(y));
    let fit = ols::fit_univariate(x.view(), y.view());

    progress.on_start(&format!("{reference} → {}", job.outcome), config.n_iter);
    let boot = bootstrap::bootstrap_single(&x, &y, config.n_iter, seed, progress);
    progress.on_finish();

    Ok(ReferenceRecord {
        predictor: reference.clone(),
        fit,
        r2_summary: pvalue::summarize(&boot.r2, config.ci_level),
        beta_summary: pvalue::summarize(&boot.beta, config.ci_level),
        bootstrap_r2: boot.r2,
        bootstrap_beta: boot.beta,
    })
}
