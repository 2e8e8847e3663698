//! Reference-protein normalization.
//!
//! For every configured biomarker a new column `biomarker + suffix` is appended
//! holding `biomarker / reference` row by row. The ratio is missing whenever
//! either operand is missing or the reference value is not strictly positive.

use crate::study::data::{self, DataError};
use polars::prelude::*;
use thiserror::Error;

/// Suffix appended to a biomarker name to form its ratio column name.
pub const DEFAULT_RATIO_SUFFIX: &str = "_refprot_normalized";

#[derive(Error, Debug)]
pub enum RatioError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(
        "Cannot create ratio column '{0}': a column with that name already exists in the table."
    )]
    ColumnExists(String),
}

/// Row-wise ratio with the missing-value rules applied.
pub fn ratio_value(biomarker: Option<f64>, reference: Option<f64>) -> Option<f64> {
    match (biomarker, reference) {
        (Some(value), Some(denominator)) if denominator > 0.0 => {
            Some(value / denominator).filter(|r| r.is_finite())
        }
        _ => None,
    }
}

/// Name of the ratio column derived from `biomarker`.
pub fn ratio_column_name(biomarker: &str, suffix: &str) -> String {
    format!("{biomarker}{suffix}")
}

/// Appends one ratio column per biomarker to `df` and returns the new column
/// names in the same order as `biomarkers`. Existing columns are left untouched.
pub fn create_biomarker_ratios(
    df: &mut DataFrame,
    biomarkers: &[String],
    reference: &str,
    suffix: &str,
) -> Result<Vec<String>, RatioError> {
    let denominators = data::column_values(df, reference)?;
    let mut created = Vec::with_capacity(biomarkers.len());

    for biomarker in biomarkers {
        let name = ratio_column_name(biomarker, suffix);
        if df.get_column_index(&name).is_some() {
            return Err(RatioError::ColumnExists(name));
        }

        let numerators = data::column_values(df, biomarker)?;
        let ratios: Float64Chunked = numerators
            .iter()
            .zip(&denominators)
            .map(|(&value, &denominator)| ratio_value(value, denominator))
            .collect();
        let missing = ratios.null_count();
        df.with_column(ratios.with_name(name.as_str().into()).into_series())?;

        log::debug!(
            "Created '{name}' ({missing} of {} rows missing)",
            df.height()
        );
        created.push(name);
    }

    Ok(created)
}
