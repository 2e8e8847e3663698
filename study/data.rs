//! # Observation Loading and Column Access
//!
//! This module is the entry point for the subject-level table. It reads a
//! delimited text file with the `polars` CSV reader, keeps only the columns the
//! study configuration names, and casts them to `Float64`.
//!
//! - Missing values: empty fields and the tokens `NA`, `NaN` and `nan` are read
//!   as null. Downstream code also treats non-finite floats as missing, so a
//!   value is "present" only when it is non-null and finite.
//! - Errors: failures are assumed to be user-input errors. `DataError` names the
//!   offending column so the message is actionable.

use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for all table loading and column access failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input table. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Input file '{0}' contains a header but no data rows.")]
    EmptyTable(String),
}

/// Field separator of the input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Separator {
    Comma,
    Tab,
}

impl Separator {
    pub fn byte(self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Tab => b'\t',
        }
    }
}

/// Loads the observation table and returns a `DataFrame` holding exactly the
/// `required` columns (deduplicated, in first-seen order) as `Float64`.
pub fn load_observations(
    path: &Path,
    separator: Separator,
    required: &[String],
) -> Result<DataFrame, DataError> {
    log::info!("Loading observations from '{}'", path.display());

    let null_tokens = NullValues::AllColumns(vec!["NA".into(), "NaN".into(), "nan".into()]);
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                // Scan every row so a column whose early values look like
                // integers still reads as float when decimals follow.
                .with_infer_schema_length(None)
                .with_parse_options(
                    CsvParseOptions::default()
                        .with_separator(separator.byte())
                        .with_null_values(Some(null_tokens)),
                ),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::EmptyTable(path.display().to_string()));
    }
    log::info!(
        "Read {} rows and {} columns",
        df.height(),
        df.width()
    );

    select_numeric(&df, required)
}

/// Validates and casts the `required` columns of an in-memory table.
/// Shared by the file loader and by callers that build tables directly.
pub fn select_numeric(df: &DataFrame, required: &[String]) -> Result<DataFrame, DataError> {
    require_columns(df, required)?;

    let mut seen = HashSet::with_capacity(required.len());
    let mut columns = Vec::with_capacity(required.len());
    for name in required {
        if !seen.insert(name.as_str()) {
            continue;
        }
        let column = df.column(name)?;
        let casted = column
            .cast(&DataType::Float64)
            .map_err(|_| wrong_type(name, column.dtype()))?;
        // A non-strict cast turns unparseable strings into nulls.
        if casted.null_count() > column.null_count() {
            return Err(wrong_type(name, column.dtype()));
        }
        columns.push(casted);
    }

    Ok(DataFrame::new(columns)?)
}

/// Fails with `ColumnNotFound` for the first name absent from `df`.
pub fn require_columns(df: &DataFrame, required: &[String]) -> Result<(), DataError> {
    let present: HashSet<&str> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    match required.iter().find(|name| !present.contains(name.as_str())) {
        Some(missing) => Err(DataError::ColumnNotFound(missing.clone())),
        None => Ok(()),
    }
}

/// Reads a numeric column as `Option<f64>` per row. Nulls and non-finite values
/// are both reported as `None`.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let column = df
        .column(name)
        .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;
    let casted = column
        .cast(&DataType::Float64)
        .map_err(|_| wrong_type(name, column.dtype()))?;
    let values = casted
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| v.is_finite()))
        .collect();
    Ok(values)
}

/// Row mask that is `true` where every listed column holds a present value.
pub fn presence_mask(df: &DataFrame, names: &[String]) -> Result<BooleanChunked, DataError> {
    let mut keep = vec![true; df.height()];
    for name in names {
        for (flag, value) in keep.iter_mut().zip(column_values(df, name)?) {
            *flag &= value.is_some();
        }
    }
    Ok(keep.into_iter().collect())
}

fn wrong_type(name: &str, dtype: &DataType) -> DataError {
    DataError::ColumnWrongType {
        column_name: name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{dtype:?}"),
    }
}
