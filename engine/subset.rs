//! Per-outcome subject selection.

use crate::study::data::{self, DataError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubsetError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
}

/// How subjects are selected for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubsetMode {
    /// Keep every row where the outcome is present. Sample composition may
    /// differ across outcomes and across the biomarkers being compared.
    MaximizeAvailability,
    /// Keep only rows where the outcome, the reference protein, and every raw
    /// and normalized biomarker of the panel are present.
    CommonSubset,
}

impl SubsetMode {
    pub fn from_flag(subset: bool) -> Self {
        if subset {
            Self::CommonSubset
        } else {
            Self::MaximizeAvailability
        }
    }
}

impl fmt::Display for SubsetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaximizeAvailability => "maximize availability",
            Self::CommonSubset => "common subset",
        })
    }
}

/// Filters `df` to the subjects usable for `outcome`.
///
/// `panel_columns` lists the raw biomarkers, their ratio columns and the
/// reference protein; it only matters in `CommonSubset` mode. The returned
/// frame is a fresh copy whose rows are numbered contiguously from zero.
pub fn outcome_subset(
    df: &DataFrame,
    outcome: &str,
    panel_columns: &[String],
    mode: SubsetMode,
) -> Result<DataFrame, SubsetError> {
    let mut required = vec![outcome.to_string()];
    if mode == SubsetMode::CommonSubset {
        required.extend(panel_columns.iter().cloned());
    }

    let mask = data::presence_mask(df, &required)?;
    let subset = df.filter(&mask)?;
    log::debug!(
        "Outcome '{outcome}' ({mode}): kept {} of {} rows",
        subset.height(),
        df.height()
    );
    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataFrame {
        DataFrame::new(vec![
            Column::new(
                "bm".into(),
                vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0), Some(6.0)],
            ),
            Column::new(
                "bm_ratio".into(),
                vec![Some(0.5), None, None, Some(2.0), Some(2.5), Some(3.0)],
            ),
            Column::new(
                "ref".into(),
                vec![Some(2.0), Some(2.0), Some(-1.0), Some(2.0), Some(2.0), Some(2.0)],
            ),
            Column::new(
                "tau".into(),
                vec![Some(0.1), Some(0.2), Some(0.3), None, Some(0.5), Some(0.6)],
            ),
        ])
        .unwrap()
    }

    fn panel() -> Vec<String> {
        vec!["bm".to_string(), "bm_ratio".to_string(), "ref".to_string()]
    }

    #[test]
    fn test_maximize_availability_keeps_all_rows_with_outcome() {
        let subset = outcome_subset(
            &table(),
            "tau",
            &panel(),
            SubsetMode::MaximizeAvailability,
        )
        .unwrap();
        assert_eq!(subset.height(), 5);
        assert_eq!(
            data::column_values(&subset, "tau").unwrap(),
            vec![Some(0.1), Some(0.2), Some(0.3), Some(0.5), Some(0.6)]
        );
    }

    #[test]
    fn test_common_subset_requires_every_panel_column() {
        let subset =
            outcome_subset(&table(), "tau", &panel(), SubsetMode::CommonSubset).unwrap();
        assert_eq!(subset.height(), 3);
        // Rows are renumbered: position 0..3 maps to original rows 0, 4, 5.
        assert_eq!(
            data::column_values(&subset, "bm").unwrap(),
            vec![Some(1.0), Some(5.0), Some(6.0)]
        );
    }

    #[test]
    fn test_common_subset_never_exceeds_maximize_availability() {
        let df = table();
        for outcome in ["tau", "bm", "ref"] {
            let all = outcome_subset(&df, outcome, &panel(), SubsetMode::MaximizeAvailability)
                .unwrap();
            let common =
                outcome_subset(&df, outcome, &panel(), SubsetMode::CommonSubset).unwrap();
            assert!(common.height() <= all.height());
        }
    }

    #[test]
    fn test_unknown_outcome_column_fails() {
        let err = outcome_subset(
            &table(),
            "amyloid",
            &panel(),
            SubsetMode::MaximizeAvailability,
        )
        .unwrap_err();
        assert!(matches!(err, SubsetError::Data(DataError::ColumnNotFound(_))));
    }
}
