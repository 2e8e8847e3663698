//! Empirical p-values, Benjamini–Hochberg adjustment and bootstrap summaries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Direction of the improvement hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    /// The normalized variant explains more outcome variance than the raw one.
    #[default]
    Greater,
    /// The variants differ in either direction.
    TwoSided,
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Greater => "greater",
            Self::TwoSided => "two-sided",
        })
    }
}

/// Outcome of the bootstrap test for R² improvement of one biomarker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImprovementTest {
    pub alternative: Alternative,
    pub p_value: f64,
    /// Iterations where both R² values were finite.
    pub n_effective: usize,
    /// Iterations dropped because a resample was degenerate.
    pub n_excluded: usize,
}

/// Per-iteration `normalized - raw` differences, keeping only iterations where
/// both values are finite.
pub fn paired_differences(raw: &[f64], normalized: &[f64]) -> Vec<f64> {
    raw.iter()
        .zip(normalized)
        .filter(|(r, n)| r.is_finite() && n.is_finite())
        .map(|(r, n)| n - r)
        .collect()
}

/// Empirical p-value for the normalized variant improving R² over the raw one.
///
/// `p = (#{d ≤ 0} + 1) / (n_eff + 1)` for `Greater`; for `TwoSided` the smaller
/// tail is doubled and capped at one. The `+1` terms keep `p` strictly positive.
pub fn improvement_test(raw: &[f64], normalized: &[f64], alternative: Alternative) -> ImprovementTest {
    let differences = paired_differences(raw, normalized);
    let n_effective = differences.len();
    let n_excluded = raw.len().min(normalized.len()) - n_effective;
    if n_excluded > 0 {
        log::warn!("Excluded {n_excluded} degenerate bootstrap iterations from the p-value");
    }

    let denominator = (n_effective + 1) as f64;
    let not_better = differences.iter().filter(|&&d| d <= 0.0).count();
    let p_greater = (not_better + 1) as f64 / denominator;

    let p_value = match alternative {
        Alternative::Greater => p_greater,
        Alternative::TwoSided => {
            let not_worse = differences.iter().filter(|&&d| d >= 0.0).count();
            let p_less = (not_worse + 1) as f64 / denominator;
            (2.0 * p_greater.min(p_less)).min(1.0)
        }
    };

    ImprovementTest {
        alternative,
        p_value,
        n_effective,
        n_excluded,
    }
}

/// Benjamini–Hochberg adjusted p-values, returned in input order.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for (rank, &index) in order.iter().enumerate().rev() {
        let scaled = p_values[index] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(scaled);
        adjusted[index] = running_min;
    }
    adjusted
}

/// Conventional star marker for an adjusted p-value.
pub fn significance_marker(p_value: f64) -> &'static str {
    if p_value < 0.001 {
        "***"
    } else if p_value < 0.01 {
        "**"
    } else if p_value < 0.05 {
        "*"
    } else {
        ""
    }
}

/// Mean and percentile interval of a bootstrap distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub mean: f64,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub lower: f64,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub upper: f64,
    pub n_finite: usize,
}

/// Summarizes the finite values of `values`. The bounds are the sorted values at
/// positions `floor(q * n)` with `q = (1 - level) / 2` and `1 - q`.
pub fn summarize(values: &[f64], level: f64) -> BootstrapSummary {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n == 0 {
        return BootstrapSummary {
            mean: f64::NAN,
            lower: f64::NAN,
            upper: f64::NAN,
            n_finite: 0,
        };
    }
    finite.sort_by(f64::total_cmp);

    let tail = (1.0 - level) / 2.0;
    // Nudge before flooring so 0.05 * 100 lands on 5 despite `(1 - 0.9) / 2` rounding low.
    let position = |q: f64| ((q * n as f64 + 1e-9).floor() as usize).min(n - 1);
    BootstrapSummary {
        mean: finite.iter().sum::<f64>() / n as f64,
        lower: finite[position(tail)],
        upper: finite[position(1.0 - tail)],
        n_finite: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_p_value_counts_iterations_without_improvement() {
        let raw = [0.2, 0.2, 0.2, 0.2];
        let normalized = [0.3, 0.1, 0.25, 0.2];
        let test = improvement_test(&raw, &normalized, Alternative::Greater);
        // d = [0.1, -0.1, 0.05, 0.0]: two iterations with d <= 0.
        assert_abs_diff_eq!(test.p_value, 3.0 / 5.0, epsilon = 1e-12);
        assert_eq!(test.n_effective, 4);
        assert_eq!(test.n_excluded, 0);
    }

    #[test]
    fn test_p_value_stays_in_unit_interval() {
        let raw = vec![0.5; 100];
        let never_better = vec![0.1; 100];
        let always_better = vec![0.9; 100];
        for normalized in [&never_better, &always_better] {
            for alternative in [Alternative::Greater, Alternative::TwoSided] {
                let p = improvement_test(&raw, normalized, alternative).p_value;
                assert!(p > 0.0 && p <= 1.0, "p = {p}");
            }
        }
        let never = improvement_test(&raw, &never_better, Alternative::Greater);
        assert_abs_diff_eq!(never.p_value, 1.0, epsilon = 1e-12);
        let always = improvement_test(&raw, &always_better, Alternative::Greater);
        assert_abs_diff_eq!(always.p_value, 1.0 / 101.0, epsilon = 1e-12);
    }

    #[test]
    fn test_two_sided_doubles_smaller_tail() {
        let raw = vec![0.0; 9];
        let normalized = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0];
        let test = improvement_test(&raw, &normalized, Alternative::TwoSided);
        // p_greater = 3/10, p_less = 8/10.
        assert_abs_diff_eq!(test.p_value, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_iterations_are_excluded_and_counted() {
        let raw = [0.1, f64::NAN, 0.1, 0.1];
        let normalized = [0.2, 0.2, f64::NAN, 0.0];
        let test = improvement_test(&raw, &normalized, Alternative::Greater);
        assert_eq!(test.n_effective, 2);
        assert_eq!(test.n_excluded, 2);
        assert_abs_diff_eq!(test.p_value, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_degenerate_iterations_give_p_of_one() {
        let raw = [f64::NAN; 5];
        let test = improvement_test(&raw, &raw, Alternative::Greater);
        assert_eq!(test.n_effective, 0);
        assert_abs_diff_eq!(test.p_value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_benjamini_hochberg_known_values() {
        let p = [0.01, 0.04, 0.03, 0.20];
        let adjusted = benjamini_hochberg(&p);
        let expected = [0.04, 0.04 * 4.0 / 3.0, 0.04 * 4.0 / 3.0, 0.20];
        for (a, e) in adjusted.iter().zip(expected) {
            assert_abs_diff_eq!(*a, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_benjamini_hochberg_is_conservative_and_order_preserving() {
        let p = [0.5, 0.001, 0.02, 0.8, 0.02, 0.3, 0.049];
        let adjusted = benjamini_hochberg(&p);
        for (raw, adj) in p.iter().zip(&adjusted) {
            assert!(adj >= raw);
            assert!(*adj <= 1.0);
        }
        for i in 0..p.len() {
            for j in 0..p.len() {
                if p[i] < p[j] {
                    assert!(adjusted[i] <= adjusted[j]);
                }
            }
        }
    }

    #[test]
    fn test_benjamini_hochberg_handles_empty_and_single() {
        assert!(benjamini_hochberg(&[]).is_empty());
        assert_eq!(benjamini_hochberg(&[0.3]), vec![0.3]);
    }

    #[test]
    fn test_significance_markers() {
        assert_eq!(significance_marker(0.0005), "***");
        assert_eq!(significance_marker(0.005), "**");
        assert_eq!(significance_marker(0.03), "*");
        assert_eq!(significance_marker(0.05), "");
    }

    #[test]
    fn test_summary_uses_floor_percentile_positions() {
        let values: Vec<f64> = (0..100).rev().map(f64::from).collect();
        let summary = summarize(&values, 0.90);
        assert_eq!(summary.n_finite, 100);
        assert_abs_diff_eq!(summary.mean, 49.5, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.lower, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.upper, 95.0, epsilon = 1e-12);
    }

    #[test]
    fn test_summary_ignores_nan_and_handles_empty() {
        let summary = summarize(&[1.0, f64::NAN, 3.0], 0.5);
        assert_eq!(summary.n_finite, 2);
        assert_abs_diff_eq!(summary.mean, 2.0, epsilon = 1e-12);
        assert!(summarize(&[f64::NAN], 0.9).mean.is_nan());
    }
}
