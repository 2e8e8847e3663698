//! Univariate ordinary least squares.
//!
//! Fits `y = intercept + slope * x` in closed form. R² uses the classical
//! sum-of-squares definition `1 - SS_res / SS_tot`. The standardized beta is the
//! slope obtained after z-scoring both variables, which is how biomarker effects
//! are usually reported.
//!
//! A constant predictor or a constant outcome makes the model unidentifiable.
//! Such fits never panic: they return NaN in the affected fields so a single
//! degenerate bootstrap resample cannot abort a batch.

use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Result of one univariate OLS fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub nobs: usize,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub intercept: f64,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub slope: f64,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub standardized_beta: f64,
    #[serde(deserialize_with = "crate::float_serde::f64_or_nan")]
    pub r_squared: f64,
}

impl LinearFit {
    /// Whether the fit produced a usable R².
    pub fn is_finite(&self) -> bool {
        self.r_squared.is_finite()
    }
}

fn is_constant(values: ArrayView1<f64>) -> bool {
    match values.first() {
        Some(&first) => values.iter().all(|&v| v == first),
        None => true,
    }
}

/// Fits `y` on `x`. Both views must have the same length.
pub fn fit_univariate(x: ArrayView1<f64>, y: ArrayView1<f64>) -> LinearFit {
    debug_assert_eq!(x.len(), y.len());
    let nobs = x.len();
    let (Some(mean_x), Some(mean_y)) = (x.mean(), y.mean()) else {
        return LinearFit {
            nobs,
            intercept: f64::NAN,
            slope: f64::NAN,
            standardized_beta: f64::NAN,
            r_squared: f64::NAN,
        };
    };

    let constant_x = is_constant(x);
    let constant_y = is_constant(y);
    if constant_x {
        return LinearFit {
            nobs,
            intercept: mean_y,
            slope: f64::NAN,
            standardized_beta: f64::NAN,
            r_squared: f64::NAN,
        };
    }

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if constant_y {
        return LinearFit {
            nobs,
            intercept,
            slope,
            standardized_beta: f64::NAN,
            r_squared: f64::NAN,
        };
    }

    let ss_res: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| {
            let residual = yi - (intercept + slope * xi);
            residual * residual
        })
        .sum();

    LinearFit {
        nobs,
        intercept,
        slope,
        standardized_beta: slope * (sxx / syy).sqrt(),
        r_squared: 1.0 - ss_res / syy,
    }
}

/// Fits on the rows selected by `indices` (repetition allowed).
pub fn fit_resampled(x: ArrayView1<f64>, y: ArrayView1<f64>, indices: &[usize]) -> LinearFit {
    let xs = x.select(Axis(0), indices);
    let ys = y.select(Axis(0), indices);
    fit_univariate(xs.view(), ys.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Solves the normal equations `(XᵀX) β = Xᵀy` for a design with an
    /// intercept column and computes R² from the fitted values.
    fn reference_ols(x: &Array1<f64>, y: &Array1<f64>) -> (f64, f64, f64) {
        let n = x.len();
        let mut design = Array2::<f64>::ones((n, 2));
        design.column_mut(1).assign(x);
        let xtx = design.t().dot(&design);
        let xty = design.t().dot(y);
        let det = xtx[[0, 0]] * xtx[[1, 1]] - xtx[[0, 1]] * xtx[[1, 0]];
        let b0 = (xtx[[1, 1]] * xty[0] - xtx[[0, 1]] * xty[1]) / det;
        let b1 = (xtx[[0, 0]] * xty[1] - xtx[[1, 0]] * xty[0]) / det;
        let fitted = design.dot(&array![b0, b1]);
        let mean = y.mean().unwrap();
        let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        let ss_res: f64 = y.iter().zip(&fitted).map(|(a, b)| (a - b).powi(2)).sum();
        (b0, b1, 1.0 - ss_res / ss_tot)
    }

    #[test]
    fn test_exact_line_has_unit_r_squared() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let fit = fit_univariate(x.view(), y.view());
        assert_abs_diff_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.standardized_beta, 1.0, epsilon = 1e-12);
        assert_eq!(fit.nobs, 4);
    }

    #[test]
    fn test_matches_normal_equation_solution() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let n = rng.gen_range(10..300);
            let x: Array1<f64> = (0..n).map(|_| rng.gen_range(-3.0..3.0)).collect();
            let y: Array1<f64> = x.mapv(|v| 0.4 * v + 1.5) + (0..n)
                .map(|_| rng.gen_range(-2.0..2.0))
                .collect::<Array1<f64>>();

            let fit = fit_univariate(x.view(), y.view());
            let (b0, b1, r2) = reference_ols(&x, &y);
            assert_abs_diff_eq!(fit.intercept, b0, epsilon = 1e-9);
            assert_abs_diff_eq!(fit.slope, b1, epsilon = 1e-9);
            assert_abs_diff_eq!(fit.r_squared, r2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_r_squared_is_invariant_to_standardization() {
        let x = array![0.3, 1.7, 2.2, 4.9, 5.1, 7.4];
        let y = array![10.0, 12.5, 11.0, 19.0, 18.5, 25.0];
        let raw = fit_univariate(x.view(), y.view());

        let z = |v: &Array1<f64>| {
            let mean = v.mean().unwrap();
            let sd = v.std(0.0);
            v.mapv(|e| (e - mean) / sd)
        };
        let standardized = fit_univariate(z(&x).view(), z(&y).view());
        assert_abs_diff_eq!(raw.r_squared, standardized.r_squared, epsilon = 1e-12);
        assert_abs_diff_eq!(raw.standardized_beta, standardized.slope, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_predictor_yields_nan_without_panicking() {
        let x = array![0.1, 0.1, 0.1];
        let y = array![1.0, 2.0, 3.0];
        let fit = fit_univariate(x.view(), y.view());
        assert!(fit.r_squared.is_nan());
        assert!(fit.slope.is_nan());
        assert!(!fit.is_finite());
        assert_abs_diff_eq!(fit.intercept, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_outcome_yields_nan_r_squared() {
        let x = array![1.0, 2.0, 3.0];
        let y = array![5.0, 5.0, 5.0];
        let fit = fit_univariate(x.view(), y.view());
        assert!(fit.r_squared.is_nan());
        assert_abs_diff_eq!(fit.slope, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_input_yields_nan() {
        let empty = Array1::<f64>::zeros(0);
        let fit = fit_univariate(empty.view(), empty.view());
        assert_eq!(fit.nobs, 0);
        assert!(fit.r_squared.is_nan());
    }

    #[test]
    fn test_resampled_fit_uses_selected_rows() {
        let x = array![1.0, 2.0, 3.0, 100.0];
        let y = array![2.0, 4.0, 6.0, -50.0];
        let fit = fit_resampled(x.view(), y.view(), &[0, 1, 2, 2, 1]);
        assert_eq!(fit.nobs, 5);
        assert_abs_diff_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-12);
    }
}
