//! # Paired Bootstrap
//!
//! Builds empirical R² distributions by resampling subjects with replacement.
//!
//! - Pairing: in the paired bootstrap one index vector is drawn per iteration
//!   and both the raw and the normalized regression are refit on exactly those
//!   rows. Pairing, not execution order, is what makes the per-iteration R²
//!   difference meaningful.
//! - Determinism: a master `StdRng` seeded by the caller hands out one `u64`
//!   seed per iteration, in iteration order, before any work is scheduled.
//!   Iterations then run on the rayon pool and are collected back in order, so
//!   results do not depend on the number of threads.
//! - Degenerate resamples (zero variance in predictor or outcome) produce NaN
//!   R² values, which are kept in the output and filtered out later.

use crate::ols::{self, LinearFit};
use crate::progress::BootstrapProgress;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which predictor of a biomarker pair a fit uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// The biomarker as measured.
    Raw,
    /// The biomarker divided by the reference protein.
    Normalized,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Normalized => "normalized",
        })
    }
}

/// Anything that can refit both variants of a pair on a set of row positions.
pub trait PairedFitter: Sync {
    /// Number of rows available for resampling.
    fn rows(&self) -> usize;
    /// Fit of `variant` on the rows at `indices`.
    fn resampled_fit(&self, variant: Variant, indices: &[usize]) -> LinearFit;
}

/// The rows on which a raw biomarker and its normalized ratio are compared.
/// Every row has a finite raw value, ratio and outcome.
#[derive(Debug, Clone)]
pub struct PairedSample {
    pub raw: Array1<f64>,
    pub normalized: Array1<f64>,
    pub outcome: Array1<f64>,
}

/// Both variants refit on one resample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedDraw {
    pub raw: LinearFit,
    pub normalized: LinearFit,
}

/// Per-iteration R² and standardized beta of both variants, in iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedBootstrap {
    pub raw_r2: Vec<f64>,
    pub normalized_r2: Vec<f64>,
    pub raw_beta: Vec<f64>,
    pub normalized_beta: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleBootstrap {
    pub r2: Vec<f64>,
    pub beta: Vec<f64>,
}

impl PairedSample {
    /// Keeps the rows where all three values are present.
    pub fn from_columns(
        raw: &[Option<f64>],
        normalized: &[Option<f64>],
        outcome: &[Option<f64>],
    ) -> Self {
        let (mut r, mut n, mut y) = (Vec::new(), Vec::new(), Vec::new());
        for ((&a, &b), &c) in raw.iter().zip(normalized).zip(outcome) {
            if let (Some(a), Some(b), Some(c)) = (a, b, c) {
                r.push(a);
                n.push(b);
                y.push(c);
            }
        }
        Self {
            raw: Array1::from_vec(r),
            normalized: Array1::from_vec(n),
            outcome: Array1::from_vec(y),
        }
    }

    pub fn len(&self) -> usize {
        self.outcome.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcome.is_empty()
    }

    /// Full-data fits of the raw and the normalized variant.
    pub fn fit_full(&self) -> (LinearFit, LinearFit) {
        (
            ols::fit_univariate(self.raw.view(), self.outcome.view()),
            ols::fit_univariate(self.normalized.view(), self.outcome.view()),
        )
    }

    pub fn predictor(&self, variant: Variant) -> &Array1<f64> {
        match variant {
            Variant::Raw => &self.raw,
            Variant::Normalized => &self.normalized,
        }
    }
}

impl PairedFitter for PairedSample {
    fn rows(&self) -> usize {
        self.len()
    }

    fn resampled_fit(&self, variant: Variant, indices: &[usize]) -> LinearFit {
        ols::fit_resampled(self.predictor(variant).view(), self.outcome.view(), indices)
    }
}

/// Refits both variants on the same resampled rows.
pub fn paired_draw<M: PairedFitter + ?Sized>(model: &M, indices: &[usize]) -> PairedDraw {
    PairedDraw {
        raw: model.resampled_fit(Variant::Raw, indices),
        normalized: model.resampled_fit(Variant::Normalized, indices),
    }
}

/// Draws `n` row positions uniformly with replacement from `0..n`.
pub fn draw_resample<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Runs `n_iter` bootstrap iterations over a sample of `n` rows. `evaluate`
/// receives the resampled positions of one iteration.
pub fn run_iterations<T, F>(
    n: usize,
    n_iter: usize,
    seed: u64,
    progress: &dyn BootstrapProgress,
    evaluate: F,
) -> Vec<T>
where
    T: Send,
    F: Fn(&[usize]) -> T + Sync,
{
    let mut master = StdRng::seed_from_u64(seed);
    let seeds: Vec<u64> = (0..n_iter).map(|_| master.next_u64()).collect();

    seeds
        .into_par_iter()
        .map(|iteration_seed| {
            let mut rng = StdRng::seed_from_u64(iteration_seed);
            let indices = draw_resample(&mut rng, n);
            let result = evaluate(&indices);
            progress.on_advance(1);
            result
        })
        .collect()
}

/// Paired bootstrap of raw versus normalized R².
pub fn bootstrap_paired<M: PairedFitter + ?Sized>(
    model: &M,
    n_iter: usize,
    seed: u64,
    progress: &dyn BootstrapProgress,
) -> PairedBootstrap {
    let draws = run_iterations(model.rows(), n_iter, seed, progress, |indices| {
        paired_draw(model, indices)
    });
    let mut boot = PairedBootstrap {
        raw_r2: Vec::with_capacity(n_iter),
        normalized_r2: Vec::with_capacity(n_iter),
        raw_beta: Vec::with_capacity(n_iter),
        normalized_beta: Vec::with_capacity(n_iter),
    };
    for draw in draws {
        boot.raw_r2.push(draw.raw.r_squared);
        boot.normalized_r2.push(draw.normalized.r_squared);
        boot.raw_beta.push(draw.raw.standardized_beta);
        boot.normalized_beta.push(draw.normalized.standardized_beta);
    }
    boot
}

/// Bootstrap of a single predictor, keeping R² and the standardized beta.
pub fn bootstrap_single(
    x: &Array1<f64>,
    y: &Array1<f64>,
    n_iter: usize,
    seed: u64,
    progress: &dyn BootstrapProgress,
) -> SingleBootstrap {
    let fits = run_iterations(y.len(), n_iter, seed, progress, |indices| {
        ols::fit_resampled(x.view(), y.view(), indices)
    });
    let (r2, beta) = fits
        .into_iter()
        .map(|fit| (fit.r_squared, fit.standardized_beta))
        .unzip();
    SingleBootstrap { r2, beta }
}
