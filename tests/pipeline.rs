use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use refnorm::bootstrap::Variant;
use refnorm::ols::fit_univariate;
use refnorm::pipeline::run_study;
use refnorm::progress::NoopProgress;
use refnorm::report::ComparisonReport;
use refnorm::study::config::{Outcome, OutcomeColumns, Panel, PanelConfig, StudyConfig};
use refnorm::study::data::column_values;

const N_SUBJECTS: usize = 200;

fn normal(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()
}

/// One CSF biomarker drawn from N(0,1), a reference protein drawn independently
/// from N(0,1), and three outcomes equal to `0.5 * biomarker + noise`. The plasma
/// panel is pure noise.
fn synthetic_table(seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let biomarker = normal(&mut rng, N_SUBJECTS);
    let reference = normal(&mut rng, N_SUBJECTS);
    let plasma_biomarker = normal(&mut rng, N_SUBJECTS);
    let plasma_reference = normal(&mut rng, N_SUBJECTS);
    let mut outcome = || -> Vec<f64> {
        biomarker
            .iter()
            .map(|b| 0.5 * b + rng.sample::<f64, _>(StandardNormal))
            .collect()
    };
    let temporal = outcome();
    let cortical = outcome();
    let amyloid = outcome();

    DataFrame::new(vec![
        Column::new("csf_bm".into(), biomarker.clone()),
        Column::new("csf_ref".into(), reference),
        Column::new("plasma_bm".into(), plasma_biomarker),
        Column::new("plasma_ref".into(), plasma_reference),
        Column::new("tau_temporal".into(), temporal),
        Column::new("tau_cortical".into(), cortical),
        Column::new("amyloid".into(), amyloid),
    ])
    .unwrap()
}

fn study_config(seed: u64) -> StudyConfig {
    let mut config = StudyConfig::new(
        OutcomeColumns {
            temporal_tau: "tau_temporal".to_string(),
            cortical_tau: "tau_cortical".to_string(),
            amyloid: "amyloid".to_string(),
        },
        PanelConfig {
            biomarkers: vec!["csf_bm".to_string()],
            reference_protein: "csf_ref".to_string(),
        },
        PanelConfig {
            biomarkers: vec!["plasma_bm".to_string()],
            reference_protein: "plasma_ref".to_string(),
        },
    );
    config.n_iter = 500;
    config.subset = false;
    config.seed = seed;
    config
}

#[test]
fn uncorrelated_reference_protein_does_not_improve_prediction() {
    for seed in [11_u64, 23, 37, 41, 59] {
        let report = run_study(&synthetic_table(seed), &study_config(seed), &NoopProgress)
            .expect("pipeline run");
        assert_eq!(report.result_sets.len(), 6);

        for outcome in Outcome::ALL {
            let set = report.result_set(Panel::Csf, outcome).unwrap();
            let comparison = set.comparison("csf_bm").unwrap();
            let raw = comparison.raw.fit.r_squared;
            let normalized = comparison.normalized.fit.r_squared;

            assert!(raw > 0.0 && raw < 0.5, "seed {seed}: raw R² = {raw}");
            assert!(
                (normalized - raw).abs() <= 0.5,
                "seed {seed}: normalized R² = {normalized}, raw R² = {raw}"
            );
            assert!(
                comparison.improvement.p_value >= 0.05,
                "seed {seed}: p = {}",
                comparison.improvement.p_value
            );
            assert!(comparison.improvement.p_value > 0.0);
            assert!(comparison.improvement.p_value <= 1.0);
            assert_eq!(
                comparison.improvement.n_effective + comparison.improvement.n_excluded,
                500
            );
        }
    }
}

#[test]
fn full_data_r_squared_matches_direct_fit_on_paired_rows() {
    let df = synthetic_table(5);
    let report = run_study(&df, &study_config(5), &NoopProgress).unwrap();

    let column = |name: &str| -> Vec<f64> {
        column_values(&df, name)
            .unwrap()
            .into_iter()
            .map(|value| value.unwrap())
            .collect()
    };
    let (bm, reference, y) = (column("csf_bm"), column("csf_ref"), column("tau_temporal"));
    let rows: Vec<usize> = (0..N_SUBJECTS).filter(|&i| reference[i] > 0.0).collect();
    let x: ndarray::Array1<f64> = rows.iter().map(|&i| bm[i]).collect();
    let ratio: ndarray::Array1<f64> = rows.iter().map(|&i| bm[i] / reference[i]).collect();
    let outcome: ndarray::Array1<f64> = rows.iter().map(|&i| y[i]).collect();

    let raw = report
        .record(Panel::Csf, Outcome::TemporalTau, "csf_bm", Variant::Raw)
        .unwrap();
    let normalized = report
        .record(Panel::Csf, Outcome::TemporalTau, "csf_bm", Variant::Normalized)
        .unwrap();
    let expected_raw = fit_univariate(x.view(), outcome.view());
    let expected_normalized = fit_univariate(ratio.view(), outcome.view());

    assert_eq!(raw.fit.nobs, rows.len());
    assert_eq!(normalized.fit.nobs, rows.len());
    approx::assert_abs_diff_eq!(raw.fit.r_squared, expected_raw.r_squared, epsilon = 1e-9);
    approx::assert_abs_diff_eq!(
        normalized.fit.r_squared,
        expected_normalized.r_squared,
        epsilon = 1e-9
    );
}

#[test]
fn adjusted_p_values_dominate_raw_p_values_in_every_set() {
    let df = synthetic_table(77);
    let mut config = study_config(77);
    config.n_iter = 200;
    config.csf.biomarkers = vec!["csf_bm".to_string(), "plasma_ref".to_string()];
    config.plasma.biomarkers = vec!["plasma_bm".to_string(), "csf_ref".to_string()];
    let report = run_study(&df, &config, &NoopProgress).unwrap();

    for set in &report.result_sets {
        let mut pairs: Vec<(f64, f64)> = set
            .comparisons
            .iter()
            .map(|c| (c.improvement.p_value, c.p_value_fdr))
            .collect();
        for (raw, adjusted) in &pairs {
            assert!(adjusted >= raw);
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for window in pairs.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
    }
}

#[test]
fn json_report_with_degenerate_resamples_reads_back() {
    // Three subjects: many resamples draw a single row repeatedly.
    let df = DataFrame::new(vec![
        Column::new("csf_bm".into(), vec![1.0, 2.0, 4.0]),
        Column::new("csf_ref".into(), vec![0.5, 1.0, 1.5]),
        Column::new("plasma_bm".into(), vec![3.0, 1.0, 2.0]),
        Column::new("plasma_ref".into(), vec![1.0, 2.0, 0.5]),
        Column::new("tau_temporal".into(), vec![0.2, 0.9, 1.4]),
        Column::new("tau_cortical".into(), vec![1.1, 0.4, 0.8]),
        Column::new("amyloid".into(), vec![10.0, 35.0, 60.0]),
    ])
    .unwrap();
    let mut config = study_config(8);
    config.n_iter = 100;
    let report = run_study(&df, &config, &NoopProgress).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("comparison.json");
    report.save(&path).unwrap();
    let loaded = ComparisonReport::load(&path).expect("JSON report reads back");

    let undefined = |report: &ComparisonReport| -> usize {
        report
            .result_sets
            .iter()
            .flat_map(|set| &set.comparisons)
            .flat_map(|c| c.raw.bootstrap_r2.iter().chain(&c.normalized.bootstrap_r2))
            .filter(|v| v.is_nan())
            .count()
    };
    assert!(undefined(&report) > 0);
    assert_eq!(undefined(&loaded), undefined(&report));
    assert_eq!(
        toml::to_string(&loaded).unwrap(),
        toml::to_string(&report).unwrap()
    );
}
