use chrono::NaiveDate;

use attribution_engine::config::{FitterConfig, PreprocessConfig};
use attribution_engine::data::HistoricalSeries;
use attribution_engine::error::EngineError;
use attribution_engine::fitter::RelationshipFitter;
use attribution_engine::models::{ModelFamily, ModelStatus};
use attribution_engine::preprocess::DataPreprocessor;

fn month(m: u32) -> NaiveDate {
    let year = 2023 + ((m - 1) / 12) as i32;
    NaiveDate::from_ymd_opt(year, (m - 1) % 12 + 1, 1).unwrap()
}

fn series(metric: &str, values: &[f64]) -> HistoricalSeries {
    let points = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (month(i as u32 + 1), v))
        .collect();
    HistoricalSeries::new("tenant-1", metric, points).unwrap()
}

const X1: [f64; 12] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
const X2: [f64; 12] = [7.0, 3.0, 11.0, 1.0, 9.0, 5.0, 12.0, 2.0, 8.0, 4.0, 10.0, 6.0];

/// 12 months where target = 2*x1 + 3*x2 + small deterministic noise
fn linear_scenario() -> Vec<HistoricalSeries> {
    let noise: Vec<f64> = (0..12).map(|i| ((i * 37) % 11) as f64 * 0.02 - 0.1).collect();
    let target: Vec<f64> = (0..12)
        .map(|i| 2.0 * X1[i] + 3.0 * X2[i] + noise[i])
        .collect();
    vec![
        series("x1", &X1),
        series("x2", &X2),
        series("revenue", &target),
    ]
}

#[test]
fn fitter_selects_a_linear_model_for_a_linear_relationship() {
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&linear_scenario())
        .unwrap();
    let fitter = RelationshipFitter::new(FitterConfig::default());

    let outcome = fitter
        .fit(
            &dataset,
            "revenue",
            &[ModelFamily::Linear, ModelFamily::Polynomial, ModelFamily::Ensemble],
        )
        .unwrap();

    let selected = outcome.selected();
    assert_eq!(selected.family, ModelFamily::Linear);
    assert!(selected.selected);
    assert!(selected.metrics.r2 > 0.99, "r2 = {}", selected.metrics.r2);
    // Exactly one candidate carries the selected flag
    let n_selected = outcome.candidates.iter().filter(|c| c.selected).count();
    assert_eq!(n_selected, 1);
}

#[test]
fn selected_model_feature_set_matches_the_factors() {
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&linear_scenario())
        .unwrap();
    let fitter = RelationshipFitter::new(FitterConfig::default());

    let outcome = fitter
        .fit(&dataset, "revenue", &[ModelFamily::Linear])
        .unwrap();
    assert_eq!(
        outcome.selected().feature_names,
        vec!["x1".to_string(), "x2".to_string()]
    );
}

#[test]
fn collinear_factors_fail_the_linear_candidate() {
    // x2 duplicates x1, so the design matrix is singular
    let target: Vec<f64> = X1.iter().map(|v| 2.0 * v).collect();
    let input = vec![
        series("x1", &X1),
        series("x2", &X1),
        series("revenue", &target),
    ];
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let fitter = RelationshipFitter::new(FitterConfig::default());

    match fitter.fit(&dataset, "revenue", &[ModelFamily::Linear]) {
        Err(EngineError::NoViableModel(_)) => {}
        other => panic!("expected NoViableModel, got {:?}", other),
    }
}

#[test]
fn failed_candidates_are_excluded_from_ranking() {
    let target: Vec<f64> = X1.iter().map(|v| 2.0 * v).collect();
    let input = vec![
        series("x1", &X1),
        series("x2", &X1),
        series("revenue", &target),
    ];
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let fitter = RelationshipFitter::new(FitterConfig::default());

    let outcome = fitter
        .fit(&dataset, "revenue", &[ModelFamily::Linear, ModelFamily::Ensemble])
        .unwrap();

    // The linear candidate failed on the singular matrix; the ensemble won
    assert_eq!(outcome.selected().family, ModelFamily::Ensemble);
    assert!(outcome
        .candidates
        .iter()
        .any(|c| c.family == ModelFamily::Linear && c.status == ModelStatus::Failed));
}

#[test]
fn time_series_families_produce_ready_candidates() {
    // 24 months of a trending series so ARIMA and VAR have room to fit
    let x: Vec<f64> = (0..24).map(|i| 5.0 + ((i * 13) % 7) as f64).collect();
    let mut y = vec![20.0];
    for t in 1..24 {
        y.push(0.6 * y[t - 1] + 0.8 * x[t - 1] + 10.0);
    }
    let input = vec![series("spend", &x), series("revenue", &y)];
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let fitter = RelationshipFitter::new(FitterConfig::default());

    let outcome = fitter
        .fit(&dataset, "revenue", &[ModelFamily::Arima, ModelFamily::Var])
        .unwrap();
    assert!(outcome
        .candidates
        .iter()
        .any(|c| c.status == ModelStatus::Ready));
    assert!(outcome.selected().status == ModelStatus::Ready);
}
