use std::sync::Arc;

use chrono::NaiveDate;

use attribution_engine::config::{
    EffectConfig, FitterConfig, MonitorConfig, OptimizerConfig, PreprocessConfig, ValidatorConfig,
};
use attribution_engine::data::HistoricalSeries;
use attribution_engine::effects::EffectDecomposer;
use attribution_engine::error::EngineError;
use attribution_engine::fitter::RelationshipFitter;
use attribution_engine::models::ModelFamily;
use attribution_engine::monitor::PerformanceMonitor;
use attribution_engine::optimize::{Objective, OptimizerMethod, WeightBounds, WeightOptimizer};
use attribution_engine::preprocess::DataPreprocessor;
use attribution_engine::store::{BundleKey, BundleState, BundleStore, VersionedBundle};
use attribution_engine::validate::WeightValidator;

fn month(i: usize) -> NaiveDate {
    let year = 2022 + (i / 12) as i32;
    let m = (i % 12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, m, 1).unwrap()
}

fn series_at(metric: &str, start: usize, values: &[f64]) -> HistoricalSeries {
    let points = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (month(start + i), v))
        .collect();
    HistoricalSeries::new("tenant-1", metric, points).unwrap()
}

fn training_x() -> Vec<f64> {
    (0..24).map(|i| ((i * 7) % 13) as f64 + 1.0).collect()
}

fn training_target(x: &[f64]) -> Vec<f64> {
    x.iter()
        .enumerate()
        .map(|(i, &v)| 3.0 * v + ((i * 3) % 5) as f64 * 0.05)
        .collect()
}

/// Train on 24 months of target = 3 * spend and publish the bundle
fn published_bundle() -> (Arc<BundleStore>, BundleKey, Arc<VersionedBundle>) {
    let x = training_x();
    let y = training_target(&x);
    let input = vec![series_at("spend", 0, &x), series_at("revenue", 0, &y)];
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();

    let outcome = RelationshipFitter::new(FitterConfig::default())
        .fit(&dataset, "revenue", &[ModelFamily::Linear])
        .unwrap();
    let effects = EffectDecomposer::new(EffectConfig::default())
        .decompose(&outcome, &dataset, "revenue")
        .unwrap();
    let bounds = WeightBounds { min: 0.05, max: 0.95 };
    let weights = WeightOptimizer::new(OptimizerConfig::default())
        .optimize(
            &dataset,
            "revenue",
            &["spend".to_string()],
            Objective::MaximizeR2,
            OptimizerMethod::Gradient,
            bounds,
            None,
        )
        .unwrap();
    let validation = WeightValidator::new(ValidatorConfig::default())
        .validate(&weights, &dataset, "revenue", bounds)
        .unwrap();

    let normalization = dataset
        .metrics
        .iter()
        .cloned()
        .zip(dataset.normalization.iter().copied())
        .collect();

    let store = Arc::new(BundleStore::new());
    let key = BundleKey::new("tenant-1", "revenue");
    store.publish(
        key.clone(),
        outcome.selected().clone(),
        effects,
        weights,
        validation,
        normalization,
        outcome.artifact.clone(),
    );
    let bundle = store.active_bundle(&key).unwrap();
    (store, key, bundle)
}

#[test]
fn a_stable_relationship_produces_no_drift() {
    let (_, _, bundle) = published_bundle();
    let monitor = PerformanceMonitor::new(MonitorConfig::default());

    // Four new months following the trained relationship
    let new_x = vec![4.0, 9.0, 2.0, 11.0];
    let new_y: Vec<f64> = new_x.iter().map(|v| 3.0 * v + 0.1).collect();
    let new_series = vec![
        series_at("spend", 24, &new_x),
        series_at("revenue", 24, &new_y),
    ];

    let snapshot = monitor.evaluate_cycle(&bundle, &new_series, "revenue").unwrap();
    assert_eq!(snapshot.n_new_periods, 4);
    assert!(!snapshot.drift_detected, "r2 = {}, bias = {}", snapshot.r2, snapshot.bias);
    assert!(!snapshot.requires_retraining);
    assert!(snapshot.r2 > 0.9, "r2 = {}", snapshot.r2);
}

#[test]
fn a_flipped_relationship_is_flagged_as_drift() {
    let (store, key, bundle) = published_bundle();
    let monitor = PerformanceMonitor::new(MonitorConfig::default());

    // The sign of the relationship reverses
    let new_x = vec![4.0, 9.0, 2.0, 11.0];
    let new_y: Vec<f64> = new_x.iter().map(|v| 40.0 - 3.0 * v).collect();
    let new_series = vec![
        series_at("spend", 24, &new_x),
        series_at("revenue", 24, &new_y),
    ];

    let snapshot = monitor.evaluate_cycle(&bundle, &new_series, "revenue").unwrap();
    assert!(snapshot.drift_detected);
    assert!(snapshot.requires_retraining);
    assert!(snapshot.r2 < snapshot.training_r2 - 0.05);

    // Drift never unseats the serving bundle
    store.record_snapshot(&key, snapshot.clone());
    store.set_state(&key, BundleState::RetrainingQueued);
    let active = store.active_bundle(&key).unwrap();
    assert_eq!(active.version_id, bundle.version_id);
    assert_eq!(store.state(&key), Some(BundleState::RetrainingQueued));
    assert!(store.latest_snapshot(&key).unwrap().drift_detected);
}

#[test]
fn too_few_new_periods_is_an_error() {
    let (_, _, bundle) = published_bundle();
    let monitor = PerformanceMonitor::new(MonitorConfig::default());

    let new_series = vec![
        series_at("spend", 24, &[4.0, 9.0]),
        series_at("revenue", 24, &[12.1, 27.2]),
    ];

    match monitor.evaluate_cycle(&bundle, &new_series, "revenue") {
        Err(EngineError::InsufficientData { actual, required }) => {
            assert_eq!(actual, 2);
            assert_eq!(required, MonitorConfig::default().min_new_periods);
        }
        other => panic!("expected InsufficientData, got {:?}", other),
    }
}

#[test]
fn missing_factor_data_is_an_error() {
    let (_, _, bundle) = published_bundle();
    let monitor = PerformanceMonitor::new(MonitorConfig::default());

    // Only the target arrived this cycle
    let new_series = vec![series_at("revenue", 24, &[12.0, 27.0, 6.0, 33.0])];
    assert!(monitor.evaluate_cycle(&bundle, &new_series, "revenue").is_err());
}

#[test]
fn publishing_a_second_version_supersedes_the_first() {
    let (store, key, first) = published_bundle();

    let x = training_x();
    let y = training_target(&x);
    let input = vec![series_at("spend", 0, &x), series_at("revenue", 0, &y)];
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let outcome = RelationshipFitter::new(FitterConfig::default())
        .fit(&dataset, "revenue", &[ModelFamily::Linear])
        .unwrap();

    let second_id = store.publish(
        key.clone(),
        outcome.selected().clone(),
        first.effects.clone(),
        first.weights.clone(),
        first.validation.clone(),
        first.normalization.clone(),
        outcome.artifact.clone(),
    );

    assert_eq!(second_id, first.version_id + 1);
    assert_eq!(store.active_bundle(&key).unwrap().version_id, second_id);
    // History keeps the superseded version
    let history = store.history(&key);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version_id, first.version_id);
}
