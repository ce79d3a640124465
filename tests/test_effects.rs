use chrono::NaiveDate;

use attribution_engine::config::{EffectConfig, FitterConfig, PreprocessConfig};
use attribution_engine::data::HistoricalSeries;
use attribution_engine::effects::{EffectDecomposer, EffectKind};
use attribution_engine::fitter::RelationshipFitter;
use attribution_engine::models::ModelFamily;
use attribution_engine::preprocess::DataPreprocessor;

fn month(i: usize) -> NaiveDate {
    let year = 2022 + (i / 12) as i32;
    let m = (i % 12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, m, 1).unwrap()
}

fn series(metric: &str, values: &[f64]) -> HistoricalSeries {
    let points = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (month(i), v))
        .collect();
    HistoricalSeries::new("tenant-1", metric, points).unwrap()
}

fn decompose(
    input: Vec<HistoricalSeries>,
    target: &str,
) -> attribution_engine::effects::EffectDecomposition {
    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let outcome = RelationshipFitter::new(FitterConfig::default())
        .fit(&dataset, target, &[ModelFamily::Linear])
        .unwrap();
    EffectDecomposer::new(EffectConfig::default())
        .decompose(&outcome, &dataset, target)
        .unwrap()
}

#[test]
fn strong_interaction_is_reported_as_a_synergy_effect() {
    // target = x1 + x2 + 0.8 * x1 * x2, no additive model explains it
    let x1: Vec<f64> = (0..24).map(|i| ((i * 7) % 12) as f64).collect();
    let x2: Vec<f64> = (0..24).map(|i| ((i * 5) % 11) as f64).collect();
    let target: Vec<f64> = (0..24)
        .map(|i| x1[i] + x2[i] + 0.8 * x1[i] * x2[i])
        .collect();
    let input = vec![
        series("brand", &x1),
        series("reach", &x2),
        series("revenue", &target),
    ];

    let decomposition = decompose(input, "revenue");
    let synergies = decomposition.of_kind(EffectKind::Synergy);
    assert!(!synergies.is_empty(), "expected at least one synergy effect");

    let effect = synergies[0];
    assert_eq!(effect.factors.len(), 2);
    assert!(effect.factors.contains(&"brand".to_string()));
    assert!(effect.factors.contains(&"reach".to_string()));
    assert!(effect.confidence > 0.5, "confidence = {}", effect.confidence);
    assert!(effect.threshold.is_none());
    assert!(effect.lag.is_none());
}

#[test]
fn a_late_onset_interaction_is_still_a_synergy_effect() {
    // The interaction contributes only in the back half of the window
    let x1: Vec<f64> = (0..12).map(|i| i as f64 + 1.0).collect();
    let x2 = vec![7.0, 3.0, 11.0, 1.0, 9.0, 5.0, 12.0, 2.0, 8.0, 4.0, 10.0, 6.0];
    let target: Vec<f64> = (0..12)
        .map(|i| {
            let noise = ((i * 37) % 11) as f64 * 0.02 - 0.1;
            let base = 2.0 * x1[i] + 3.0 * x2[i] + noise;
            if i >= 6 {
                base + 5.0 * x1[i] * x2[i]
            } else {
                base
            }
        })
        .collect();
    let input = vec![
        series("brand", &x1),
        series("reach", &x2),
        series("revenue", &target),
    ];

    let decomposition = decompose(input, "revenue");
    let synergies = decomposition.of_kind(EffectKind::Synergy);
    assert!(!synergies.is_empty(), "expected a synergy effect");

    let effect = synergies[0];
    assert!(effect.factors.contains(&"brand".to_string()));
    assert!(effect.factors.contains(&"reach".to_string()));
    assert!(effect.confidence > 0.5, "confidence = {}", effect.confidence);
}

#[test]
fn a_single_factor_admits_no_synergy() {
    let x: Vec<f64> = (0..24).map(|i| ((i * 7) % 12) as f64).collect();
    let target: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
    let input = vec![series("brand", &x), series("revenue", &target)];

    let decomposition = decompose(input, "revenue");
    assert!(decomposition.of_kind(EffectKind::Synergy).is_empty());
}

#[test]
fn step_change_is_reported_as_a_threshold_effect() {
    // Marginal impact jumps once spend passes the halfway point
    let x: Vec<f64> = (0..20).map(|i| i as f64 + 1.0).collect();
    let target: Vec<f64> = x
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let wiggle = ((i * 3) % 5) as f64 * 0.1;
            if v <= 10.0 {
                5.0 + wiggle
            } else {
                25.0 + wiggle
            }
        })
        .collect();
    let input = vec![series("spend", &x), series("revenue", &target)];

    let decomposition = decompose(input, "revenue");
    let thresholds = decomposition.of_kind(EffectKind::Threshold);
    assert!(!thresholds.is_empty(), "expected a threshold effect");

    let effect = thresholds[0];
    assert_eq!(effect.factors, vec!["spend".to_string()]);
    assert!(effect.threshold.is_some());
    assert!(effect.confidence > 0.9, "confidence = {}", effect.confidence);
    // The gap is large relative to the within-segment noise
    assert!(effect.magnitude > 1.0, "magnitude = {}", effect.magnitude);
}

#[test]
fn delayed_impact_is_reported_as_a_lag_effect() {
    // revenue reacts to spend two months later
    let x: Vec<f64> = (0..24).map(|i| ((i * 11) % 13) as f64).collect();
    let target: Vec<f64> = (0..24)
        .map(|t| {
            if t >= 2 {
                2.0 * x[t - 2] + ((t * 3) % 4) as f64 * 0.05
            } else {
                10.0
            }
        })
        .collect();
    let input = vec![series("spend", &x), series("revenue", &target)];

    let decomposition = decompose(input, "revenue");
    let lags = decomposition.of_kind(EffectKind::Lag);
    assert!(!lags.is_empty(), "expected a lag effect");

    let effect = lags[0];
    assert_eq!(effect.factors, vec!["spend".to_string()]);
    assert_eq!(effect.lag, Some(2));
    assert!(effect.magnitude.abs() > 0.8, "magnitude = {}", effect.magnitude);
}

#[test]
fn effects_only_reference_factors_from_the_fitted_model() {
    let x1: Vec<f64> = (0..24).map(|i| ((i * 7) % 12) as f64).collect();
    let x2: Vec<f64> = (0..24).map(|i| ((i * 5) % 11) as f64).collect();
    let target: Vec<f64> = (0..24)
        .map(|i| x1[i] + x2[i] + 0.8 * x1[i] * x2[i])
        .collect();
    let input = vec![
        series("brand", &x1),
        series("reach", &x2),
        series("revenue", &target),
    ];

    let dataset = DataPreprocessor::new(PreprocessConfig::default())
        .clean(&input)
        .unwrap();
    let outcome = RelationshipFitter::new(FitterConfig::default())
        .fit(&dataset, "revenue", &[ModelFamily::Linear])
        .unwrap();
    let decomposition = EffectDecomposer::new(EffectConfig::default())
        .decompose(&outcome, &dataset, "revenue")
        .unwrap();

    let known = &outcome.selected().feature_names;
    for effect in &decomposition.effects {
        for factor in &effect.factors {
            assert!(known.contains(factor), "unknown factor '{}'", factor);
        }
        assert!(effect.confidence >= 0.0 && effect.confidence <= 1.0);
    }
    assert_eq!(decomposition.model_label, outcome.selected().label);
}
