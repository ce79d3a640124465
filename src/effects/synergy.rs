//! Synergy detection via pairwise interaction features

use crate::config::EffectConfig;
use crate::error::Result;
use crate::models::linear::LinearSpec;
use crate::models::{FeatureMatrix, ModelSpec};
use crate::stats;

use super::{confidence_from_p, Effect, EffectKind};

/// Detect pairwise synergy effects.
///
/// Each candidate pair contributes one product column to an augmented
/// model. A pair qualifies when the interaction term's share of the
/// augmented model's coefficient magnitude exceeds the configured threshold
/// AND removing the column drops cross-validated R^2 by more than the
/// configured delta. Both guards together filter out spuriously important
/// interactions. Importance is scored on the augmented fit rather than on
/// raw forest splits so that an interaction confined to part of the window
/// is not masked by the individual factor columns.
pub(super) fn detect(
    features: &FeatureMatrix,
    target: &[f64],
    config: &EffectConfig,
) -> Result<Vec<Effect>> {
    let n_base = features.n_features();
    if n_base < 2 {
        return Ok(Vec::new());
    }

    let folds = stats::kfold_indices(target.len(), 5);
    let base_cv = cv_r2(features, target, &folds);
    let base_residuals = linear_residuals(features, target);

    let mut effects = Vec::new();
    for i in 0..n_base {
        for j in (i + 1)..n_base {
            let mut names = features.names().to_vec();
            names.push(format!("{}*{}", features.names()[i], features.names()[j]));
            let rows: Vec<Vec<f64>> = features
                .rows()
                .iter()
                .map(|row| {
                    let mut augmented_row = row.clone();
                    augmented_row.push(row[i] * row[j]);
                    augmented_row
                })
                .collect();
            let augmented = FeatureMatrix::new(names, rows)?;

            // A collinear augmented design carries no synergy evidence
            let spec = LinearSpec::new(1)?;
            let trained = match spec.fit(&augmented, target) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let importance = trained
                .feature_importance()
                .and_then(|shares| shares.last().copied())
                .unwrap_or(0.0);
            if importance < config.synergy_importance_threshold {
                continue;
            }

            let aug_cv = cv_r2(&augmented, target, &folds);
            if aug_cv - base_cv < config.synergy_min_r2_delta {
                continue;
            }

            // Confidence from the interaction's correlation with the linear
            // model's residual: what the additive fit cannot explain
            let interaction = augmented.column(n_base);
            let r = stats::pearson(&interaction, &base_residuals);
            let p = stats::correlation_p_value(r, target.len());

            effects.push(Effect {
                kind: EffectKind::Synergy,
                factors: vec![
                    features.names()[i].clone(),
                    features.names()[j].clone(),
                ],
                magnitude: importance,
                confidence: confidence_from_p(p),
                threshold: None,
                lag: None,
            });
        }
    }
    Ok(effects)
}

fn cv_r2(
    features: &FeatureMatrix,
    target: &[f64],
    folds: &[(Vec<usize>, Vec<usize>)],
) -> f64 {
    let spec = match LinearSpec::new(1) {
        Ok(s) => s,
        Err(_) => return f64::NEG_INFINITY,
    };
    let mut scores = Vec::with_capacity(folds.len());
    for (train_idx, test_idx) in folds {
        let train_features = features.select_rows(train_idx);
        let train_target: Vec<f64> = train_idx.iter().map(|&i| target[i]).collect();
        let test_features = features.select_rows(test_idx);
        let test_target: Vec<f64> = test_idx.iter().map(|&i| target[i]).collect();
        if let Ok(model) = spec.fit(&train_features, &train_target) {
            if let Ok(pred) = model.predict(&test_features) {
                scores.push(stats::r_squared(&test_target, &pred));
            }
        }
    }
    if scores.is_empty() {
        f64::NEG_INFINITY
    } else {
        stats::mean(&scores)
    }
}

/// Residuals of the additive linear fit; zeros when the fit is singular
fn linear_residuals(features: &FeatureMatrix, target: &[f64]) -> Vec<f64> {
    let linear = match LinearSpec::new(1) {
        Ok(spec) => spec,
        Err(_) => return vec![0.0; target.len()],
    };
    match linear.fit(features, target).and_then(|m| m.predict(features)) {
        Ok(pred) => target.iter().zip(pred.iter()).map(|(a, p)| a - p).collect(),
        Err(_) => vec![0.0; target.len()],
    }
}
