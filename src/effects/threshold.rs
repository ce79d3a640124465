//! Threshold detection via shallow per-factor regression trees

use crate::config::EffectConfig;
use crate::error::Result;
use crate::models::ensemble::RegressionTree;
use crate::models::FeatureMatrix;
use crate::stats;

use super::{confidence_from_p, Effect, EffectKind};

/// Detect threshold effects per factor.
///
/// Each split of a depth-3 tree fit on the single factor is a candidate
/// cutoff. A candidate is retained when both segments hold at least the
/// configured minimum points and the standardized gap between segment means
/// exceeds the configured effect size.
pub(super) fn detect(
    features: &FeatureMatrix,
    target: &[f64],
    config: &EffectConfig,
) -> Result<Vec<Effect>> {
    let target_sd = stats::std_dev(target);
    let mut effects = Vec::new();

    for (index, name) in features.names().iter().enumerate() {
        let column = features.column(index);
        let rows: Vec<Vec<f64>> = column.iter().map(|&v| vec![v]).collect();
        let tree = match RegressionTree::fit(&rows, target, 3, config.threshold_min_segment) {
            Ok(tree) => tree,
            Err(_) => continue,
        };

        let mut best: Option<Effect> = None;
        for (_, cutoff) in tree.splits() {
            let below: Vec<f64> = column
                .iter()
                .zip(target.iter())
                .filter(|(x, _)| **x <= cutoff)
                .map(|(_, y)| *y)
                .collect();
            let above: Vec<f64> = column
                .iter()
                .zip(target.iter())
                .filter(|(x, _)| **x > cutoff)
                .map(|(_, y)| *y)
                .collect();
            if below.len() < config.threshold_min_segment
                || above.len() < config.threshold_min_segment
            {
                continue;
            }

            let gap = (stats::mean(&above) - stats::mean(&below)).abs();
            let standardized_gap = if target_sd > f64::EPSILON {
                gap / target_sd
            } else {
                0.0
            };
            if standardized_gap < config.threshold_min_effect_size {
                continue;
            }

            let (_, p) = stats::welch_t_test(&below, &above)?;
            if p >= config.significance_level {
                continue;
            }

            let candidate = Effect {
                kind: EffectKind::Threshold,
                factors: vec![name.clone()],
                magnitude: standardized_gap,
                confidence: confidence_from_p(p),
                threshold: Some(cutoff),
                lag: None,
            };
            // Keep the strongest cutoff per factor
            if best
                .as_ref()
                .map_or(true, |b| candidate.magnitude > b.magnitude)
            {
                best = Some(candidate);
            }
        }
        if let Some(effect) = best {
            effects.push(effect);
        }
    }
    Ok(effects)
}
