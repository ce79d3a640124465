//! Effect decomposition: synergy, threshold, and lag effects
//!
//! Reads the selected fitted model and the cleaned series, and emits a list
//! of statistically backed effects. Every effect references only factor names
//! present in the fitted model's feature set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EffectConfig;
use crate::data::CleanedDataset;
use crate::error::Result;
use crate::fitter::FitterOutcome;

mod lag;
mod synergy;
mod threshold;

pub use lag::granger_p_value;

/// Effect categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    /// Super-additive interaction between two factors
    Synergy,
    /// A factor's marginal impact changes past a cutoff
    Threshold,
    /// A factor's impact arrives with a delay of whole periods
    Lag,
}

/// One detected effect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    /// Involved factor names; two for synergy, one otherwise
    pub factors: Vec<String>,
    /// Importance (synergy), standardized mean gap (threshold), or
    /// cross-correlation (lag)
    pub magnitude: f64,
    /// 1 - p of the underlying test, clamped to [0, 1]
    pub confidence: f64,
    /// Cutoff on the normalized factor scale, for threshold effects
    pub threshold: Option<f64>,
    /// Delay in periods, for lag effects
    pub lag: Option<usize>,
}

/// All effects extracted from one fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDecomposition {
    /// Label of the fitted model this was derived from
    pub model_label: String,
    pub effects: Vec<Effect>,
    pub generated_at: DateTime<Utc>,
}

impl EffectDecomposition {
    pub fn of_kind(&self, kind: EffectKind) -> Vec<&Effect> {
        self.effects.iter().filter(|e| e.kind == kind).collect()
    }
}

/// Confidence from a p-value, capped into [0, 1]
pub(crate) fn confidence_from_p(p: f64) -> f64 {
    (1.0 - p).clamp(0.0, 1.0)
}

/// Extracts synergy, threshold, and lag effects
#[derive(Debug, Clone)]
pub struct EffectDecomposer {
    config: EffectConfig,
}

impl EffectDecomposer {
    pub fn new(config: EffectConfig) -> Self {
        Self { config }
    }

    /// Decompose the selected model's relationship into tagged effects
    pub fn decompose(
        &self,
        outcome: &FitterOutcome,
        dataset: &CleanedDataset,
        target: &str,
    ) -> Result<EffectDecomposition> {
        let target_values = dataset.column(target)?;

        let mut effects = Vec::new();
        effects.extend(synergy::detect(
            &outcome.features,
            target_values,
            &self.config,
        )?);
        effects.extend(threshold::detect(
            &outcome.features,
            target_values,
            &self.config,
        )?);
        effects.extend(lag::detect(&outcome.features, target_values, &self.config)?);

        info!(
            model = %outcome.selected().label,
            n_effects = effects.len(),
            "effect decomposition complete"
        );

        Ok(EffectDecomposition {
            model_label: outcome.selected().label.clone(),
            effects,
            generated_at: Utc::now(),
        })
    }
}
