//! Deployed-model performance monitoring and drift detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::data::HistoricalSeries;
use crate::error::{EngineError, Result};
use crate::models::FeatureMatrix;
use crate::stats;
use crate::store::VersionedBundle;

/// Periodic recomputation of a deployed model's accuracy on new data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub version_id: u64,
    /// Number of newly observed periods in the cycle
    pub n_new_periods: usize,
    pub r2: f64,
    pub rmse: f64,
    pub mape: f64,
    /// Mean signed prediction error
    pub bias: f64,
    /// R^2 on the training window, for comparison
    pub training_r2: f64,
    pub drift_detected: bool,
    pub requires_retraining: bool,
    pub taken_at: DateTime<Utc>,
}

/// Tracks deployed-bundle accuracy and flags drift.
///
/// Drift is a signal, not an error: a drifted bundle keeps serving until a
/// validated replacement supersedes it.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    config: MonitorConfig,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// The drift rule on its own: degradation versus training-time metrics
    pub fn is_drifted(&self, training_r2: f64, current_r2: f64, bias: f64) -> bool {
        training_r2 - current_r2 > self.config.max_r2_drop || bias.abs() > self.config.max_bias
    }

    /// Run one monitoring cycle for a deployed bundle against newly arrived
    /// raw series. Series must cover the bundle's factors and target.
    pub fn evaluate_cycle(
        &self,
        bundle: &VersionedBundle,
        new_series: &[HistoricalSeries],
        target: &str,
    ) -> Result<PerformanceSnapshot> {
        let find = |metric: &str| -> Result<&HistoricalSeries> {
            new_series
                .iter()
                .find(|s| s.metric == metric)
                .ok_or_else(|| {
                    EngineError::DataError(format!(
                        "monitoring cycle missing new data for metric '{}'",
                        metric
                    ))
                })
        };

        // Align new periods present across every needed metric
        let target_series = find(target)?;
        let mut periods: Vec<_> = target_series.periods();
        for name in &bundle.fitted.feature_names {
            let series = find(name)?;
            let available = series.periods();
            periods.retain(|p| available.contains(p));
        }
        if periods.len() < self.config.min_new_periods {
            return Err(EngineError::InsufficientData {
                actual: periods.len(),
                required: self.config.min_new_periods,
            });
        }

        // Transform new observations with the bundle's stored normalization
        let normalized_column = |metric: &str| -> Result<Vec<f64>> {
            let series = find(metric)?;
            let params = bundle.normalization_for(metric).ok_or_else(|| {
                EngineError::DataError(format!(
                    "bundle has no normalization parameters for '{}'",
                    metric
                ))
            })?;
            periods
                .iter()
                .map(|p| {
                    series
                        .points
                        .iter()
                        .find(|point| point.period == *p)
                        .map(|point| params.apply(point.value))
                        .ok_or_else(|| {
                            EngineError::DataError(format!(
                                "metric '{}' missing aligned period {}",
                                metric, p
                            ))
                        })
                })
                .collect()
        };

        let factor_columns: Vec<Vec<f64>> = bundle
            .fitted
            .feature_names
            .iter()
            .map(|name| normalized_column(name))
            .collect::<Result<_>>()?;
        let actual = normalized_column(target)?;

        let column_refs: Vec<&[f64]> = factor_columns.iter().map(|c| c.as_slice()).collect();
        let features =
            FeatureMatrix::from_columns(bundle.fitted.feature_names.clone(), &column_refs)?;
        let predicted = bundle.artifact.predict(&features)?;

        let r2 = stats::r_squared(&actual, &predicted);
        let bias = stats::mean_bias(&actual, &predicted);
        let training_r2 = bundle.fitted.metrics.r2;
        let drift_detected = self.is_drifted(training_r2, r2, bias);

        if drift_detected {
            warn!(
                version_id = bundle.version_id,
                training_r2, current_r2 = r2, bias, "drift detected on deployed bundle"
            );
        } else {
            info!(
                version_id = bundle.version_id,
                current_r2 = r2,
                "monitoring cycle: no drift"
            );
        }

        Ok(PerformanceSnapshot {
            version_id: bundle.version_id,
            n_new_periods: periods.len(),
            r2,
            rmse: stats::rmse(&actual, &predicted),
            mape: stats::mape(&actual, &predicted),
            bias,
            training_r2,
            drift_detected,
            requires_retraining: drift_detected,
            taken_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;

    #[test]
    fn drift_rule_fires_on_r2_drop_beyond_threshold() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        // 0.85 -> 0.70 exceeds the default 0.05 drop
        assert!(monitor.is_drifted(0.85, 0.70, 0.0));
        // 0.85 -> 0.82 does not
        assert!(!monitor.is_drifted(0.85, 0.82, 0.0));
    }

    #[test]
    fn drift_rule_fires_on_bias_beyond_bound() {
        let monitor = PerformanceMonitor::new(MonitorConfig::default());
        assert!(monitor.is_drifted(0.85, 0.84, 0.5));
        assert!(!monitor.is_drifted(0.85, 0.84, 0.1));
    }
}
