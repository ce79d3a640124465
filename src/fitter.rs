//! Relationship fitting: candidate sweep, cross-validation, selection

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::FitterConfig;
use crate::data::CleanedDataset;
use crate::error::{EngineError, Result};
use crate::models::arima::ArimaSpec;
use crate::models::ensemble::EnsembleSpec;
use crate::models::linear::LinearSpec;
use crate::models::neural::NeuralSpec;
use crate::models::var::VarSpec;
use crate::models::{
    FeatureMatrix, FittedModel, ModelFamily, ModelMetrics, ModelSpec, ModelStatus, TrainedModel,
};
use crate::stats;

/// Lower bound on the one-standard-error band width
const CV_SE_FLOOR: f64 = 1e-3;

/// Result of one training run: every candidate's record plus the selected
/// trained artifact
#[derive(Debug)]
pub struct FitterOutcome {
    /// All candidate records, ranked best-first by cross-validated R^2
    pub candidates: Vec<FittedModel>,
    /// Index into `candidates` of the selected model
    pub selected_index: usize,
    /// Trained artifact of the selected model
    pub artifact: Arc<dyn TrainedModel>,
    /// Feature matrix the candidates were trained on
    pub features: FeatureMatrix,
}

impl FitterOutcome {
    pub fn selected(&self) -> &FittedModel {
        &self.candidates[self.selected_index]
    }
}

/// Trains candidate model families and selects one by the
/// one-standard-error rule.
#[derive(Debug, Clone)]
pub struct RelationshipFitter {
    config: FitterConfig,
}

struct CandidateFit {
    record: FittedModel,
    artifact: Option<Arc<dyn TrainedModel>>,
}

impl RelationshipFitter {
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    /// Build the fixed candidate grid for the requested families
    fn candidate_specs(&self, families: &[ModelFamily]) -> Result<Vec<Box<dyn ModelSpec>>> {
        let mut specs: Vec<Box<dyn ModelSpec>> = Vec::new();
        for family in families {
            match family {
                ModelFamily::Linear => specs.push(Box::new(LinearSpec::new(1)?)),
                ModelFamily::Polynomial => {
                    for &degree in &self.config.polynomial_degrees {
                        specs.push(Box::new(LinearSpec::new(degree)?));
                    }
                }
                ModelFamily::Ensemble => specs.push(Box::new(EnsembleSpec::new(
                    self.config.ensemble_trees,
                    self.config.ensemble_max_depth,
                    self.config.seed,
                )?)),
                ModelFamily::Neural => specs.push(Box::new(NeuralSpec::new(
                    self.config.neural_hidden,
                    self.config.neural_epochs,
                    self.config.seed,
                )?)),
                ModelFamily::Arima => {
                    for &(p, d, q) in &self.config.arima_orders {
                        specs.push(Box::new(ArimaSpec::new(p, d, q)?));
                    }
                }
                ModelFamily::Var => {
                    for &lag in &self.config.var_lags {
                        specs.push(Box::new(VarSpec::new(lag)?));
                    }
                }
            }
        }
        Ok(specs)
    }

    /// Fit and rank candidates for the target metric.
    ///
    /// Candidates are fit in parallel; call inside a bounded pool's
    /// `install` to cap the worker count. Fails with `NoViableModel` when
    /// every candidate fails.
    pub fn fit(
        &self,
        dataset: &CleanedDataset,
        target: &str,
        families: &[ModelFamily],
    ) -> Result<FitterOutcome> {
        let factor_names = dataset.factor_names(target);
        if factor_names.is_empty() {
            return Err(EngineError::DataError(
                "no factor columns besides the target".to_string(),
            ));
        }
        let factor_columns: Vec<&[f64]> = factor_names
            .iter()
            .map(|name| dataset.column(name))
            .collect::<Result<_>>()?;
        let features = FeatureMatrix::from_columns(factor_names, &factor_columns)?;
        let target_values = dataset.column(target)?.to_vec();
        let window = dataset.window()?;

        let specs = self.candidate_specs(families)?;
        if specs.is_empty() {
            return Err(EngineError::InvalidParameter(
                "no candidate model families requested".to_string(),
            ));
        }
        info!(
            target_metric = target,
            candidates = specs.len(),
            "fitting candidate models"
        );

        let folds = stats::kfold_indices(target_values.len(), self.config.cv_folds);
        let mut fits: Vec<CandidateFit> = specs
            .par_iter()
            .map(|spec| self.evaluate_candidate(spec.as_ref(), &features, &target_values, &folds, window))
            .collect();

        fits.sort_by(|a, b| {
            b.record
                .cv_r2
                .partial_cmp(&a.record.cv_r2)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = fits
            .iter()
            .find(|f| f.record.status == ModelStatus::Ready)
            .ok_or_else(|| {
                EngineError::NoViableModel(format!(
                    "all {} candidates failed for target '{}'",
                    fits.len(),
                    target
                ))
            })?;

        // One-standard-error rule: among models within one SE of the best
        // cross-validated R^2, prefer the lowest AIC. The band carries a
        // floor so candidates separated by less than the score's resolution
        // count as ties.
        let cutoff = best.record.cv_r2 - best.record.cv_r2_se.max(CV_SE_FLOOR);
        let selected_index = fits
            .iter()
            .enumerate()
            .filter(|(_, f)| f.record.status == ModelStatus::Ready && f.record.cv_r2 >= cutoff)
            .min_by(|(_, a), (_, b)| {
                a.record
                    .metrics
                    .aic
                    .partial_cmp(&b.record.metrics.aic)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);

        let artifact = fits[selected_index]
            .artifact
            .clone()
            .ok_or_else(|| EngineError::NoViableModel("selected candidate has no artifact".to_string()))?;

        let mut candidates: Vec<FittedModel> = fits.into_iter().map(|f| f.record).collect();
        candidates[selected_index].selected = true;
        info!(
            selected = %candidates[selected_index].label,
            cv_r2 = candidates[selected_index].cv_r2,
            aic = candidates[selected_index].metrics.aic,
            "selected model"
        );

        Ok(FitterOutcome {
            candidates,
            selected_index,
            artifact,
            features,
        })
    }

    fn evaluate_candidate(
        &self,
        spec: &dyn ModelSpec,
        features: &FeatureMatrix,
        target: &[f64],
        folds: &[(Vec<usize>, Vec<usize>)],
        window: (chrono::NaiveDate, chrono::NaiveDate),
    ) -> CandidateFit {
        let failed = |reason: &str| {
            warn!(candidate = %spec.label(), reason, "candidate failed");
            CandidateFit {
                record: FittedModel {
                    family: spec.family(),
                    label: spec.label(),
                    hyperparameters: spec.hyperparameters(),
                    coefficients: None,
                    feature_names: features.names().to_vec(),
                    training_window: window,
                    metrics: ModelMetrics {
                        r2: f64::NEG_INFINITY,
                        rmse: f64::INFINITY,
                        mae: f64::INFINITY,
                        aic: f64::INFINITY,
                        bic: f64::INFINITY,
                    },
                    cv_r2: f64::NEG_INFINITY,
                    cv_r2_se: 0.0,
                    status: ModelStatus::Failed,
                    selected: false,
                },
                artifact: None,
            }
        };

        // Full fit for the final artifact and in-sample metrics
        let trained = match spec.fit(features, target) {
            Ok(t) => t,
            Err(e) => return failed(&e.to_string()),
        };
        let predictions = match trained.predict(features) {
            Ok(p) => p,
            Err(e) => return failed(&e.to_string()),
        };
        let n_params = trained.parameter_count();

        // Cross-validated R^2 per fold. The information criteria are built
        // from out-of-fold residuals, so a flexible candidate cannot buy a
        // low AIC by interpolating the training rows.
        let mut fold_r2 = Vec::with_capacity(folds.len());
        let mut cv_sse = 0.0;
        let mut cv_points = 0usize;
        for (train_idx, test_idx) in folds {
            let train_features = features.select_rows(train_idx);
            let train_target: Vec<f64> = train_idx.iter().map(|&i| target[i]).collect();
            let test_features = features.select_rows(test_idx);
            let test_target: Vec<f64> = test_idx.iter().map(|&i| target[i]).collect();

            let fold_model = match spec.fit(&train_features, &train_target) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if let Ok(pred) = fold_model.predict(&test_features) {
                fold_r2.push(stats::r_squared(&test_target, &pred));
                cv_sse += test_target
                    .iter()
                    .zip(pred.iter())
                    .map(|(a, p)| (a - p).powi(2))
                    .sum::<f64>();
                cv_points += test_target.len();
            }
        }
        if fold_r2.len() < 2 {
            return failed("fewer than two cross-validation folds succeeded");
        }
        let metrics = ModelMetrics {
            r2: stats::r_squared(target, &predictions),
            rmse: stats::rmse(target, &predictions),
            mae: stats::mae(target, &predictions),
            aic: stats::aic(cv_points, cv_sse, n_params),
            bic: stats::bic(cv_points, cv_sse, n_params),
        };
        let cv_r2 = stats::mean(&fold_r2);
        let cv_r2_se = stats::std_dev(&fold_r2) / (fold_r2.len() as f64).sqrt();
        debug!(candidate = %spec.label(), cv_r2, aic = metrics.aic, "evaluated candidate");

        CandidateFit {
            record: FittedModel {
                family: spec.family(),
                label: spec.label(),
                hyperparameters: spec.hyperparameters(),
                coefficients: trained.coefficients(),
                feature_names: features.names().to_vec(),
                training_window: window,
                metrics,
                cv_r2,
                cv_r2_se,
                status: ModelStatus::Ready,
                selected: false,
            },
            artifact: Some(Arc::from(trained)),
        }
    }
}
