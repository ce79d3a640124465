//! Data preprocessing: outlier correction, imputation, normalization, alignment

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::config::{NormalizationMethod, OutlierMethod, PreprocessConfig};
use crate::data::{CleanedDataset, HistoricalSeries, NormalizationParams, TransformTag};
use crate::error::{EngineError, Result};
use crate::stats;

/// Cleans and aligns raw historical series into a [`CleanedDataset`].
///
/// Cleaning is deterministic: identical input series and config always
/// produce an identical dataset.
#[derive(Debug, Clone)]
pub struct DataPreprocessor {
    config: PreprocessConfig,
}

impl DataPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Clean a group of series for one tenant into an aligned dataset.
    ///
    /// Fails with `InsufficientData` when fewer aligned periods remain than
    /// the configured minimum.
    pub fn clean(&self, series: &[HistoricalSeries]) -> Result<CleanedDataset> {
        if series.is_empty() {
            return Err(EngineError::DataError(
                "no series supplied to preprocessor".to_string(),
            ));
        }
        let tenant_id = series[0].tenant_id.clone();
        if series.iter().any(|s| s.tenant_id != tenant_id) {
            return Err(EngineError::DataError(
                "all series in a preprocessing group must share a tenant".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for s in series {
            if !seen.insert(s.metric.as_str()) {
                return Err(EngineError::DataError(format!(
                    "duplicate series for metric '{}'",
                    s.metric
                )));
            }
        }

        // Join on period key: keep every period present in at least one
        // source; periods missing from all sources never enter the union.
        let periods: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.period))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if periods.len() < self.config.min_periods {
            return Err(EngineError::InsufficientData {
                actual: periods.len(),
                required: self.config.min_periods,
            });
        }

        let mut metrics = Vec::with_capacity(series.len());
        let mut columns = Vec::with_capacity(series.len());
        let mut transforms = Vec::with_capacity(series.len());
        let mut normalization = Vec::with_capacity(series.len());

        for s in series {
            let by_period: BTreeMap<NaiveDate, f64> =
                s.points.iter().map(|p| (p.period, p.value)).collect();
            let raw: Vec<Option<f64>> = periods.iter().map(|p| by_period.get(p).copied()).collect();

            let (mut column, mut tags) = self.correct_outliers(&raw);
            Self::impute(&mut column, &mut tags);

            let filled: Vec<f64> = column.iter().map(|v| v.expect("imputation fills every gap")).collect();
            let params = self.normalization_params(&filled);
            let normalized: Vec<f64> = filled.iter().map(|&v| params.apply(v)).collect();

            debug!(
                metric = %s.metric,
                corrected = tags.iter().filter(|t| **t != TransformTag::Original).count(),
                "cleaned series column"
            );

            metrics.push(s.metric.clone());
            columns.push(normalized);
            transforms.push(tags);
            normalization.push(params);
        }

        Ok(CleanedDataset {
            tenant_id,
            periods,
            metrics,
            columns,
            transforms,
            normalization,
        })
    }

    /// Replace outliers among observed values with the column median.
    /// Points are never dropped so period alignment is preserved.
    fn correct_outliers(
        &self,
        raw: &[Option<f64>],
    ) -> (Vec<Option<f64>>, Vec<TransformTag>) {
        let observed: Vec<f64> = raw.iter().flatten().copied().collect();
        let med = stats::median(&observed);

        let is_outlier: Box<dyn Fn(f64) -> bool> = match self.config.outlier_method {
            OutlierMethod::Iqr => {
                let q1 = stats::quantile(&observed, 0.25);
                let q3 = stats::quantile(&observed, 0.75);
                let iqr = q3 - q1;
                let lower = q1 - 1.5 * iqr;
                let upper = q3 + 1.5 * iqr;
                Box::new(move |v| v < lower || v > upper)
            }
            OutlierMethod::ZScore => {
                let m = stats::mean(&observed);
                let sd = stats::std_dev(&observed);
                Box::new(move |v| sd > f64::EPSILON && ((v - m) / sd).abs() > 3.0)
            }
        };

        let mut column = Vec::with_capacity(raw.len());
        let mut tags = Vec::with_capacity(raw.len());
        for value in raw {
            match value {
                Some(v) if is_outlier(*v) => {
                    column.push(Some(med));
                    tags.push(TransformTag::OutlierReplaced);
                }
                Some(v) => {
                    column.push(Some(*v));
                    tags.push(TransformTag::Original);
                }
                None => {
                    column.push(None);
                    tags.push(TransformTag::Original);
                }
            }
        }
        (column, tags)
    }

    /// Forward-fill, then backward-fill, then median for any remaining gap
    fn impute(column: &mut [Option<f64>], tags: &mut [TransformTag]) {
        let mut last = None;
        for i in 0..column.len() {
            match column[i] {
                Some(v) => last = Some(v),
                None => {
                    if let Some(v) = last {
                        column[i] = Some(v);
                        tags[i] = TransformTag::ForwardFilled;
                    }
                }
            }
        }

        let mut next = None;
        for i in (0..column.len()).rev() {
            match column[i] {
                Some(v) if tags[i] != TransformTag::ForwardFilled => next = Some(v),
                Some(_) => {}
                None => {
                    if let Some(v) = next {
                        column[i] = Some(v);
                        tags[i] = TransformTag::BackwardFilled;
                    }
                }
            }
        }

        let observed: Vec<f64> = column
            .iter()
            .zip(tags.iter())
            .filter(|(_, t)| **t == TransformTag::Original)
            .filter_map(|(v, _)| *v)
            .collect();
        let med = stats::median(&observed);
        for i in 0..column.len() {
            if column[i].is_none() {
                column[i] = Some(med);
                tags[i] = TransformTag::MedianImputed;
            }
        }
    }

    fn normalization_params(&self, values: &[f64]) -> NormalizationParams {
        match self.config.normalization {
            NormalizationMethod::Standard => NormalizationParams::Standard {
                mean: stats::mean(values),
                std_dev: stats::std_dev(values),
            },
            NormalizationMethod::MinMax => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                NormalizationParams::MinMax { min, max }
            }
        }
    }
}
