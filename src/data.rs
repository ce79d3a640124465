//! Historical series ingestion and cleaned datasets

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One observed (period, value) point of a monthly business series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// First day of the observed month
    pub period: NaiveDate,
    pub value: f64,
}

/// Raw monthly series for one (tenant, metric), append-only per period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub tenant_id: String,
    /// Metric name (a factor such as asset spend, or the target metric)
    pub metric: String,
    pub points: Vec<SeriesPoint>,
    pub unit: Option<String>,
    pub source: Option<String>,
}

impl HistoricalSeries {
    /// Create a series from (period, value) pairs; points are sorted by period
    pub fn new(
        tenant_id: impl Into<String>,
        metric: impl Into<String>,
        points: Vec<(NaiveDate, f64)>,
    ) -> Result<Self> {
        let mut points: Vec<SeriesPoint> = points
            .into_iter()
            .map(|(period, value)| SeriesPoint { period, value })
            .collect();
        points.sort_by_key(|p| p.period);
        points.dedup_by_key(|p| p.period);

        Ok(Self {
            tenant_id: tenant_id.into(),
            metric: metric.into(),
            points,
            unit: None,
            source: None,
        })
    }

    /// Append a new period. Existing periods are immutable once ingested.
    pub fn append(&mut self, period: NaiveDate, value: f64) -> Result<()> {
        if let Some(last) = self.points.last() {
            if period <= last.period {
                return Err(EngineError::DataError(format!(
                    "period {} is not after the latest ingested period {} for metric '{}'",
                    period, last.period, self.metric
                )));
            }
        }
        self.points.push(SeriesPoint { period, value });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn periods(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.period).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    tenant_id: String,
    metric: String,
    period: NaiveDate,
    value: f64,
}

/// Loader for historical series records
#[derive(Debug)]
pub struct SeriesLoader;

impl SeriesLoader {
    /// Load series from a CSV file with header `tenant_id,metric,period,value`
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<HistoricalSeries>> {
        let file = File::open(path)?;
        let mut reader = csv::Reader::from_reader(file);

        let mut grouped: BTreeMap<(String, String), Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for record in reader.deserialize() {
            let record: CsvRecord = record?;
            grouped
                .entry((record.tenant_id, record.metric))
                .or_default()
                .push((record.period, record.value));
        }

        let mut series = Vec::with_capacity(grouped.len());
        for ((tenant_id, metric), points) in grouped {
            series.push(HistoricalSeries::new(tenant_id, metric, points)?);
        }
        Ok(series)
    }
}

/// Which transform produced a cleaned value, kept per point for auditability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformTag {
    /// Observed value passed through unchanged (before normalization)
    Original,
    /// Outlier replaced by the column median
    OutlierReplaced,
    ForwardFilled,
    BackwardFilled,
    /// Gap filled with the column median
    MedianImputed,
}

/// Per-column normalization parameters, stored so inference-time inputs can
/// be transformed identically
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalizationParams {
    Standard { mean: f64, std_dev: f64 },
    MinMax { min: f64, max: f64 },
}

impl NormalizationParams {
    /// Transform a raw value into the cleaned dataset's scale
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            NormalizationParams::Standard { mean, std_dev } => {
                if std_dev > f64::EPSILON {
                    (raw - mean) / std_dev
                } else {
                    0.0
                }
            }
            NormalizationParams::MinMax { min, max } => {
                let range = max - min;
                if range > f64::EPSILON {
                    (raw - min) / range
                } else {
                    0.0
                }
            }
        }
    }

    /// Map a normalized value back to the raw scale
    pub fn invert(&self, normalized: f64) -> f64 {
        match *self {
            NormalizationParams::Standard { mean, std_dev } => normalized * std_dev + mean,
            NormalizationParams::MinMax { min, max } => normalized * (max - min) + min,
        }
    }
}

/// Cleaned, aligned, normalized dataset produced by one preprocessing run.
/// Never mutated after creation; a new run produces a new dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedDataset {
    pub tenant_id: String,
    /// Aligned period keys, ascending
    pub periods: Vec<NaiveDate>,
    /// Column names, same order as `columns`
    pub metrics: Vec<String>,
    /// Column-major normalized values, each column as long as `periods`
    pub columns: Vec<Vec<f64>>,
    /// Per column, per point: which transform touched the value
    pub transforms: Vec<Vec<TransformTag>>,
    /// Per column normalization parameters
    pub normalization: Vec<NormalizationParams>,
}

impl CleanedDataset {
    pub fn n_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn column_index(&self, metric: &str) -> Option<usize> {
        self.metrics.iter().position(|m| m == metric)
    }

    /// Normalized values for one metric
    pub fn column(&self, metric: &str) -> Result<&[f64]> {
        self.column_index(metric)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| {
                EngineError::DataError(format!("metric '{}' not present in dataset", metric))
            })
    }

    /// Normalization parameters for one metric
    pub fn normalization_for(&self, metric: &str) -> Result<NormalizationParams> {
        self.column_index(metric)
            .map(|i| self.normalization[i])
            .ok_or_else(|| {
                EngineError::DataError(format!("metric '{}' not present in dataset", metric))
            })
    }

    /// All metric names except the given target, in dataset order
    pub fn factor_names(&self, target: &str) -> Vec<String> {
        self.metrics
            .iter()
            .filter(|m| m.as_str() != target)
            .cloned()
            .collect()
    }

    /// Training window covered by the aligned periods
    pub fn window(&self) -> Result<(NaiveDate, NaiveDate)> {
        match (self.periods.first(), self.periods.last()) {
            (Some(&first), Some(&last)) => Ok((first, last)),
            _ => Err(EngineError::DataError("dataset has no periods".to_string())),
        }
    }

    /// Normalize a raw inference-time value with the stored parameters
    pub fn normalize_value(&self, metric: &str, raw: f64) -> Result<f64> {
        Ok(self.normalization_for(metric)?.apply(raw))
    }
}
