//! Pipeline orchestration and run lifecycle
//!
//! A run is created per (tenant, target metric, trigger) and walks the
//! stages preprocess -> fit -> decompose -> optimize -> validate. Rejected
//! validations loop back to optimization with tightened bounds under a
//! bounded retry counter stored on the run record. At most one run per
//! (tenant, target metric) is in flight at a time.
//!
//! Budgets and cancellation are cooperative: both are checked at stage
//! boundaries, so a stage that overruns its wall-clock budget fails with
//! `Timeout` once it returns rather than being pre-empted mid-flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::data::HistoricalSeries;
use crate::effects::EffectDecomposer;
use crate::error::{EngineError, Result};
use crate::fitter::RelationshipFitter;
use crate::models::ModelFamily;
use crate::monitor::{PerformanceMonitor, PerformanceSnapshot};
use crate::optimize::{Objective, OptimizerMethod, WeightOptimizer};
use crate::preprocess::DataPreprocessor;
use crate::store::{BundleKey, BundleQuery, BundleState, BundleStore};
use crate::validate::{Verdict, WeightValidator};

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunTrigger {
    Manual,
    /// Spawned by the performance monitor; the only automatic path
    Drift,
    Scheduled,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Pending,
    Preprocessing,
    Fitting,
    Decomposing,
    Optimizing,
    Validating,
    Finished,
}

impl RunStage {
    fn name(&self) -> &'static str {
        match self {
            RunStage::Pending => "pending",
            RunStage::Preprocessing => "preprocessing",
            RunStage::Fitting => "fitting",
            RunStage::Decomposing => "decomposing",
            RunStage::Optimizing => "optimizing",
            RunStage::Validating => "validating",
            RunStage::Finished => "finished",
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// A validated bundle was published under this version id
    Accepted { version_id: u64 },
    /// Validation was inconclusive; surfaced for review, not auto-retried
    Inconclusive,
    /// Re-optimization retries exhausted
    Stale,
    /// A stage failed; the reason is the error text
    Failed { reason: String },
}

/// Record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: u64,
    pub tenant_id: String,
    pub target_metric: String,
    pub trigger: RunTrigger,
    pub stage: RunStage,
    /// Re-optimization attempts consumed after rejected validations
    pub retries: usize,
    /// True when the published weights came from a non-converged solve
    pub degraded: bool,
    pub outcome: Option<RunOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Event emitted when a run reaches a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: u64,
    pub tenant_id: String,
    pub target_metric: String,
    pub outcome: RunOutcome,
}

/// Cooperative cancellation flag, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one monitoring cycle, including any auto-triggered run
#[derive(Debug)]
pub struct MonitorReport {
    pub snapshot: PerformanceSnapshot,
    pub retrain_run: Option<RunRecord>,
}

type Observer = Box<dyn Fn(RunEvent) + Send + Sync>;

/// The engine: owns the store, the worker pool, and the run guard
pub struct AttributionEngine {
    config: EngineConfig,
    store: Arc<BundleStore>,
    monitor: PerformanceMonitor,
    active_runs: Mutex<HashSet<BundleKey>>,
    next_run_id: AtomicU64,
    pool: rayon::ThreadPool,
    observer: Mutex<Option<Observer>>,
}

impl AttributionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pipeline.workers)
            .build()
            .map_err(|e| EngineError::InvalidParameter(format!("worker pool: {}", e)))?;
        let monitor = PerformanceMonitor::new(config.monitor.clone());
        Ok(Self {
            config,
            store: Arc::new(BundleStore::new()),
            monitor,
            active_runs: Mutex::new(HashSet::new()),
            next_run_id: AtomicU64::new(0),
            pool,
            observer: Mutex::new(None),
        })
    }

    /// Register the completion observer (webhook stand-in)
    pub fn set_observer(&self, observer: impl Fn(RunEvent) + Send + Sync + 'static) {
        *self.observer.lock().expect("observer lock poisoned") = Some(Box::new(observer));
    }

    /// Query API: the active bundle's weights, effects, and latest snapshot
    pub fn query(&self, tenant_id: &str, target_metric: &str) -> Option<BundleQuery> {
        self.store
            .query(&BundleKey::new(tenant_id, target_metric))
    }

    pub fn store(&self) -> &BundleStore {
        &self.store
    }

    /// Trigger API: run the full pipeline for a tenant's series
    pub fn trigger_run(
        &self,
        series: &[HistoricalSeries],
        target_metric: &str,
        families: &[ModelFamily],
        objective: Objective,
        method: OptimizerMethod,
        trigger: RunTrigger,
    ) -> Result<RunRecord> {
        self.trigger_run_cancellable(
            series,
            target_metric,
            families,
            objective,
            method,
            trigger,
            &CancellationToken::new(),
        )
    }

    /// As [`trigger_run`](Self::trigger_run), with a cancellation token the
    /// caller can flip between stages
    #[allow(clippy::too_many_arguments)]
    pub fn trigger_run_cancellable(
        &self,
        series: &[HistoricalSeries],
        target_metric: &str,
        families: &[ModelFamily],
        objective: Objective,
        method: OptimizerMethod,
        trigger: RunTrigger,
        token: &CancellationToken,
    ) -> Result<RunRecord> {
        let tenant_id = series
            .first()
            .map(|s| s.tenant_id.clone())
            .ok_or_else(|| EngineError::DataError("no series supplied".to_string()))?;
        let key = BundleKey::new(tenant_id.clone(), target_metric);

        // One active run per (tenant, target metric); concurrent triggers
        // are rejected rather than raced
        {
            let mut active = self.active_runs.lock().expect("run guard lock poisoned");
            if !active.insert(key.clone()) {
                return Err(EngineError::RunInProgress {
                    tenant_id,
                    metric: target_metric.to_string(),
                });
            }
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut record = RunRecord {
            run_id,
            tenant_id,
            target_metric: target_metric.to_string(),
            trigger,
            stage: RunStage::Pending,
            retries: 0,
            degraded: false,
            outcome: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        info!(run_id, target_metric, ?trigger, "pipeline run started");

        let result = self.execute(series, target_metric, families, objective, method, token, &mut record, &key);
        match result {
            Ok(outcome) => record.outcome = Some(outcome),
            Err(e) => {
                warn!(run_id, error = %e, "pipeline run failed");
                record.outcome = Some(RunOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        }
        record.stage = RunStage::Finished;
        record.finished_at = Some(Utc::now());

        self.active_runs
            .lock()
            .expect("run guard lock poisoned")
            .remove(&key);

        if let Some(observer) = self
            .observer
            .lock()
            .expect("observer lock poisoned")
            .as_ref()
        {
            observer(RunEvent {
                run_id: record.run_id,
                tenant_id: record.tenant_id.clone(),
                target_metric: record.target_metric.clone(),
                outcome: record
                    .outcome
                    .clone()
                    .unwrap_or(RunOutcome::Failed {
                        reason: "missing outcome".to_string(),
                    }),
            });
        }
        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        series: &[HistoricalSeries],
        target_metric: &str,
        families: &[ModelFamily],
        objective: Objective,
        method: OptimizerMethod,
        token: &CancellationToken,
        record: &mut RunRecord,
        key: &BundleKey,
    ) -> Result<RunOutcome> {
        let run_deadline = Instant::now()
            + Duration::from_secs(self.config.pipeline.run_budget_secs);
        let stage_budget = Duration::from_secs(self.config.pipeline.stage_budget_secs);

        let guard = |stage: RunStage, started: Instant| -> Result<()> {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled(stage.name().to_string()));
            }
            let elapsed = started.elapsed();
            if elapsed > stage_budget || Instant::now() > run_deadline {
                return Err(EngineError::Timeout {
                    stage: stage.name().to_string(),
                    elapsed_secs: elapsed.as_secs_f64(),
                    budget_secs: self.config.pipeline.stage_budget_secs,
                });
            }
            Ok(())
        };

        // Preprocess
        record.stage = RunStage::Preprocessing;
        let stage_start = Instant::now();
        let preprocessor = DataPreprocessor::new(self.config.preprocess.clone());
        let dataset = preprocessor.clean(series)?;
        guard(RunStage::Preprocessing, stage_start)?;

        // Fit candidates on the bounded worker pool
        record.stage = RunStage::Fitting;
        let stage_start = Instant::now();
        let fitter = RelationshipFitter::new(self.config.fitter.clone());
        let outcome = self
            .pool
            .install(|| fitter.fit(&dataset, target_metric, families))?;
        guard(RunStage::Fitting, stage_start)?;

        // Decompose effects
        record.stage = RunStage::Decomposing;
        let stage_start = Instant::now();
        let decomposer = EffectDecomposer::new(self.config.effects.clone());
        let effects = self
            .pool
            .install(|| decomposer.decompose(&outcome, &dataset, target_metric))?;
        guard(RunStage::Decomposing, stage_start)?;

        // Optimize and validate, with bounded re-optimization on rejection
        let optimizer = WeightOptimizer::new(self.config.optimizer.clone());
        let validator = WeightValidator::new(self.config.validator.clone());
        let factors = outcome.selected().feature_names.clone();
        let mut bounds = optimizer.default_bounds();
        let mut warm_start: Option<Vec<f64>> = None;

        loop {
            record.stage = RunStage::Optimizing;
            let stage_start = Instant::now();
            let weight_set = self.pool.install(|| {
                optimizer.optimize(
                    &dataset,
                    target_metric,
                    &factors,
                    objective,
                    method,
                    bounds,
                    warm_start.as_deref(),
                )
            })?;
            record.degraded = !weight_set.success;
            guard(RunStage::Optimizing, stage_start)?;

            record.stage = RunStage::Validating;
            let stage_start = Instant::now();
            let validation = self
                .pool
                .install(|| validator.validate(&weight_set, &dataset, target_metric, bounds))?;
            guard(RunStage::Validating, stage_start)?;

            match validation.verdict {
                Verdict::Accepted => {
                    let normalization = dataset
                        .metrics
                        .iter()
                        .cloned()
                        .zip(dataset.normalization.iter().copied())
                        .collect();
                    let version_id = self.store.publish(
                        key.clone(),
                        outcome.selected().clone(),
                        effects,
                        weight_set,
                        validation,
                        normalization,
                        outcome.artifact.clone(),
                    );
                    info!(
                        run_id = record.run_id,
                        version_id, "validated bundle published"
                    );
                    return Ok(RunOutcome::Accepted { version_id });
                }
                Verdict::Inconclusive => {
                    warn!(
                        run_id = record.run_id,
                        "validation inconclusive; flagged for review"
                    );
                    return Ok(RunOutcome::Inconclusive);
                }
                Verdict::Rejected => {
                    if record.retries >= self.config.pipeline.max_retries {
                        warn!(
                            run_id = record.run_id,
                            retries = record.retries,
                            "re-optimization retries exhausted; run is stale"
                        );
                        if self.store.state(key).is_some() {
                            self.store.set_state(key, BundleState::Stale);
                        }
                        return Ok(RunOutcome::Stale);
                    }
                    record.retries += 1;
                    bounds = bounds.tightened(factors.len(), 0.3);
                    warm_start = Some(weight_set.weight_vector(&factors));
                    info!(
                        run_id = record.run_id,
                        retry = record.retries,
                        "validation rejected; re-optimizing with tightened bounds"
                    );
                }
            }
        }
    }

    /// Run one monitoring cycle against the active bundle.
    ///
    /// `history` is the full series set including the new periods; it is the
    /// training input when drift queues an automatic retraining run. This is
    /// the only path that spawns a run without an external trigger.
    #[allow(clippy::too_many_arguments)]
    pub fn monitoring_cycle(
        &self,
        history: &[HistoricalSeries],
        new_series: &[HistoricalSeries],
        target_metric: &str,
        families: &[ModelFamily],
        objective: Objective,
        method: OptimizerMethod,
    ) -> Result<MonitorReport> {
        let tenant_id = new_series
            .first()
            .map(|s| s.tenant_id.clone())
            .ok_or_else(|| EngineError::DataError("no new series supplied".to_string()))?;
        let key = BundleKey::new(tenant_id, target_metric);
        let bundle = self.store.active_bundle(&key).ok_or_else(|| {
            EngineError::DataError(format!(
                "no active bundle for tenant '{}', metric '{}'",
                key.tenant_id, key.metric
            ))
        })?;

        let snapshot = self
            .monitor
            .evaluate_cycle(&bundle, new_series, target_metric)?;
        self.store.record_snapshot(&key, snapshot.clone());

        let mut retrain_run = None;
        if snapshot.requires_retraining {
            // The drifted bundle keeps serving; a replacement is trained and
            // only swaps in after validation accepts it
            self.store.set_state(&key, BundleState::RetrainingQueued);
            let run = self.trigger_run(
                history,
                target_metric,
                families,
                objective,
                method,
                RunTrigger::Drift,
            )?;
            if !matches!(run.outcome, Some(RunOutcome::Accepted { .. })) {
                self.store.set_state(&key, BundleState::Stale);
            }
            retrain_run = Some(run);
        }

        Ok(MonitorReport {
            snapshot,
            retrain_run,
        })
    }
}
