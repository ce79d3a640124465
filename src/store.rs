//! Versioned bundle store
//!
//! Append-only shelves keyed by (tenant, target metric). Each shelf holds
//! every bundle version ever published plus a single active-version pointer,
//! swapped atomically under the write lock only after validation accepts.
//! Nothing is hard-deleted; superseded versions stay as history.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::NormalizationParams;
use crate::effects::EffectDecomposition;
use crate::models::{FittedModel, TrainedModel};
use crate::monitor::PerformanceSnapshot;
use crate::optimize::DynamicWeightSet;
use crate::validate::ValidationResult;

/// Identifies one (tenant, target metric) deployment slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleKey {
    pub tenant_id: String,
    pub metric: String,
}

impl BundleKey {
    pub fn new(tenant_id: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            metric: metric.into(),
        }
    }
}

/// Lifecycle state of a deployment slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleState {
    /// Serving the active version
    Active,
    /// Drift detected; a replacement run is queued but the active version
    /// keeps serving until it is superseded
    RetrainingQueued,
    /// Replacement attempts exhausted; needs manual intervention
    Stale,
}

/// One published bundle version: the fitted model, its decomposition, the
/// validated weights, and everything needed to score new observations
#[derive(Debug)]
pub struct VersionedBundle {
    pub version_id: u64,
    pub key: BundleKey,
    pub fitted: FittedModel,
    pub effects: EffectDecomposition,
    pub weights: DynamicWeightSet,
    pub validation: ValidationResult,
    /// Normalization parameters per metric, for inference-time transforms
    pub normalization: Vec<(String, NormalizationParams)>,
    /// Trained artifact of the selected model
    pub artifact: Arc<dyn TrainedModel>,
    pub created_at: DateTime<Utc>,
}

impl VersionedBundle {
    pub fn normalization_for(&self, metric: &str) -> Option<NormalizationParams> {
        self.normalization
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, params)| *params)
    }
}

/// Read-only answer for the query API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleQuery {
    pub version_id: u64,
    pub state: BundleState,
    pub weights: DynamicWeightSet,
    pub effects: EffectDecomposition,
    pub latest_snapshot: Option<PerformanceSnapshot>,
}

#[derive(Debug, Default)]
struct Shelf {
    versions: Vec<Arc<VersionedBundle>>,
    active: Option<u64>,
    state: Option<BundleState>,
    snapshots: Vec<PerformanceSnapshot>,
    next_version: u64,
}

/// Thread-safe append-only store of bundle versions
#[derive(Debug, Default)]
pub struct BundleStore {
    inner: RwLock<HashMap<BundleKey, Shelf>>,
}

impl BundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a validated bundle and atomically swap the active pointer.
    /// Returns the new version id.
    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        &self,
        key: BundleKey,
        fitted: FittedModel,
        effects: EffectDecomposition,
        weights: DynamicWeightSet,
        validation: ValidationResult,
        normalization: Vec<(String, NormalizationParams)>,
        artifact: Arc<dyn TrainedModel>,
    ) -> u64 {
        let mut inner = self.inner.write().expect("bundle store lock poisoned");
        let shelf = inner.entry(key.clone()).or_default();
        shelf.next_version += 1;
        let version_id = shelf.next_version;
        shelf.versions.push(Arc::new(VersionedBundle {
            version_id,
            key,
            fitted,
            effects,
            weights,
            validation,
            normalization,
            artifact,
            created_at: Utc::now(),
        }));
        shelf.active = Some(version_id);
        shelf.state = Some(BundleState::Active);
        version_id
    }

    /// The currently serving bundle, if any
    pub fn active_bundle(&self, key: &BundleKey) -> Option<Arc<VersionedBundle>> {
        let inner = self.inner.read().expect("bundle store lock poisoned");
        let shelf = inner.get(key)?;
        let active = shelf.active?;
        shelf
            .versions
            .iter()
            .find(|v| v.version_id == active)
            .cloned()
    }

    /// All published versions, oldest first
    pub fn history(&self, key: &BundleKey) -> Vec<Arc<VersionedBundle>> {
        let inner = self.inner.read().expect("bundle store lock poisoned");
        inner
            .get(key)
            .map(|shelf| shelf.versions.clone())
            .unwrap_or_default()
    }

    pub fn state(&self, key: &BundleKey) -> Option<BundleState> {
        let inner = self.inner.read().expect("bundle store lock poisoned");
        inner.get(key).and_then(|shelf| shelf.state)
    }

    /// Transition the slot's lifecycle state. The active pointer is not
    /// touched: drift never unseats a serving bundle.
    pub fn set_state(&self, key: &BundleKey, state: BundleState) {
        let mut inner = self.inner.write().expect("bundle store lock poisoned");
        if let Some(shelf) = inner.get_mut(key) {
            shelf.state = Some(state);
        }
    }

    pub fn record_snapshot(&self, key: &BundleKey, snapshot: PerformanceSnapshot) {
        let mut inner = self.inner.write().expect("bundle store lock poisoned");
        inner.entry(key.clone()).or_default().snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self, key: &BundleKey) -> Option<PerformanceSnapshot> {
        let inner = self.inner.read().expect("bundle store lock poisoned");
        inner.get(key).and_then(|shelf| shelf.snapshots.last().cloned())
    }

    /// Read-only view of the active bundle for the query API
    pub fn query(&self, key: &BundleKey) -> Option<BundleQuery> {
        let inner = self.inner.read().expect("bundle store lock poisoned");
        let shelf = inner.get(key)?;
        let active = shelf.active?;
        let bundle = shelf.versions.iter().find(|v| v.version_id == active)?;
        Some(BundleQuery {
            version_id: bundle.version_id,
            state: shelf.state.unwrap_or(BundleState::Active),
            weights: bundle.weights.clone(),
            effects: bundle.effects.clone(),
            latest_snapshot: shelf.snapshots.last().cloned(),
        })
    }
}
