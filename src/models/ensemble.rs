//! Bagged regression trees
//!
//! The ensemble candidate for relationship fitting, and the auxiliary model
//! the effect decomposer uses for interaction importance. The single
//! [`RegressionTree`] is also reused for threshold-effect detection.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::error::{EngineError, Result};
use crate::models::{FeatureMatrix, ModelFamily, ModelSpec, TrainedModel};
use crate::stats;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A single CART-style regression tree
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
    n_features: usize,
    /// SSE reduction attributed to each feature
    importance: Vec<f64>,
}

impl RegressionTree {
    /// Fit a tree on row-major features and an aligned target
    pub fn fit(
        rows: &[Vec<f64>],
        target: &[f64],
        max_depth: usize,
        min_samples_leaf: usize,
    ) -> Result<Self> {
        if rows.is_empty() || rows.len() != target.len() {
            return Err(EngineError::DataError(
                "tree fitting requires non-empty features matching the target".to_string(),
            ));
        }
        let n_features = rows[0].len();
        let indices: Vec<usize> = (0..rows.len()).collect();
        let mut importance = vec![0.0; n_features];
        let root = Self::grow(
            rows,
            target,
            &indices,
            max_depth,
            min_samples_leaf,
            &mut importance,
        );
        Ok(Self {
            root,
            n_features,
            importance,
        })
    }

    fn grow(
        rows: &[Vec<f64>],
        target: &[f64],
        indices: &[usize],
        depth_left: usize,
        min_samples_leaf: usize,
        importance: &mut [f64],
    ) -> Node {
        let values: Vec<f64> = indices.iter().map(|&i| target[i]).collect();
        let node_mean = stats::mean(&values);
        if depth_left == 0 || indices.len() < 2 * min_samples_leaf {
            return Node::Leaf { value: node_mean };
        }

        let node_sse: f64 = values.iter().map(|v| (v - node_mean).powi(2)).sum();
        let mut best: Option<(usize, f64, f64, Vec<usize>, Vec<usize>)> = None;

        for feature in 0..rows[indices[0]].len() {
            let mut sorted: Vec<f64> = indices.iter().map(|&i| rows[i][feature]).collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            sorted.dedup();
            for window in sorted.windows(2) {
                let threshold = (window[0] + window[1]) / 2.0;
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| rows[i][feature] <= threshold);
                if left.len() < min_samples_leaf || right.len() < min_samples_leaf {
                    continue;
                }
                let sse = segment_sse(target, &left) + segment_sse(target, &right);
                if best.as_ref().map_or(true, |(_, _, b, _, _)| sse < *b) {
                    best = Some((feature, threshold, sse, left, right));
                }
            }
        }

        match best {
            Some((feature, threshold, sse, left, right)) if sse < node_sse => {
                importance[feature] += node_sse - sse;
                let left_node = Self::grow(
                    rows,
                    target,
                    &left,
                    depth_left - 1,
                    min_samples_leaf,
                    importance,
                );
                let right_node = Self::grow(
                    rows,
                    target,
                    &right,
                    depth_left - 1,
                    min_samples_leaf,
                    importance,
                );
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(left_node),
                    right: Box::new(right_node),
                }
            }
            _ => Node::Leaf { value: node_mean },
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// Every (feature index, threshold) used by an internal node
    pub fn splits(&self) -> Vec<(usize, f64)> {
        let mut out = Vec::new();
        collect_splits(&self.root, &mut out);
        out
    }

    /// Raw per-feature SSE-reduction importance
    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn collect_splits(node: &Node, out: &mut Vec<(usize, f64)>) {
    if let Node::Split {
        feature,
        threshold,
        left,
        right,
    } = node
    {
        out.push((*feature, *threshold));
        collect_splits(left, out);
        collect_splits(right, out);
    }
}

fn segment_sse(target: &[f64], indices: &[usize]) -> f64 {
    let values: Vec<f64> = indices.iter().map(|&i| target[i]).collect();
    let m = stats::mean(&values);
    values.iter().map(|v| (v - m).powi(2)).sum()
}

/// Bagged regression tree ensemble candidate
#[derive(Debug, Clone)]
pub struct EnsembleSpec {
    n_trees: usize,
    max_depth: usize,
    seed: u64,
}

impl EnsembleSpec {
    pub fn new(n_trees: usize, max_depth: usize, seed: u64) -> Result<Self> {
        if n_trees == 0 || max_depth == 0 {
            return Err(EngineError::InvalidParameter(
                "ensemble requires at least one tree of depth at least 1".to_string(),
            ));
        }
        Ok(Self {
            n_trees,
            max_depth,
            seed,
        })
    }
}

impl ModelSpec for EnsembleSpec {
    fn family(&self) -> ModelFamily {
        ModelFamily::Ensemble
    }

    fn label(&self) -> String {
        format!("Ensemble({} trees)", self.n_trees)
    }

    fn hyperparameters(&self) -> serde_json::Value {
        json!({
            "n_trees": self.n_trees,
            "max_depth": self.max_depth,
            "seed": self.seed,
        })
    }

    fn fit(&self, features: &FeatureMatrix, target: &[f64]) -> Result<Box<dyn TrainedModel>> {
        let rows = features.rows();
        if rows.len() != target.len() || rows.is_empty() {
            return Err(EngineError::DataError(
                "ensemble fitting requires non-empty features matching the target".to_string(),
            ));
        }
        let n = rows.len();
        let mut trees = Vec::with_capacity(self.n_trees);
        for tree_index in 0..self.n_trees {
            // Bootstrap sample per tree, seeded for reproducibility
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(tree_index as u64));
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let sampled_rows: Vec<Vec<f64>> = sample.iter().map(|&i| rows[i].clone()).collect();
            let sampled_target: Vec<f64> = sample.iter().map(|&i| target[i]).collect();
            trees.push(RegressionTree::fit(
                &sampled_rows,
                &sampled_target,
                self.max_depth,
                2,
            )?);
        }
        Ok(Box::new(TrainedEnsemble {
            trees,
            n_features: features.n_features(),
        }))
    }
}

/// Fitted bagged ensemble
#[derive(Debug, Clone)]
pub struct TrainedEnsemble {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl TrainedModel for TrainedEnsemble {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
                    / self.trees.len() as f64
            })
            .collect())
    }

    fn parameter_count(&self) -> usize {
        // One effective parameter per internal split across the forest,
        // averaged per tree to keep AIC comparable with compact families
        let total_splits: usize = self.trees.iter().map(|t| t.splits().len()).sum();
        (total_splits / self.trees.len().max(1)).max(1)
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        let mut totals = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (feature, gain) in tree.importance().iter().enumerate() {
                totals[feature] += gain;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > f64::EPSILON {
            for v in &mut totals {
                *v /= sum;
            }
        }
        Some(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_splits_step_function() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let target: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();
        let tree = RegressionTree::fit(&rows, &target, 3, 2).unwrap();

        let splits = tree.splits();
        assert!(!splits.is_empty());
        // The first split should land between the two plateaus
        assert!(splits[0].1 > 8.0 && splits[0].1 < 11.0);
        assert!(tree.predict_row(&[2.0]) < 2.0);
        assert!(tree.predict_row(&[15.0]) > 4.0);
    }

    #[test]
    fn ensemble_importance_favors_informative_feature() {
        let rows: Vec<Vec<f64>> = (0..24)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64 * 0.01])
            .collect();
        let target: Vec<f64> = rows.iter().map(|r| 3.0 * r[0]).collect();
        let features =
            FeatureMatrix::new(vec!["signal".to_string(), "noise".to_string()], rows).unwrap();

        let spec = EnsembleSpec::new(10, 3, 7).unwrap();
        let trained = spec.fit(&features, &target).unwrap();
        let importance = trained.feature_importance().unwrap();
        assert!(importance[0] > 0.9);
        assert!(importance[1] < 0.1);
    }

    #[test]
    fn ensemble_is_reproducible_for_a_seed() {
        let rows: Vec<Vec<f64>> = (0..16).map(|i| vec![i as f64, (i * i) as f64]).collect();
        let target: Vec<f64> = rows.iter().map(|r| r[0] + 0.1 * r[1]).collect();
        let features =
            FeatureMatrix::new(vec!["a".to_string(), "b".to_string()], rows).unwrap();

        let spec = EnsembleSpec::new(5, 3, 99).unwrap();
        let first = spec.fit(&features, &target).unwrap().predict(&features).unwrap();
        let second = spec.fit(&features, &target).unwrap().predict(&features).unwrap();
        assert_eq!(first, second);
    }
}
