//! Binary-classification random forest: gini-split decision trees bagged
//! over bootstrap samples, probabilities averaged across trees.

use crate::model::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means sqrt(n_features).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    /// `(feature index, threshold)`; `None` marks a leaf.
    split: Option<(usize, f64)>,
    /// Share of class-1 samples that reached this node.
    positive_fraction: f64,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(positive_fraction: f64) -> Self {
        Self {
            split: None,
            positive_fraction,
            left: None,
            right: None,
        }
    }

    /// Walk the tree and return the leaf's positive-class fraction.
    fn proba(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match (node.split, node.left.as_deref(), node.right.as_deref()) {
                (Some((feature_idx, threshold)), Some(left), Some(right)) => {
                    node = if features[feature_idx] <= threshold {
                        left
                    } else {
                        right
                    };
                }
                _ => return node.positive_fraction,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    root: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<Tree>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Train a forest on the dataset. Deterministic for a fixed seed.
    pub fn fit(config: ForestConfig, dataset: &Dataset) -> Self {
        let n_features = dataset.n_features();
        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);

        let grown: Vec<(Tree, Vec<f64>)> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed.wrapping_add(i as u64);
                let sample = dataset.bootstrap_sample(seed);
                let mut builder = TreeBuilder {
                    dataset: &sample,
                    config: &config,
                    max_features,
                    importances: vec![0.0; n_features],
                    rng: ChaCha8Rng::seed_from_u64(seed),
                };
                let indices: Vec<usize> = (0..sample.n_samples()).collect();
                let root = builder.build(&indices, 0);
                (Tree { root }, builder.importances)
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, importances) in grown {
            for (total, part) in feature_importances.iter_mut().zip(importances) {
                *total += part;
            }
            trees.push(tree);
        }
        let sum: f64 = feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut feature_importances {
                *imp /= sum;
            }
        }

        Self {
            config,
            trees,
            feature_names: dataset.feature_names.clone(),
            feature_importances,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Mean class-1 probability across all trees.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|t| t.root.proba(features)).sum();
        total / self.trees.len() as f64
    }

    /// Hard class from the averaged probability.
    pub fn predict_class(&self, features: &[f64]) -> u8 {
        u8::from(self.predict_proba(features) >= 0.5)
    }

    pub fn accuracy(&self, dataset: &Dataset) -> f64 {
        if dataset.n_samples() == 0 {
            return 0.0;
        }
        let correct = dataset
            .features
            .iter()
            .zip(&dataset.labels)
            .filter(|(x, &label)| f64::from(self.predict_class(x)) == label.round())
            .count();
        correct as f64 / dataset.n_samples() as f64
    }

    /// `(name, importance)` pairs, most important first.
    pub fn importance_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(self.feature_importances.iter().copied())
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }
}

struct TreeBuilder<'a> {
    dataset: &'a Dataset,
    config: &'a ForestConfig,
    max_features: usize,
    importances: Vec<f64>,
    rng: ChaCha8Rng,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: &[usize], depth: usize) -> Node {
        let positive = indices
            .iter()
            .filter(|&&i| self.dataset.labels[i] > 0.5)
            .count();
        let fraction = positive as f64 / indices.len().max(1) as f64;
        let impurity = gini(fraction);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity < 1e-10
        {
            return Node::leaf(fraction);
        }

        let Some((feature_idx, threshold, left_idx, right_idx, gain)) = self.best_split(indices, impurity)
        else {
            return Node::leaf(fraction);
        };

        if left_idx.len() < self.config.min_samples_leaf
            || right_idx.len() < self.config.min_samples_leaf
        {
            return Node::leaf(fraction);
        }

        self.importances[feature_idx] += gain * indices.len() as f64;

        let left = self.build(&left_idx, depth + 1);
        let right = self.build(&right_idx, depth + 1);
        Node {
            split: Some((feature_idx, threshold)),
            positive_fraction: fraction,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    #[allow(clippy::type_complexity)]
    fn best_split(
        &mut self,
        indices: &[usize],
        parent_impurity: f64,
    ) -> Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> {
        let mut candidates: Vec<usize> = (0..self.dataset.n_features()).collect();
        candidates.shuffle(&mut self.rng);
        candidates.truncate(self.max_features);

        let mut best: Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> = None;
        let mut best_gain = 0.0;

        for feature_idx in candidates {
            let mut values: Vec<f64> = indices
                .iter()
                .map(|&i| self.dataset.features[i][feature_idx])
                .collect();
            values.sort_by(f64::total_cmp);
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.dataset.features[i][feature_idx] <= threshold);
                if left.is_empty() || right.is_empty() {
                    continue;
                }

                let n_left = left.len() as f64;
                let n_right = right.len() as f64;
                let weighted = (n_left * subset_gini(self.dataset, &left)
                    + n_right * subset_gini(self.dataset, &right))
                    / indices.len() as f64;
                let gain = parent_impurity - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature_idx, threshold, left, right, gain));
                }
            }
        }

        best
    }
}

fn gini(positive_fraction: f64) -> f64 {
    2.0 * positive_fraction * (1.0 - positive_fraction)
}

fn subset_gini(dataset: &Dataset, indices: &[usize]) -> f64 {
    let positive = indices.iter().filter(|&&i| dataset.labels[i] > 0.5).count();
    gini(positive as f64 / indices.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_dataset() -> Dataset {
        let mut ds = Dataset::new(vec!["x".into(), "noise".into()]);
        for i in 0..200 {
            let x = i as f64 / 20.0;
            let noise = ((i * 7919) % 13) as f64;
            let label = if x > 5.0 { 1.0 } else { 0.0 };
            ds.push(vec![x, noise], label);
        }
        ds
    }

    #[test]
    fn forest_learns_a_separable_boundary() {
        let ds = separable_dataset();
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 20,
                max_depth: 5,
                ..Default::default()
            },
            &ds,
        );

        assert_eq!(forest.n_trees(), 20);
        assert!(forest.accuracy(&ds) > 0.95);
        assert_eq!(forest.predict_class(&[9.0, 0.0]), 1);
        assert_eq!(forest.predict_class(&[1.0, 0.0]), 0);
    }

    #[test]
    fn proba_is_confident_far_from_the_boundary() {
        let ds = separable_dataset();
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 30,
                max_depth: 6,
                ..Default::default()
            },
            &ds,
        );
        assert!(forest.predict_proba(&[9.5, 3.0]) > 0.9);
        assert!(forest.predict_proba(&[0.5, 3.0]) < 0.1);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let ds = separable_dataset();
        let cfg = ForestConfig {
            n_trees: 10,
            ..Default::default()
        };
        let a = RandomForest::fit(cfg.clone(), &ds);
        let b = RandomForest::fit(cfg, &ds);
        assert_eq!(a.predict_proba(&[4.9, 1.0]), b.predict_proba(&[4.9, 1.0]));
    }

    #[test]
    fn informative_feature_dominates_importances() {
        let ds = separable_dataset();
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 15,
                max_depth: 5,
                ..Default::default()
            },
            &ds,
        );
        let ranking = forest.importance_ranking();
        assert_eq!(ranking[0].0, "x");
        assert!(ranking[0].1 > 0.5);
    }

    #[test]
    fn serde_round_trip_preserves_predictions() {
        let ds = separable_dataset();
        let forest = RandomForest::fit(
            ForestConfig {
                n_trees: 5,
                ..Default::default()
            },
            &ds,
        );
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            forest.predict_proba(&[7.0, 2.0]),
            restored.predict_proba(&[7.0, 2.0])
        );
    }
}
