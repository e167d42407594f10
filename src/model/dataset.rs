//! In-memory training set for the risk classifier.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Encoded feature matrix with binary labels (0.0 / 1.0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl Dataset {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            features: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn push(&mut self, row: Vec<f64>, label: f64) {
        debug_assert_eq!(row.len(), self.feature_names.len());
        self.features.push(row);
        self.labels.push(label);
    }

    /// Share of positive (class 1) samples.
    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l > 0.5).count() as f64 / self.labels.len() as f64
    }

    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Seeded sample with replacement, same size as the original.
    pub fn bootstrap_sample(&self, seed: u64) -> Dataset {
        let n = self.n_samples();
        if n == 0 {
            return self.clone();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        self.subset(&indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Dataset {
        let mut ds = Dataset::new(vec!["a".into(), "b".into()]);
        ds.push(vec![1.0, 2.0], 0.0);
        ds.push(vec![3.0, 4.0], 1.0);
        ds.push(vec![5.0, 6.0], 1.0);
        ds
    }

    #[test]
    fn shape_and_positive_rate() {
        let ds = toy();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_features(), 2);
        assert!((ds.positive_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn bootstrap_is_deterministic_per_seed() {
        let ds = toy();
        let a = ds.bootstrap_sample(7);
        let b = ds.bootstrap_sample(7);
        assert_eq!(a.features, b.features);
        assert_eq!(a.n_samples(), ds.n_samples());
    }
}
