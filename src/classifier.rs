//! Brute-force k-nearest-neighbor classifier over flattened reduced features.
//!
//! Ties are resolved deterministically:
//! - neighbors at equal distance are ordered by training index (earlier wins);
//! - labels with equal vote counts resolve to the lexicographically smallest.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::error::{PipelineError, Result};

/// `k = round(sqrt(files * gestures_per_class * samples_per_gesture * proportion))`.
///
/// A sqrt-of-training-size rule of thumb, not an optimality guarantee.
/// Halves round away from zero, matching the dataset split.
pub fn neighbor_count(
    num_files: usize,
    gestures_per_class: usize,
    samples_per_gesture: usize,
    proportion: f64,
) -> usize {
    let n = (num_files * gestures_per_class * samples_per_gesture) as f64 * proportion;
    (n.sqrt().round() as usize).max(1)
}

#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    x_train: Vec<Vec<f64>>,
    y_train: Vec<String>,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            x_train: Vec::new(),
            y_train: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn train_size(&self) -> usize {
        self.x_train.len()
    }

    /// Replace the training set.
    pub fn fit(&mut self, x_train: &[Vec<f64>], y_train: &[String]) -> Result<()> {
        if x_train.len() != y_train.len() {
            return Err(PipelineError::TrainingMismatch {
                samples: x_train.len(),
                labels: y_train.len(),
            });
        }
        let width = x_train.first().ok_or(PipelineError::EmptyDatabase)?.len();
        if let Some(bad) = x_train.iter().find(|x| x.len() != width) {
            return Err(PipelineError::FeatureWidth {
                expected: width,
                found: bad.len(),
            });
        }
        self.x_train = x_train.to_vec();
        self.y_train = y_train.to_vec();
        Ok(())
    }

    pub fn predict_one(&self, x: &[f64]) -> Result<String> {
        let width = self.x_train.first().ok_or(PipelineError::NotFitted)?.len();
        if x.len() != width {
            return Err(PipelineError::FeatureWidth {
                expected: width,
                found: x.len(),
            });
        }

        let mut dists: Vec<(f64, usize)> = self
            .x_train
            .iter()
            .enumerate()
            .map(|(i, t)| (euclidean_distance(x, t), i))
            .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let k = self.k.min(dists.len());
        let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
        for &(_, i) in &dists[..k] {
            *votes.entry(self.y_train[i].as_str()).or_default() += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (label, count) in votes {
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(l, _)| l.to_string()).ok_or(PipelineError::NotFitted)
    }

    /// Predict every row, timing each prediction on its own.
    pub fn validate_batch(&self, x_val: &[Vec<f64>]) -> Result<(Vec<String>, Vec<Duration>)> {
        let mut labels = Vec::with_capacity(x_val.len());
        let mut elapsed = Vec::with_capacity(x_val.len());
        for x in x_val {
            let t0 = Instant::now();
            let label = self.predict_one(x)?;
            elapsed.push(t0.elapsed());
            labels.push(label);
        }
        Ok((labels, elapsed))
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
