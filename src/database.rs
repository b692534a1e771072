//! Labeled gesture database: one JSON file per contributor.
//!
//! On disk a database is a JSON object mapping label -> list of sample
//! records. Saves go through a sibling temp file and a rename, so a crash
//! mid-write never leaves a truncated database behind.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::error::{PipelineError, Result};
use crate::sample::GestureSample;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureDatabase {
    buckets: BTreeMap<String, Vec<GestureSample>>,
}

impl GestureDatabase {
    /// Empty database with one bucket per label.
    pub fn with_labels(labels: &[String]) -> Self {
        Self {
            buckets: labels.iter().map(|l| (l.clone(), Vec::new())).collect(),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub fn samples(&self, label: &str) -> &[GestureSample] {
        self.buckets.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append under `label`, keeping every sample in a bucket the same `D`.
    pub fn append(&mut self, label: &str, sample: GestureSample) -> Result<()> {
        let bucket = self.buckets.entry(label.to_string()).or_default();
        if let Some(first) = bucket.first() {
            if first.dimension() != sample.dimension() {
                return Err(PipelineError::DimensionMismatch {
                    label: label.to_string(),
                    expected: first.dimension(),
                    found: sample.dimension(),
                });
            }
        }
        bucket.push(sample);
        Ok(())
    }

    /// Append every sample of `other`, label by label, after our own.
    pub fn merge(&mut self, other: GestureDatabase) -> Result<()> {
        for (label, samples) in other.buckets {
            self.buckets.entry(label.clone()).or_default();
            for s in samples {
                self.append(&label, s)?;
            }
        }
        Ok(())
    }

    /// Per-label counts, dimension, mean duration and degenerate captures.
    pub fn summary(&self) -> serde_json::Value {
        let labels: serde_json::Map<String, serde_json::Value> = self
            .buckets
            .iter()
            .map(|(label, samples)| {
                let mean_duration = if samples.is_empty() {
                    0.0
                } else {
                    samples.iter().map(|s| s.duration_seconds).sum::<f64>() / samples.len() as f64
                };
                let v = serde_json::json!({
                    "samples": samples.len(),
                    "dimension": samples.first().map(GestureSample::dimension),
                    "mean_duration_s": mean_duration,
                    "degenerate": samples.iter().filter(|s| s.is_degenerate()).count(),
                });
                (label.clone(), v)
            })
            .collect();
        serde_json::json!({ "total": self.len(), "labels": labels })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let persist_err = |source: io::Error| PipelineError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(persist_err)?;
        }
        let bytes = serde_json::to_vec(self).map_err(|e| persist_err(io::Error::other(e)))?;
        let tmp = temp_path(path);
        fs::write(&tmp, bytes).map_err(persist_err)?;
        fs::rename(&tmp, path).map_err(persist_err)?;
        debug!("saved {} samples to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).map_err(|source| PipelineError::DatabaseRead {
            path: path.to_path_buf(),
            source,
        })?;
        let db: GestureDatabase =
            serde_json::from_str(&txt).map_err(|source| PipelineError::DatabaseFormat {
                path: path.to_path_buf(),
                source,
            })?;
        // re-check the per-label dimension invariant on untrusted input
        let mut checked = GestureDatabase::default();
        checked.merge(db)?;
        Ok(checked)
    }

    /// Read several databases and merge them in the given order.
    pub fn load_merged(paths: &[PathBuf]) -> Result<Self> {
        let mut db = GestureDatabase::default();
        for p in paths {
            let part = Self::load_file(p)?;
            info!("loaded {} samples from {}", part.len(), p.display());
            db.merge(part)?;
        }
        Ok(db)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Per-label training prefix / held-out suffix, flattened for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<String>,
    pub x_val: Vec<Vec<f64>>,
    pub y_val: Vec<String>,
    /// Parallel to `y_val`: held-out samples captured from a single frame.
    pub val_degenerate: Vec<bool>,
    pub class_names: Vec<String>,
}

impl DatasetSplit {
    pub fn load(paths: &[PathBuf], proportion: f64) -> Result<Self> {
        let db = GestureDatabase::load_merged(paths)?;
        Self::from_database(&db, proportion)
    }

    /// Deterministic split: the first `round(count * proportion)` samples
    /// of each label train, the rest are held out. No shuffling.
    ///
    /// `round` is `f64::round`, so halves go away from zero: 5 samples at
    /// 0.5 give 3 training samples, not the 2 a round-half-to-even rule would.
    pub fn from_database(db: &GestureDatabase, proportion: f64) -> Result<Self> {
        if !(proportion > 0.0 && proportion <= 1.0) {
            return Err(PipelineError::InvalidProportion(proportion));
        }
        if db.is_empty() {
            return Err(PipelineError::EmptyDatabase);
        }

        let mut split = DatasetSplit {
            x_train: Vec::new(),
            y_train: Vec::new(),
            x_val: Vec::new(),
            y_val: Vec::new(),
            val_degenerate: Vec::new(),
            class_names: db.labels().map(str::to_string).collect(),
        };
        for (label, samples) in &db.buckets {
            let n_train = ((samples.len() as f64 * proportion).round() as usize).min(samples.len());
            let (train, val) = samples.split_at(n_train);
            for s in train {
                split.x_train.push(s.flattened());
                split.y_train.push(label.clone());
            }
            for s in val {
                split.x_val.push(s.flattened());
                split.y_val.push(label.clone());
                split.val_degenerate.push(s.is_degenerate());
            }
        }
        Ok(split)
    }
}

#[cfg(test)]
pub(crate) fn sample_with(label: &str, scale: f64, frames: usize) -> GestureSample {
    use crate::config::Config;
    use std::time::Duration;

    let traj: Vec<Vec<f64>> = (0..frames)
        .map(|i| vec![scale, scale * 0.5 + i as f64 * 0.01, -scale])
        .collect();
    GestureSample::capture(
        &Config::default(),
        traj,
        Duration::from_millis(4000),
        Some(label.to_string()),
    )
    .unwrap()
}
