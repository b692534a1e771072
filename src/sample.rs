use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::reducer;

/// One captured (or to-be-classified) gesture instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureSample {
    pub joints_trigger: Vec<String>,
    pub joints_tracked: Vec<String>,
    pub trigger_window_length: usize,
    pub trigger_distance_threshold: f64,
    pub duration_seconds: f64,
    #[serde(default)]
    pub raw_trajectory: Vec<Vec<f64>>,
    pub reduced_features: Vec<Vec<f64>>,
    pub label: Option<String>,
}

impl GestureSample {
    /// Reduce a finished tracking window into a sample.
    pub fn capture(
        cfg: &Config,
        trajectory: Vec<Vec<f64>>,
        duration: Duration,
        label: Option<String>,
    ) -> Result<Self> {
        let reduced = reducer::reduce(&trajectory)?;
        Ok(Self {
            joints_trigger: cfg.trigger.joints.clone(),
            joints_tracked: cfg.tracking.joints.clone(),
            trigger_window_length: cfg.trigger.window_length,
            trigger_distance_threshold: cfg.trigger.distance_threshold,
            duration_seconds: duration.as_secs_f64(),
            raw_trajectory: trajectory,
            reduced_features: reducer::to_rows(&reduced),
            label,
        })
    }

    /// Number of tracked coordinate channels (`D`).
    pub fn dimension(&self) -> usize {
        self.reduced_features.len()
    }

    pub fn frames(&self) -> usize {
        self.raw_trajectory.len()
    }

    /// A single-frame capture: valid, but carries almost no motion.
    pub fn is_degenerate(&self) -> bool {
        self.frames() <= 1
    }

    /// Row-major `D*D` feature vector fed to the classifier.
    pub fn flattened(&self) -> Vec<f64> {
        self.reduced_features.iter().flatten().copied().collect()
    }
}
