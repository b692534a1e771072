//! Per-mode behaviour, chosen once at startup.

use log::{info, warn};
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use super::controller::Stage;
use crate::classifier::{KnnClassifier, neighbor_count};
use crate::config::Config;
use crate::database::{DatasetSplit, GestureDatabase};
use crate::error::{PipelineError, Result};
use crate::report::ValidationReport;
use crate::sample::GestureSample;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub elapsed: Duration,
}

/// What a mode does once a gesture has been reduced.
pub trait Mode {
    fn name(&self) -> &'static str;

    /// Stage entered right after reduction.
    fn completion_stage(&self, sample: GestureSample) -> Stage;

    /// Label the operator is asked to perform as gesture number `index`.
    fn prompt(&self, _index: usize) -> Option<String> {
        None
    }

    fn persist(&mut self, _sample: GestureSample) -> Result<()> {
        Err(PipelineError::UnsupportedStage {
            mode: self.name(),
            stage: "persist",
        })
    }

    fn classify(&mut self, _sample: &GestureSample) -> Result<Prediction> {
        Err(PipelineError::UnsupportedStage {
            mode: self.name(),
            stage: "classify",
        })
    }

    fn gesture_limit(&self) -> Option<usize> {
        None
    }

    /// Called once when the capture loop stops.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects labeled samples and saves the whole database after each one.
pub struct BuildMode {
    pub database: GestureDatabase,
    path: PathBuf,
    sequence: Vec<String>,
    limit: usize,
    dirty: bool,
}

impl BuildMode {
    pub fn new(cfg: &Config) -> Self {
        Self {
            database: GestureDatabase::with_labels(&cfg.build.labels),
            path: cfg.build.database.clone(),
            sequence: cfg.label_sequence(),
            limit: cfg.max_gestures(),
            dirty: false,
        }
    }

    /// True when the last save failed and memory holds unsaved samples.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Mode for BuildMode {
    fn name(&self) -> &'static str {
        "build"
    }

    fn completion_stage(&self, sample: GestureSample) -> Stage {
        Stage::Persist(sample)
    }

    fn prompt(&self, index: usize) -> Option<String> {
        if self.sequence.is_empty() {
            return None;
        }
        Some(self.sequence[index % self.sequence.len()].clone())
    }

    fn persist(&mut self, sample: GestureSample) -> Result<()> {
        let label = sample.label.clone().ok_or_else(|| {
            PipelineError::Configuration("build sample captured without a label".into())
        })?;
        self.database.append(&label, sample)?;
        self.dirty = true;
        self.database.save(&self.path)?;
        self.dirty = false;
        Ok(())
    }

    fn gesture_limit(&self) -> Option<usize> {
        Some(self.limit)
    }

    fn finish(&mut self) -> Result<()> {
        if self.is_dirty() {
            warn!("retrying save of {}", self.path.display());
            self.database.save(&self.path)?;
            self.dirty = false;
        }
        info!(
            "database {} holds {} samples",
            self.path.display(),
            self.database.len()
        );
        Ok(())
    }
}

/// Classifies each captured gesture against a fitted classifier.
pub struct RealTimeMode {
    classifier: KnnClassifier,
    pub predictions: Vec<Prediction>,
}

impl RealTimeMode {
    pub fn new(classifier: KnnClassifier) -> Self {
        Self {
            classifier,
            predictions: Vec::new(),
        }
    }

    /// Load and split the configured databases, then fit on the training part.
    ///
    /// Live samples are reduced from the configured tracking selection, so the
    /// stored features must have the same `D x D` width.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let (classifier, split) = train(cfg)?;
        let expected = cfg.tracking_selection().width().pow(2);
        let stored = split.x_train.first().map_or(0, Vec::len);
        if stored != expected {
            return Err(PipelineError::Configuration(format!(
                "databases hold {stored}-value features but the tracking selection \
                 produces {expected}; check [tracking] against the capture settings"
            )));
        }
        Ok(Self::new(classifier))
    }
}

impl Mode for RealTimeMode {
    fn name(&self) -> &'static str {
        "realtime"
    }

    fn completion_stage(&self, sample: GestureSample) -> Stage {
        Stage::Classify(sample)
    }

    fn classify(&mut self, sample: &GestureSample) -> Result<Prediction> {
        let t0 = Instant::now();
        let label = self.classifier.predict_one(&sample.flattened())?;
        let prediction = Prediction {
            label,
            elapsed: t0.elapsed(),
        };
        self.predictions.push(prediction.clone());
        Ok(prediction)
    }

    fn finish(&mut self) -> Result<()> {
        info!("classified {} gestures", self.predictions.len());
        Ok(())
    }
}

/// Load, split and fit. Shared by Validate and RealTime.
pub fn train(cfg: &Config) -> Result<(KnnClassifier, DatasetSplit)> {
    let split = DatasetSplit::load(&cfg.dataset.files, cfg.dataset.proportion)?;
    let k = neighbor_count(
        cfg.dataset.files.len(),
        cfg.dataset.gestures_per_class,
        cfg.dataset.samples_per_gesture,
        cfg.dataset.proportion,
    );
    let mut classifier = KnnClassifier::new(k);
    classifier.fit(&split.x_train, &split.y_train)?;
    info!(
        "fitted k-NN (k={k}) on {} samples, {} held out, classes {:?}",
        split.x_train.len(),
        split.x_val.len(),
        split.class_names
    );
    Ok((classifier, split))
}

/// One-shot evaluation of the held-out split. Nothing is written unless
/// every sample was classified.
pub fn run_validation(cfg: &Config) -> Result<ValidationReport> {
    let (classifier, split) = train(cfg)?;
    if split.x_val.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "held-out split is empty at proportion {}",
            cfg.dataset.proportion
        )));
    }

    let (predicted, elapsed) = classifier.validate_batch(&split.x_val)?;
    let report = ValidationReport::new(
        split.class_names,
        split.y_val,
        predicted,
        &elapsed,
        split.val_degenerate,
        classifier.k(),
        classifier.train_size(),
    );
    report.write(&cfg.validate.results)?;

    info!(
        "validation accuracy {:.2}% over {} samples (mean {:.3} ms/sample), results in {}",
        report.accuracy * 100.0,
        report.validation_size,
        report.mean_elapsed() * 1e3,
        cfg.validate.results.display()
    );
    if report.degenerate_count() > 0 {
        warn!(
            "{} held-out samples are single-frame captures",
            report.degenerate_count()
        );
    }
    Ok(report)
}
