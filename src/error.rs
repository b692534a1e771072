use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown mode '{0}' (expected build, validate or realtime)")]
    InvalidMode(String),

    #[error("split proportion must be in (0, 1], got {0}")]
    InvalidProportion(f64),

    #[error("database contains no samples")]
    EmptyDatabase,

    #[error("failed to read database {}: {source}", path.display())]
    DatabaseRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse database {}: {source}", path.display())]
    DatabaseFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("label '{label}' holds {expected}-channel samples, got {found}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("row has {found} values, buffer width is {expected}")]
    RowWidth { expected: usize, found: usize },

    #[error("trajectory has no frames")]
    EmptyTrajectory,

    #[error("classifier has not been fitted")]
    NotFitted,

    #[error("{samples} training samples but {labels} labels")]
    TrainingMismatch { samples: usize, labels: usize },

    #[error("feature vector has {found} values, expected {expected}")]
    FeatureWidth { expected: usize, found: usize },

    #[error("{mode} mode has no {stage} stage")]
    UnsupportedStage {
        mode: &'static str,
        stage: &'static str,
    },
}

impl PipelineError {
    /// Failures the operator can recover from by retrying the save.
    pub fn is_persistence(&self) -> bool {
        matches!(self, PipelineError::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
