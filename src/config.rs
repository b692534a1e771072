use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::PipelineError;
use crate::landmarks::JointSelection;
use crate::pipeline::ModeKind;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub fps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Trigger {
    pub joints: Vec<String>,
    pub reference: Vec<String>,
    pub dims: usize,
    pub window_length: usize,
    pub distance_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tracking {
    pub joints: Vec<String>,
    pub reference: Vec<String>,
    pub dims: usize,
    pub duration_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Build {
    pub database: PathBuf,
    pub labels: Vec<String>,
    pub repetitions: usize,
    pub max_gestures: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub files: Vec<PathBuf>,
    pub proportion: f64,
    pub gestures_per_class: usize,
    pub samples_per_gesture: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Validate {
    pub results: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: Sampling,
    pub trigger: Trigger,
    pub tracking: Tracking,
    pub build: Build,
    pub dataset: Dataset,
    pub validate: Validate,
}

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for Sampling {
    fn default() -> Self {
        Self { fps: 10 }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            joints: strings(&[
                "thumb_tip",
                "index_finger_tip",
                "middle_finger_tip",
                "ring_finger_tip",
                "pinky_tip",
            ]),
            reference: strings(&["wrist", "index_finger_mcp", "pinky_mcp"]),
            dims: 2,
            window_length: 15,
            distance_threshold: 0.025,
        }
    }
}

impl Default for Tracking {
    fn default() -> Self {
        Self {
            joints: strings(&["left_wrist", "right_wrist"]),
            reference: strings(&["left_shoulder", "right_shoulder"]),
            dims: 3,
            duration_s: 4.0,
        }
    }
}

impl Default for Build {
    fn default() -> Self {
        Self {
            database: PathBuf::from("datasets/database.json"),
            labels: strings(&["F", "I", "L", "P", "T"]),
            repetitions: 10,
            max_gestures: None,
        }
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            proportion: 0.7,
            gestures_per_class: 10,
            samples_per_gesture: 5,
        }
    }
}

impl Default for Validate {
    fn default() -> Self {
        Self {
            results: PathBuf::from("results/validation.json"),
        }
    }
}

impl Config {
    pub fn trigger_selection(&self) -> JointSelection {
        JointSelection {
            joints: self.trigger.joints.clone(),
            reference: self.trigger.reference.clone(),
            dims: self.trigger.dims,
        }
    }

    pub fn tracking_selection(&self) -> JointSelection {
        JointSelection {
            joints: self.tracking.joints.clone(),
            reference: self.tracking.reference.clone(),
            dims: self.tracking.dims,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.sampling.fps.max(1)))
    }

    pub fn tracking_duration(&self) -> Duration {
        Duration::from_secs_f64(self.tracking.duration_s)
    }

    /// Build-mode prompt sequence: each label `repetitions` times, in order.
    pub fn label_sequence(&self) -> Vec<String> {
        self.build
            .labels
            .iter()
            .flat_map(|l| std::iter::repeat_n(l.clone(), self.build.repetitions))
            .collect()
    }

    pub fn max_gestures(&self) -> usize {
        self.build
            .max_gestures
            .unwrap_or(self.build.labels.len() * self.build.repetitions)
    }

    pub fn from_toml(txt: &str) -> Result<Self> {
        Ok(toml::from_str(txt)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        Self::from_toml(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
    }

    /// Load `~/.config/gesturectl/config.toml`, installing the bundled default first.
    pub fn load_or_install_default() -> Result<Self> {
        let path = default_config_path()?;
        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&path, default_config_text())?;
            info!("installed default config at {}", path.display());
        }
        Self::load(&path)
    }
}

fn default_config_path() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot determine home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("gesturectl").join("config.toml"))
}

fn default_config_text() -> &'static str {
    include_str!("../config/default.toml")
}

fn reject(msg: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(msg.into())
}

fn check_selection(name: &str, joints: &[String], dims: usize) -> Result<(), PipelineError> {
    if joints.is_empty() {
        return Err(reject(format!("{name}.joints must not be empty")));
    }
    if joints.iter().any(|j| j.trim().is_empty()) {
        return Err(reject(format!("{name}.joints contains an empty name")));
    }
    if !(1..=3).contains(&dims) {
        return Err(reject(format!("{name}.dims must be 1, 2 or 3, got {dims}")));
    }
    Ok(())
}

/// Reject settings that would make `mode` misbehave. Runs before any loop starts.
pub fn validate_config(cfg: &Config, mode: ModeKind) -> Result<(), PipelineError> {
    if cfg.sampling.fps == 0 {
        return Err(reject("sampling.fps must be positive"));
    }
    check_selection("trigger", &cfg.trigger.joints, cfg.trigger.dims)?;
    check_selection("tracking", &cfg.tracking.joints, cfg.tracking.dims)?;
    if cfg.trigger.window_length == 0 {
        return Err(reject("trigger.window_length must be positive"));
    }
    let th = cfg.trigger.distance_threshold;
    if !th.is_finite() || th <= 0.0 {
        return Err(reject("trigger.distance_threshold must be a positive number"));
    }
    let dur = cfg.tracking.duration_s;
    if !dur.is_finite() || dur <= 0.0 {
        return Err(reject("tracking.duration_s must be a positive number"));
    }

    match mode {
        ModeKind::Build => {
            if cfg.build.labels.is_empty() || cfg.build.labels.iter().any(|l| l.trim().is_empty())
            {
                return Err(reject("build.labels must list non-empty label names"));
            }
            if cfg.build.repetitions == 0 {
                return Err(reject("build.repetitions must be positive"));
            }
            if cfg.max_gestures() == 0 {
                return Err(reject("build.max_gestures must be positive"));
            }
        }
        ModeKind::Validate | ModeKind::RealTime => {
            let p = cfg.dataset.proportion;
            if !(p > 0.0 && p <= 1.0) {
                return Err(PipelineError::InvalidProportion(p));
            }
            if cfg.dataset.files.is_empty() {
                return Err(reject("dataset.files must name at least one database"));
            }
            if cfg.dataset.gestures_per_class == 0 || cfg.dataset.samples_per_gesture == 0 {
                return Err(reject(
                    "dataset.gestures_per_class and samples_per_gesture must be positive",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_default_matches_builtin_defaults() {
        let cfg = Config::from_toml(default_config_text()).unwrap();
        let def = Config::default();
        assert_eq!(cfg.sampling.fps, def.sampling.fps);
        assert_eq!(cfg.trigger.joints, def.trigger.joints);
        assert_eq!(cfg.trigger.reference, def.trigger.reference);
        assert_eq!(cfg.trigger.window_length, 15);
        assert_eq!(cfg.trigger.distance_threshold, 0.025);
        assert_eq!(cfg.tracking.joints, def.tracking.joints);
        assert_eq!(cfg.tracking.duration_s, 4.0);
        assert_eq!(cfg.build.labels, def.build.labels);
        assert_eq!(cfg.dataset.proportion, 0.7);
        validate_config(&cfg, ModeKind::Build).unwrap();
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg = Config::from_toml("[trigger]\nwindow_length = 5\n").unwrap();
        assert_eq!(cfg.trigger.window_length, 5);
        assert_eq!(cfg.trigger.dims, 2);
        assert_eq!(cfg.sampling.fps, 10);
    }

    #[test]
    fn default_tracking_has_six_channels() {
        assert_eq!(Config::default().tracking_selection().width(), 6);
    }

    #[test]
    fn label_sequence_repeats_each_label_in_order() {
        let mut cfg = Config::default();
        cfg.build.labels = vec!["A".into(), "B".into()];
        cfg.build.repetitions = 2;
        assert_eq!(cfg.label_sequence(), vec!["A", "A", "B", "B"]);
        assert_eq!(cfg.max_gestures(), 4);
        cfg.build.max_gestures = Some(3);
        assert_eq!(cfg.max_gestures(), 3);
    }

    #[test]
    fn tick_period_follows_fps() {
        let cfg = Config::default();
        assert_eq!(cfg.tick_period(), Duration::from_millis(100));
        assert_eq!(cfg.tracking_duration(), Duration::from_secs(4));
    }

    #[test]
    fn rejects_bad_proportion_for_dataset_modes() {
        let mut cfg = Config::default();
        cfg.dataset.files = vec![PathBuf::from("a.json")];
        cfg.dataset.proportion = 1.5;
        assert!(matches!(
            validate_config(&cfg, ModeKind::Validate),
            Err(PipelineError::InvalidProportion(_))
        ));
        cfg.dataset.proportion = 0.0;
        assert!(validate_config(&cfg, ModeKind::RealTime).is_err());
        // build mode does not care about the split
        assert!(validate_config(&cfg, ModeKind::Build).is_ok());
    }

    #[test]
    fn rejects_missing_sources_and_bad_thresholds() {
        let cfg = Config::default();
        assert!(matches!(
            validate_config(&cfg, ModeKind::RealTime),
            Err(PipelineError::Configuration(_))
        ));

        let mut cfg = Config::default();
        cfg.trigger.distance_threshold = -1.0;
        assert!(validate_config(&cfg, ModeKind::Build).is_err());

        let mut cfg = Config::default();
        cfg.tracking.dims = 4;
        assert!(validate_config(&cfg, ModeKind::Build).is_err());

        let mut cfg = Config::default();
        cfg.sampling.fps = 0;
        assert!(validate_config(&cfg, ModeKind::Build).is_err());

        let mut cfg = Config::default();
        cfg.build.repetitions = 0;
        assert!(validate_config(&cfg, ModeKind::Build).is_err());
    }
}
