//! Validate-mode results file.

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, time::Duration};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub class_names: Vec<String>,
    pub y_true: Vec<String>,
    pub y_predicted: Vec<String>,
    pub elapsed_seconds: Vec<f64>,
    pub degenerate: Vec<bool>,
    pub k: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub accuracy: f64,
}

impl ValidationReport {
    pub fn new(
        class_names: Vec<String>,
        y_true: Vec<String>,
        y_predicted: Vec<String>,
        elapsed: &[Duration],
        degenerate: Vec<bool>,
        k: usize,
        train_size: usize,
    ) -> Self {
        let correct = y_true
            .iter()
            .zip(&y_predicted)
            .filter(|(t, p)| t == p)
            .count();
        let validation_size = y_true.len();
        let accuracy = if validation_size == 0 {
            0.0
        } else {
            correct as f64 / validation_size as f64
        };
        Self {
            class_names,
            y_true,
            y_predicted,
            elapsed_seconds: elapsed.iter().map(Duration::as_secs_f64).collect(),
            degenerate,
            k,
            train_size,
            validation_size,
            accuracy,
        }
    }

    pub fn degenerate_count(&self) -> usize {
        self.degenerate.iter().filter(|d| **d).count()
    }

    pub fn mean_elapsed(&self) -> f64 {
        if self.elapsed_seconds.is_empty() {
            return 0.0;
        }
        self.elapsed_seconds.iter().sum::<f64>() / self.elapsed_seconds.len() as f64
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let persist_err = |source: io::Error| PipelineError::Persistence {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(persist_err)?;
        }
        let txt =
            serde_json::to_string_pretty(self).map_err(|e| persist_err(io::Error::other(e)))?;
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, txt).map_err(persist_err)?;
        fs::rename(&tmp, path).map_err(persist_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn accuracy_and_counts() {
        let r = ValidationReport::new(
            s(&["F", "T"]),
            s(&["F", "F", "T", "T"]),
            s(&["F", "T", "T", "T"]),
            &[Duration::from_millis(2); 4],
            vec![false, true, false, false],
            3,
            10,
        );
        assert_eq!(r.validation_size, 4);
        assert!((r.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(r.degenerate_count(), 1);
        assert!((r.mean_elapsed() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn empty_report_has_zero_accuracy() {
        let r = ValidationReport::new(vec![], vec![], vec![], &[], vec![], 1, 0);
        assert_eq!(r.accuracy, 0.0);
        assert_eq!(r.mean_elapsed(), 0.0);
    }

    #[test]
    fn written_report_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("val.json");
        let r = ValidationReport::new(
            s(&["F"]),
            s(&["F"]),
            s(&["F"]),
            &[Duration::from_micros(150)],
            vec![false],
            1,
            2,
        );
        r.write(&path).unwrap();
        let back: ValidationReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, r);
    }
}
