//! Append-only history of feature rows for one signal.
//!
//! Every buffer starts with a single all-zero seed row so that the
//! replicate-last-row fallback always has something to copy, even when
//! the very first frame of a gesture attempt has no detection.

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct TemporalBuffer {
    width: usize,
    rows: Vec<Vec<f64>>,
    /// Index into `rows` of the first real measurement since the last reset.
    first_measured: Option<usize>,
}

impl TemporalBuffer {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            rows: vec![vec![0.0; width]],
            first_measured: None,
        }
    }

    /// Number of rows, seed included.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn push(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.width {
            return Err(PipelineError::RowWidth {
                expected: self.width,
                found: row.len(),
            });
        }
        self.rows.push(row);
        if self.first_measured.is_none() {
            self.first_measured = Some(self.rows.len() - 1);
        }
        Ok(())
    }

    /// Fallback for frames without a usable detection.
    pub fn replicate_last(&mut self) {
        // the seed guarantees at least one row
        let last = self.rows[self.rows.len() - 1].clone();
        self.rows.push(last);
    }

    /// Whether any real row (not a replicate of the seed) arrived since the last reset.
    #[cfg(test)]
    pub fn has_measurement(&self) -> bool {
        self.first_measured.is_some()
    }

    /// Rows appended since the last reset (seed excluded).
    pub fn history(&self) -> &[Vec<f64>] {
        &self.rows[1..]
    }

    /// The most recent `n` non-seed rows, or `None` if fewer were appended.
    pub fn window(&self, n: usize) -> Option<&[Vec<f64>]> {
        let history = self.history();
        if n == 0 || history.len() < n {
            return None;
        }
        Some(&history[history.len() - n..])
    }

    /// Like [`window`](Self::window), but only once every row in it is a
    /// real measurement or a replicate of one. Seed copies never count.
    pub fn measured_window(&self, n: usize) -> Option<&[Vec<f64>]> {
        let first = self.first_measured?;
        if self.rows.len() < n || self.rows.len() - n < first {
            return None;
        }
        self.window(n)
    }

    /// Drop all but the newest `keep` non-seed rows.
    pub fn retain_last(&mut self, keep: usize) {
        let excess = self.history().len().saturating_sub(keep);
        if excess == 0 {
            return;
        }
        self.rows.drain(1..=excess);
        // rows after the first measurement are real or replicates of real rows
        self.first_measured = self.first_measured.map(|i| i.saturating_sub(excess).max(1));
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.rows.push(vec![0.0; self.width]);
        self.first_measured = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_zero_seed() {
        let buf = TemporalBuffer::new(4);
        assert_eq!(buf.len(), 1);
        assert!(buf.history().is_empty());
        assert_eq!(buf.rows[0], vec![0.0; 4]);
    }

    #[test]
    fn grows_by_one_per_tick_with_failures_as_duplicates() {
        let mut buf = TemporalBuffer::new(2);
        // n = 8 ticks, failures on ticks 0, 3 and 4 (m = 3)
        let failures = [true, false, false, true, true, false, false, false];
        for (i, failed) in failures.iter().enumerate() {
            if *failed {
                buf.replicate_last();
            } else {
                buf.push(vec![i as f64 + 1.0, -(i as f64) - 1.0]).unwrap();
            }
        }

        assert_eq!(buf.len(), failures.len() + 1);
        let duplicates = buf
            .rows
            .windows(2)
            .filter(|pair| pair[0] == pair[1])
            .count();
        assert_eq!(duplicates, 3);
    }

    #[test]
    fn rejects_rows_of_wrong_width() {
        let mut buf = TemporalBuffer::new(3);
        let err = buf.push(vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RowWidth {
                expected: 3,
                found: 2
            }
        ));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn window_needs_enough_history() {
        let mut buf = TemporalBuffer::new(1);
        buf.push(vec![1.0]).unwrap();
        buf.push(vec![2.0]).unwrap();
        assert!(buf.window(3).is_none());
        assert!(buf.window(0).is_none());

        buf.push(vec![3.0]).unwrap();
        let w = buf.window(2).unwrap();
        assert_eq!(w, &[vec![2.0], vec![3.0]]);
    }

    #[test]
    fn measured_window_skips_seed_copies() {
        let mut buf = TemporalBuffer::new(1);
        buf.replicate_last();
        buf.replicate_last();
        assert!(buf.measured_window(1).is_none());

        buf.push(vec![4.0]).unwrap();
        assert!(buf.window(3).is_some());
        assert!(buf.measured_window(2).is_none());
        assert_eq!(buf.measured_window(1).unwrap(), &[vec![4.0]]);

        buf.replicate_last();
        assert_eq!(buf.measured_window(2).unwrap(), &[vec![4.0], vec![4.0]]);
    }

    #[test]
    fn retain_last_bounds_history() {
        let mut buf = TemporalBuffer::new(1);
        buf.replicate_last();
        for i in 0..10 {
            buf.push(vec![i as f64]).unwrap();
            buf.retain_last(3);
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.rows[0], vec![0.0]);
        assert_eq!(buf.history(), &[vec![7.0], vec![8.0], vec![9.0]]);
        assert_eq!(buf.measured_window(3).unwrap(), buf.history());
    }

    #[test]
    fn retain_last_keeps_unmeasured_rows_unmeasured() {
        let mut buf = TemporalBuffer::new(1);
        for _ in 0..5 {
            buf.replicate_last();
            buf.retain_last(2);
        }
        assert_eq!(buf.len(), 3);
        assert!(!buf.has_measurement());

        buf.push(vec![1.0]).unwrap();
        buf.retain_last(2);
        // one seed copy is still inside the window
        assert!(buf.measured_window(2).is_none());
    }

    #[test]
    fn reset_restores_seed_state() {
        let mut buf = TemporalBuffer::new(2);
        buf.push(vec![5.0, 5.0]).unwrap();
        buf.replicate_last();
        assert!(buf.has_measurement());
        buf.reset();
        assert!(!buf.has_measurement());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.rows[0], vec![0.0, 0.0]);
    }
}
