//! Pinch trigger: decides when a trackable gesture begins.

use log::debug;

use crate::buffer::TemporalBuffer;
use crate::landmarks::{DetectionResult, JointSelection};

/// Closeness reported while the window is not yet full or right after firing.
pub const NOT_FIRING: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerReading {
    pub closeness: f64,
    pub fired: bool,
}

#[derive(Debug, Clone)]
pub struct TriggerDetector {
    selection: JointSelection,
    window_length: usize,
    threshold: f64,
    buffer: TemporalBuffer,
}

impl TriggerDetector {
    pub fn new(selection: JointSelection, window_length: usize, threshold: f64) -> Self {
        let buffer = TemporalBuffer::new(selection.width());
        Self {
            selection,
            window_length,
            threshold,
            buffer,
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &TemporalBuffer {
        &self.buffer
    }

    /// Append this frame's fingertip row (or the fallback) and evaluate the window.
    pub fn observe(&mut self, hand: &DetectionResult) -> TriggerReading {
        let row = match hand {
            DetectionResult::Found(joints) => self.selection.relative_row(joints),
            DetectionResult::NotFound => None,
        };
        match row {
            // relative_row always produces selection.width() values
            Some(row) => {
                if let Err(e) = self.buffer.push(row) {
                    debug!("trigger row rejected: {e}");
                    self.buffer.replicate_last();
                }
            }
            None => {
                debug!("no hand detected; replicating last trigger row");
                self.buffer.replicate_last();
            }
        }
        // only the newest window is ever read
        self.buffer.retain_last(self.window_length);

        let closeness = self.closeness();
        TriggerReading {
            closeness,
            fired: closeness < self.threshold,
        }
    }

    /// Mean pairwise fingertip distance, averaged over the last
    /// `window_length` rows. Small values mean the fingertips stayed
    /// bunched together for the whole window.
    ///
    /// Copies of the all-zero seed look like a perfect pinch, so the
    /// window only counts once it lies entirely after the first real hand row.
    pub fn closeness(&self) -> f64 {
        match self.buffer.measured_window(self.window_length) {
            Some(rows) => {
                let total: f64 = rows
                    .iter()
                    .map(|r| mean_pairwise_distance(r, self.selection.dims))
                    .sum();
                total / rows.len() as f64
            }
            None => NOT_FIRING,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
    }
}

fn mean_pairwise_distance(row: &[f64], dims: usize) -> f64 {
    let points: Vec<&[f64]> = row.chunks(dims).collect();
    if points.len() < 2 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            sum += points[i]
                .iter()
                .zip(points[j])
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            pairs += 1;
        }
    }
    sum / pairs as f64
}
