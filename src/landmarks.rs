//! Landmark input: what the pose/hand extractor hands us each frame.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

/// Named joint -> normalized coordinates (2D for hands, 3D for body).
pub type Joints = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Found(Joints),
    NotFound,
}

impl From<Option<Joints>> for DetectionResult {
    fn from(joints: Option<Joints>) -> Self {
        match joints {
            Some(j) => DetectionResult::Found(j),
            None => DetectionResult::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub hand: DetectionResult,
    pub body: DetectionResult,
}

impl LandmarkFrame {
    pub fn missing() -> Self {
        Self {
            hand: DetectionResult::NotFound,
            body: DetectionResult::NotFound,
        }
    }
}

/// Selects which joints feed a signal and how they are normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSelection {
    pub joints: Vec<String>,
    /// Joints whose centroid is subtracted from every selected joint.
    pub reference: Vec<String>,
    pub dims: usize,
}

impl JointSelection {
    pub fn width(&self) -> usize {
        self.joints.len() * self.dims
    }

    /// Flattened reference-relative row, or `None` when a joint is missing.
    pub fn relative_row(&self, joints: &Joints) -> Option<Vec<f64>> {
        let origin = self.reference_point(joints)?;
        let mut row = Vec::with_capacity(self.width());
        for name in &self.joints {
            let p = joints.get(name)?;
            if p.len() < self.dims {
                return None;
            }
            row.extend(p[..self.dims].iter().zip(&origin).map(|(v, o)| v - o));
        }
        Some(row)
    }

    fn reference_point(&self, joints: &Joints) -> Option<Vec<f64>> {
        let mut origin = vec![0.0; self.dims];
        if self.reference.is_empty() {
            return Some(origin);
        }
        for name in &self.reference {
            let p = joints.get(name)?;
            if p.len() < self.dims {
                return None;
            }
            for (o, v) in origin.iter_mut().zip(p) {
                *o += v;
            }
        }
        let n = self.reference.len() as f64;
        origin.iter_mut().for_each(|o| *o /= n);
        Some(origin)
    }
}

/// Per-tick provider of landmark frames.
///
/// `Ok(None)` ends the capture loop; `Err` is a failure for the current
/// frame only and is recovered as "no detection".
pub trait LandmarkSource {
    fn next_frame(&mut self) -> Result<Option<LandmarkFrame>>;
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    hand: Option<Joints>,
    #[serde(default)]
    body: Option<Joints>,
}

/// Reads one JSON object per line, as written by an external extractor.
pub struct JsonLinesSource<R> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0 }
    }
}

impl JsonLinesSource<Box<dyn BufRead>> {
    /// Open a file, or stdin when `path` is `-`.
    pub fn open(path: &Path) -> Result<Self> {
        let reader: Box<dyn BufRead> = if path == Path::new("-") {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let f = File::open(path)
                .with_context(|| format!("failed to open landmark stream {}", path.display()))?;
            Box::new(BufReader::new(f))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                break;
            }
        }
        let rec: FrameRecord = serde_json::from_str(line.trim())
            .with_context(|| format!("bad landmark record on line {}", self.line_no))?;
        Ok(Some(LandmarkFrame {
            hand: rec.hand.into(),
            body: rec.body.into(),
        }))
    }
}

#[cfg(test)]
pub(crate) fn joints(points: &[(&str, &[f64])]) -> Joints {
    points
        .iter()
        .map(|(name, p)| (name.to_string(), p.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn selection(joints: &[&str], reference: &[&str], dims: usize) -> JointSelection {
        JointSelection {
            joints: joints.iter().map(|s| s.to_string()).collect(),
            reference: reference.iter().map(|s| s.to_string()).collect(),
            dims,
        }
    }

    #[test]
    fn row_is_relative_to_reference_centroid() {
        let sel = selection(&["a", "b"], &["l", "r"], 2);
        let j = joints(&[
            ("a", &[1.0, 1.0]),
            ("b", &[3.0, 2.0]),
            ("l", &[0.0, 0.0]),
            ("r", &[2.0, 0.0]),
        ]);
        assert_eq!(sel.relative_row(&j), Some(vec![0.0, 1.0, 2.0, 2.0]));
    }

    #[test]
    fn extra_coordinates_are_ignored() {
        let sel = selection(&["a"], &[], 2);
        let j = joints(&[("a", &[0.5, 0.25, 9.0])]);
        assert_eq!(sel.relative_row(&j), Some(vec![0.5, 0.25]));
    }

    #[test]
    fn missing_or_short_joint_yields_none() {
        let sel = selection(&["a", "b"], &["ref"], 3);
        let missing = joints(&[("a", &[0.0, 0.0, 0.0]), ("ref", &[0.0, 0.0, 0.0])]);
        assert!(sel.relative_row(&missing).is_none());

        let short = joints(&[
            ("a", &[0.0, 0.0, 0.0]),
            ("b", &[0.0, 0.0]),
            ("ref", &[0.0, 0.0, 0.0]),
        ]);
        assert!(sel.relative_row(&short).is_none());

        let no_ref = joints(&[("a", &[0.0, 0.0, 0.0]), ("b", &[0.0, 0.0, 0.0])]);
        assert!(sel.relative_row(&no_ref).is_none());
    }

    #[test]
    fn json_lines_source_reads_frames_and_skips_blank_lines() {
        let input = concat!(
            "{\"hand\": {\"thumb_tip\": [0.1, 0.2]}, \"body\": null}\n",
            "\n",
            "{\"body\": {\"left_wrist\": [0.0, 1.0, 2.0]}}\n",
        );
        let mut src = JsonLinesSource::new(Cursor::new(input));

        let first = src.next_frame().unwrap().unwrap();
        assert!(matches!(first.hand, DetectionResult::Found(ref j) if j.contains_key("thumb_tip")));
        assert_eq!(first.body, DetectionResult::NotFound);

        let second = src.next_frame().unwrap().unwrap();
        assert_eq!(second.hand, DetectionResult::NotFound);
        assert!(matches!(second.body, DetectionResult::Found(_)));

        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_a_per_frame_error() {
        let input = "not json\n{}\n";
        let mut src = JsonLinesSource::new(Cursor::new(input));
        assert!(src.next_frame().is_err());
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame, LandmarkFrame::missing());
    }
}
