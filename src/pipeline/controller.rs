//! Stage state machine: trigger wait -> tracking -> reducing -> persist | classify.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

use super::modes::Mode;
use crate::buffer::TemporalBuffer;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::landmarks::{DetectionResult, JointSelection, LandmarkFrame};
use crate::sample::GestureSample;
use crate::trigger::{NOT_FIRING, TriggerDetector};

/// A finished tracking window waiting to be reduced.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedGesture {
    pub trajectory: Vec<Vec<f64>>,
    pub duration: Duration,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    TriggerWait,
    Tracking {
        started: Instant,
        label: Option<String>,
    },
    Reducing(CapturedGesture),
    Persist(GestureSample),
    Classify(GestureSample),
}

impl Stage {
    pub fn index(&self) -> u8 {
        match self {
            Stage::TriggerWait => 0,
            Stage::Tracking { .. } => 1,
            Stage::Reducing(_) => 2,
            Stage::Persist(_) => 3,
            Stage::Classify(_) => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::TriggerWait => "trigger-wait",
            Stage::Tracking { .. } => "tracking",
            Stage::Reducing(_) => "reducing",
            Stage::Persist(_) => "persist",
            Stage::Classify(_) => "classify",
        }
    }
}

/// What a single tick did, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Waiting {
        closeness: f64,
    },
    Triggered {
        closeness: f64,
        label: Option<String>,
    },
    Tracking {
        frames: usize,
    },
    Persisted {
        label: String,
        count: usize,
        degenerate: bool,
    },
    Classified {
        label: String,
        elapsed: Duration,
        degenerate: bool,
    },
}

#[derive(Debug)]
pub struct PipelineState {
    stage: Stage,
    trigger: TriggerDetector,
    tracking: TemporalBuffer,
    closeness: f64,
    gestures: usize,
}

pub struct PipelineController<M> {
    cfg: Config,
    tracking_selection: JointSelection,
    tracking_duration: Duration,
    mode: M,
    state: PipelineState,
}

impl<M: Mode> PipelineController<M> {
    pub fn new(cfg: &Config, mode: M) -> Self {
        let tracking_selection = cfg.tracking_selection();
        let state = PipelineState {
            stage: Stage::TriggerWait,
            trigger: TriggerDetector::new(
                cfg.trigger_selection(),
                cfg.trigger.window_length,
                cfg.trigger.distance_threshold,
            ),
            tracking: TemporalBuffer::new(tracking_selection.width()),
            closeness: NOT_FIRING,
            gestures: 0,
        };
        Self {
            cfg: cfg.clone(),
            tracking_selection,
            tracking_duration: cfg.tracking_duration(),
            mode,
            state,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.state.stage
    }

    #[cfg(test)]
    pub fn closeness(&self) -> f64 {
        self.state.closeness
    }

    /// Gestures completed so far (persisted in Build mode).
    pub fn gestures(&self) -> usize {
        self.state.gestures
    }

    #[cfg(test)]
    pub fn trigger_buffer(&self) -> &TemporalBuffer {
        self.state.trigger.buffer()
    }

    #[cfg(test)]
    pub fn tracking_buffer(&self) -> &TemporalBuffer {
        &self.state.tracking
    }

    pub fn mode(&self) -> &M {
        &self.mode
    }

    pub fn mode_mut(&mut self) -> &mut M {
        &mut self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.mode
            .gesture_limit()
            .is_some_and(|max| self.state.gestures >= max)
    }

    /// Label the operator should perform next, if the mode assigns one.
    pub fn next_prompt(&self) -> Option<String> {
        self.mode.prompt(self.state.gestures)
    }

    /// Advance the state machine by one frame captured at `now`.
    pub fn tick(&mut self, now: Instant, frame: &LandmarkFrame) -> Result<TickEvent> {
        match std::mem::replace(&mut self.state.stage, Stage::TriggerWait) {
            Stage::TriggerWait => Ok(self.wait_for_trigger(now, &frame.hand)),
            Stage::Tracking { started, label } => self.track(now, started, label, &frame.body),
            pending => {
                self.state.stage = pending;
                self.complete()
            }
        }
    }

    fn wait_for_trigger(&mut self, now: Instant, hand: &DetectionResult) -> TickEvent {
        let reading = self.state.trigger.observe(hand);
        self.state.closeness = reading.closeness;
        if !reading.fired {
            return TickEvent::Waiting {
                closeness: reading.closeness,
            };
        }

        let label = self.mode.prompt(self.state.gestures);
        match &label {
            Some(l) => info!(
                "trigger fired (closeness {:.4}); tracking gesture '{l}'",
                reading.closeness
            ),
            None => info!("trigger fired (closeness {:.4}); tracking", reading.closeness),
        }
        self.state.trigger.reset();
        self.state.tracking.reset();
        self.state.closeness = NOT_FIRING;
        self.state.stage = Stage::Tracking {
            started: now,
            label: label.clone(),
        };
        TickEvent::Triggered {
            closeness: reading.closeness,
            label,
        }
    }

    fn track(
        &mut self,
        now: Instant,
        started: Instant,
        label: Option<String>,
        body: &DetectionResult,
    ) -> Result<TickEvent> {
        self.observe_body(body);

        let elapsed = now.saturating_duration_since(started);
        if elapsed <= self.tracking_duration {
            self.state.stage = Stage::Tracking { started, label };
            return Ok(TickEvent::Tracking {
                frames: self.state.tracking.history().len(),
            });
        }

        let trajectory = self.state.tracking.history().to_vec();
        info!(
            "tracking finished: {} frames in {:.2}s",
            trajectory.len(),
            elapsed.as_secs_f64()
        );
        self.state.stage = Stage::Reducing(CapturedGesture {
            trajectory,
            duration: elapsed,
            label,
        });
        self.complete()
    }

    fn observe_body(&mut self, body: &DetectionResult) {
        let row = match body {
            DetectionResult::Found(joints) => self.tracking_selection.relative_row(joints),
            DetectionResult::NotFound => None,
        };
        let pushed = row.is_some_and(|r| self.state.tracking.push(r).is_ok());
        if !pushed {
            debug!("no usable body pose; replicating last tracked row");
            self.state.tracking.replicate_last();
        }
    }

    /// Run the stages that need no new frame, back to trigger wait.
    fn complete(&mut self) -> Result<TickEvent> {
        loop {
            match std::mem::replace(&mut self.state.stage, Stage::TriggerWait) {
                Stage::Reducing(captured) => {
                    let sample = GestureSample::capture(
                        &self.cfg,
                        captured.trajectory,
                        captured.duration,
                        captured.label,
                    )?;
                    if sample.is_degenerate() {
                        warn!("degenerate sample: tracking captured a single frame");
                    }
                    self.state.stage = self.mode.completion_stage(sample);
                }
                Stage::Persist(sample) => return self.persist(sample),
                Stage::Classify(sample) => return self.classify(sample),
                idle => {
                    self.state.stage = idle;
                    return Ok(TickEvent::Waiting {
                        closeness: self.state.closeness,
                    });
                }
            }
        }
    }

    fn persist(&mut self, sample: GestureSample) -> Result<TickEvent> {
        let label = sample.label.clone().unwrap_or_default();
        let degenerate = sample.is_degenerate();

        // a failed save still leaves the sample in the in-memory database
        let result = self.mode.persist(sample);
        if result
            .as_ref()
            .map_or_else(PipelineError::is_persistence, |_| true)
        {
            self.state.gestures += 1;
        }
        result?;

        info!(
            "saved gesture '{label}' ({} captured)",
            self.state.gestures
        );
        if !self.is_finished() {
            if let Some(next) = self.next_prompt() {
                info!("next gesture: '{next}'");
            }
        }
        Ok(TickEvent::Persisted {
            label,
            count: self.state.gestures,
            degenerate,
        })
    }

    fn classify(&mut self, sample: GestureSample) -> Result<TickEvent> {
        let degenerate = sample.is_degenerate();
        let prediction = self.mode.classify(&sample)?;
        self.state.gestures += 1;
        info!(
            "gesture classified as '{}' in {:.3} ms",
            prediction.label,
            prediction.elapsed.as_secs_f64() * 1e3
        );
        Ok(TickEvent::Classified {
            label: prediction.label,
            elapsed: prediction.elapsed,
            degenerate,
        })
    }
}
