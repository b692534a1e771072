use anyhow::Result;
use log::{debug, error, info, warn};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use super::controller::{PipelineController, TickEvent};
use super::modes::Mode;
use crate::landmarks::{LandmarkFrame, LandmarkSource};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: usize,
    pub late_ticks: usize,
    pub gestures: usize,
}

/// Fixed-rate capture loop. One frame per tick, no overlap: a tick that
/// overruns `period` just makes the next one start late.
///
/// Stops on `stop`, when the source runs dry, or when the mode's gesture
/// limit is reached.
pub fn run_loop<M: Mode, S: LandmarkSource + ?Sized>(
    controller: &mut PipelineController<M>,
    source: &mut S,
    period: Duration,
    stop: &AtomicBool,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    info!(
        "{} loop started ({:.0} ms period)",
        controller.mode().name(),
        period.as_secs_f64() * 1e3
    );
    if let Some(first) = controller.next_prompt() {
        info!("next gesture: '{first}'");
    }

    loop {
        if stop.load(Ordering::Relaxed) {
            info!("stop requested");
            break;
        }
        if controller.is_finished() {
            info!("gesture limit reached");
            break;
        }

        let tick_start = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("landmark stream ended");
                break;
            }
            Err(e) => {
                warn!("landmark extraction failed: {e:#}");
                LandmarkFrame::missing()
            }
        };

        match controller.tick(tick_start, &frame) {
            Ok(TickEvent::Waiting { closeness }) => debug!("closeness {closeness:.4}"),
            Ok(event) => {
                let stage = controller.stage();
                debug!("[{} {}] {event:?}", stage.index(), stage.name());
            }
            Err(e) if e.is_persistence() => {
                error!("{e}; sample kept in memory, save will be retried");
            }
            Err(e) => {
                // still flush what we have before bailing out
                if let Err(flush) = controller.mode_mut().finish() {
                    error!("{flush}");
                }
                return Err(e.into());
            }
        }
        summary.ticks += 1;

        let spent = tick_start.elapsed();
        if spent < period {
            thread::sleep(period - spent);
        } else {
            summary.late_ticks += 1;
            debug!(
                "tick overran period by {:.1} ms",
                (spent - period).as_secs_f64() * 1e3
            );
        }
    }

    controller.mode_mut().finish()?;
    summary.gestures = controller.gestures();
    info!(
        "loop finished: {} ticks ({} late), {} gestures",
        summary.ticks, summary.late_ticks, summary.gestures
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::landmarks::{DetectionResult, joints};
    use crate::pipeline::modes::BuildMode;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct ScriptedSource {
        frames: VecDeque<Result<LandmarkFrame>>,
    }

    impl LandmarkSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<LandmarkFrame>> {
            match self.frames.pop_front() {
                Some(Ok(f)) => Ok(Some(f)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    fn pinch_frame() -> LandmarkFrame {
        LandmarkFrame {
            hand: DetectionResult::Found(joints(&[
                ("wrist", &[0.5, 0.9]),
                ("thumb_tip", &[0.5, 0.5]),
                ("index_finger_tip", &[0.5, 0.5]),
            ])),
            body: DetectionResult::Found(joints(&[
                ("left_shoulder", &[0.4, 0.4, 0.0]),
                ("right_shoulder", &[0.6, 0.4, 0.0]),
                ("left_wrist", &[0.3, 0.6, 0.1]),
                ("right_wrist", &[0.7, 0.6, 0.1]),
            ])),
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut cfg = Config::default();
        cfg.trigger.joints = vec!["thumb_tip".into(), "index_finger_tip".into()];
        cfg.trigger.reference = vec!["wrist".into()];
        cfg.trigger.window_length = 1;
        cfg.tracking.duration_s = 0.0001;
        cfg.build.labels = vec!["F".into()];
        cfg.build.repetitions = 2;
        cfg.build.database = dir.path().join("db.json");
        cfg
    }

    #[test]
    fn stop_flag_prevents_any_tick() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut ctl = PipelineController::new(&cfg, BuildMode::new(&cfg));
        let mut src = ScriptedSource {
            frames: VecDeque::from(vec![Ok(pinch_frame())]),
        };
        let stop = AtomicBool::new(true);
        let summary = run_loop(&mut ctl, &mut src, Duration::ZERO, &stop).unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(src.frames.len(), 1);
    }

    #[test]
    fn source_errors_are_recovered_and_limit_ends_loop() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut ctl = PipelineController::new(&cfg, BuildMode::new(&cfg));
        let mut frames: VecDeque<Result<LandmarkFrame>> = VecDeque::new();
        for _ in 0..20 {
            frames.push_back(Err(anyhow::anyhow!("camera hiccup")));
            frames.push_back(Ok(pinch_frame()));
        }
        let mut src = ScriptedSource { frames };
        let stop = AtomicBool::new(false);

        let summary =
            run_loop(&mut ctl, &mut src, Duration::from_millis(1), &stop).unwrap();
        assert_eq!(summary.gestures, 2);
        assert!(ctl.is_finished());
        assert!(!src.frames.is_empty(), "loop should stop at the gesture limit");
        let saved = crate::database::GestureDatabase::load_file(&cfg.build.database).unwrap();
        assert_eq!(saved.samples("F").len(), 2);
    }

    #[test]
    fn exhausted_source_ends_loop() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut ctl = PipelineController::new(&cfg, BuildMode::new(&cfg));
        let mut src = ScriptedSource {
            frames: VecDeque::new(),
        };
        let stop = AtomicBool::new(false);
        let summary = run_loop(&mut ctl, &mut src, Duration::ZERO, &stop).unwrap();
        assert_eq!(summary, RunSummary::default());
    }
}
