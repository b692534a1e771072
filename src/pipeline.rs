pub mod controller;
pub mod modes;
pub mod runner;

use anyhow::{Result, bail};
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, atomic::AtomicBool},
};

use crate::config::{Config, validate_config};
use crate::error::PipelineError;
use crate::landmarks::JsonLinesSource;

pub use controller::PipelineController;
pub use modes::{BuildMode, Mode, RealTimeMode, run_validation};
pub use runner::run_loop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Build,
    Validate,
    RealTime,
}

impl FromStr for ModeKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "build" | "dataset" => Ok(ModeKind::Build),
            "validate" => Ok(ModeKind::Validate),
            "realtime" | "real_time" | "real-time" => Ok(ModeKind::RealTime),
            _ => Err(PipelineError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModeKind::Build => "build",
            ModeKind::Validate => "validate",
            ModeKind::RealTime => "realtime",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Landmark stream; `-` reads stdin.
    pub source: PathBuf,
    /// Allow Build mode to replace an existing database file.
    pub overwrite: bool,
}

fn stop_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&stop))?;
    }
    Ok(stop)
}

/// One-time mode dispatch. Configuration problems surface before any loop starts.
pub fn dispatch(kind: ModeKind, cfg: &Config, opts: &RunOptions) -> Result<()> {
    validate_config(cfg, kind)?;
    info!("mode: {kind}");

    match kind {
        ModeKind::Build => {
            if cfg.build.database.exists() && !opts.overwrite {
                bail!(
                    "{} already exists; pass --overwrite or choose another --db",
                    cfg.build.database.display()
                );
            }
            let mode = BuildMode::new(cfg);
            capture(cfg, mode, opts)
        }
        ModeKind::Validate => {
            run_validation(cfg)?;
            Ok(())
        }
        ModeKind::RealTime => {
            let mode = RealTimeMode::from_config(cfg)?;
            capture(cfg, mode, opts)
        }
    }
}

fn capture<M: Mode>(cfg: &Config, mode: M, opts: &RunOptions) -> Result<()> {
    let mut source = JsonLinesSource::open(&opts.source)?;
    let stop = stop_flag()?;
    let mut controller = PipelineController::new(cfg, mode);
    run_loop(&mut controller, &mut source, cfg.tick_period(), &stop)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_parse() {
        assert_eq!("build".parse::<ModeKind>().unwrap(), ModeKind::Build);
        assert_eq!("dataset".parse::<ModeKind>().unwrap(), ModeKind::Build);
        assert_eq!("Validate".parse::<ModeKind>().unwrap(), ModeKind::Validate);
        assert_eq!("real_time".parse::<ModeKind>().unwrap(), ModeKind::RealTime);
        assert!(matches!(
            "train".parse::<ModeKind>(),
            Err(PipelineError::InvalidMode(m)) if m == "train"
        ));
    }

    #[test]
    fn display_round_trips() {
        for kind in [ModeKind::Build, ModeKind::Validate, ModeKind::RealTime] {
            assert_eq!(kind.to_string().parse::<ModeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn invalid_configuration_stops_before_the_loop() {
        let cfg = Config::default();
        let opts = RunOptions {
            source: PathBuf::from("/nonexistent/stream.jsonl"),
            overwrite: false,
        };
        let err = dispatch(ModeKind::RealTime, &cfg, &opts).unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }
}
