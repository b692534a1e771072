use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use std::{env, ffi::OsString, path::PathBuf};

use crate::config::Config;
use crate::database::GestureDatabase;
use crate::pipeline::{self, ModeKind, RunOptions};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("build") => {
            let mut cfg = load_config(&mut pargs)?;
            if let Some(db) = pargs.opt_value_from_str::<_, PathBuf>("--db")? {
                cfg.build.database = db;
            }
            if let Some(max) = pargs.opt_value_from_str::<_, usize>("--max")? {
                cfg.build.max_gestures = Some(max);
            }
            let opts = run_options(&mut pargs)?;
            warn_unused(pargs.finish());
            pipeline::dispatch(ModeKind::Build, &cfg, &opts)
        }

        Some("validate") => {
            let mut cfg = load_config(&mut pargs)?;
            apply_dataset_overrides(&mut pargs, &mut cfg)?;
            if let Some(results) = pargs.opt_value_from_str::<_, PathBuf>("--results")? {
                cfg.validate.results = results;
            }
            warn_unused(pargs.finish());
            let opts = RunOptions {
                source: PathBuf::from("-"),
                overwrite: false,
            };
            pipeline::dispatch(ModeKind::Validate, &cfg, &opts)
        }

        Some("realtime") => {
            let mut cfg = load_config(&mut pargs)?;
            apply_dataset_overrides(&mut pargs, &mut cfg)?;
            let opts = run_options(&mut pargs)?;
            warn_unused(pargs.finish());
            pipeline::dispatch(ModeKind::RealTime, &cfg, &opts)
        }

        Some("inspect") => {
            let paths: Vec<PathBuf> = pargs.finish().into_iter().map(PathBuf::from).collect();
            if paths.is_empty() {
                return Err(anyhow!("usage: gesturectl inspect <db.json>..."));
            }
            for p in paths {
                let db = GestureDatabase::load_file(&p)?;
                print_response(&serde_json::json!({
                    "path": p,
                    "summary": db.summary(),
                }));
            }
            Ok(())
        }

        Some(other) => {
            // still accept the mode names used in older configs
            if let Ok(kind) = other.parse::<ModeKind>() {
                return Err(anyhow!("use the '{kind}' subcommand instead of '{other}'"));
            }
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn load_config(pargs: &mut Arguments) -> Result<Config> {
    match pargs.opt_value_from_str::<_, PathBuf>("--config")? {
        Some(path) => Config::load(&path),
        None => Config::load_or_install_default(),
    }
}

fn apply_dataset_overrides(pargs: &mut Arguments, cfg: &mut Config) -> Result<()> {
    let files: Vec<PathBuf> = pargs.values_from_str("--file")?;
    if !files.is_empty() {
        cfg.dataset.files = files;
    }
    if let Some(p) = pargs.opt_value_from_str::<_, f64>("--proportion")? {
        cfg.dataset.proportion = p;
    }
    Ok(())
}

fn run_options(pargs: &mut Arguments) -> Result<RunOptions> {
    let source = pargs
        .opt_value_from_str::<_, PathBuf>("--source")?
        .unwrap_or_else(|| PathBuf::from("-"));
    Ok(RunOptions {
        source,
        overwrite: pargs.contains("--overwrite"),
    })
}

fn warn_unused(rest: Vec<OsString>) {
    if !rest.is_empty() {
        warn!("ignoring unexpected arguments: {rest:?}");
    }
}

fn print_help() {
    println!(
        r#"gesturectl - landmark-stream gesture capture and classification

USAGE:
  gesturectl help [command]     Show general or command-specific help
  gesturectl build              Capture labeled gestures into a database
  gesturectl validate           Evaluate the classifier on held-out samples
  gesturectl realtime           Classify gestures as they are performed
  gesturectl inspect <db>...    Summarize gesture databases

COMMON OPTIONS:
  --config <path>               Config file (default ~/.config/gesturectl/config.toml)

TIPS:
  - Landmark frames are read as JSON lines from --source (default stdin):
      {{"hand": {{"thumb_tip": [x, y], ...}}, "body": {{"left_wrist": [x, y, z], ...}}}}
  - Use null for a part that was not detected in that frame.
  - RUST_LOG=debug shows per-frame closeness and detection fallbacks.
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "build" => println!(
            "usage: gesturectl build [--config P] [--db P] [--max N] [--source P|-] [--overwrite]\nPrompts for each configured label and saves the database after every capture."
        ),
        "validate" => println!(
            "usage: gesturectl validate [--config P] [--file P]... [--proportion F] [--results P]\nSplits the databases per label, fits k-NN and writes a results file."
        ),
        "realtime" => println!(
            "usage: gesturectl realtime [--config P] [--file P]... [--proportion F] [--source P|-]\nFits k-NN on the training split and classifies each triggered gesture."
        ),
        "inspect" => println!(
            "usage: gesturectl inspect <db.json>...\nPrints per-label sample counts, feature dimension and degenerate captures."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
