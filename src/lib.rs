// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod depfile;
pub mod engine;
pub mod env;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod logging;
pub mod stale;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{build_graph, load_and_validate};
use crate::engine::{Build, RunOptions};
use crate::exec::RealExecutorBackend;
use crate::store::FileRecordStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - the on-disk record store
/// - the build runtime with the real process executor
///
/// and prints the report (or, with `--dry-run`, the plan) to stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    let (graph, names) = build_graph(&cfg)?;
    debug!(tasks = names.len(), root = ?graph.root(), "task graph built");

    let store = FileRecordStore::open(cfg.state_dir())?;
    let options = RunOptions {
        jobs: args.jobs.unwrap_or_else(|| cfg.effective_jobs()).max(1),
        on_failure: cfg.config.on_failure,
    };
    info!(jobs = options.jobs, on_failure = ?options.on_failure, "starting build");

    let mut build = Build::new(graph, Box::new(store)).with_options(options);

    if args.dry_run {
        let plan = match &args.target {
            Some(target) => build.plan_target(target)?,
            None => build.plan()?,
        };
        println!("{plan}");
        debug!("dry-run complete (no execution)");
        return Ok(());
    }

    let report = match &args.target {
        Some(target) => build.build_target(target, RealExecutorBackend::new).await?,
        None => build.build_all(RealExecutorBackend::new).await?,
    };

    println!("{report}");

    if !report.is_success() {
        bail!("{} task(s) failed", report.failed().len());
    }
    Ok(())
}
