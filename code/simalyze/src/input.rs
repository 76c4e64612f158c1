// Locate and read the logs of a run, and settle the run's parameters.

use crate::ComputeArgs;

use anyhow::Result;
use rustutils::{read_run_config, RunConfig};
use simlog::{
    classify_run_directory, read_active_logs, ActiveUtilizationAggregator, AnalysisError, Observer,
    ResourceEventLog, RunFiles,
};
use std::path::Path;

pub struct Run {
    pub config: RunConfig,
    pub files: RunFiles,
    pub active: Vec<ResourceEventLog>,
    pub stop_time: f64,
}

/// `path` is a run directory or a run configuration file.  An explicit `stop_time` overrides the
/// configured one.  The core logs are read here since the default stop time depends on them; the
/// other logs are read by the commands that need them.

pub fn load_run(path: &Path, stop_time: Option<f64>) -> Result<Run> {
    let mut config = if path.is_dir() {
        RunConfig::for_directory(path)
    } else {
        read_run_config(path)?
    };
    if stop_time.is_some() {
        config.stop_time = stop_time;
    }
    tracing::debug!("Run directory: {}", config.path.display());

    let files = classify_run_directory(&config.path)?;
    for p in &files.ignored {
        tracing::warn!("Ignoring {}", p.display());
    }
    tracing::info!(
        "Found {} core logs and {} job slot logs",
        files.active.len(),
        files.passive.len()
    );

    let active = read_active_logs(&files.active)?;
    let stop_time = match config.stop_time {
        Some(t) => t,
        None => default_stop_time(&active)?,
    };
    tracing::debug!("Stop time: {stop_time}");

    Ok(Run {
        config,
        files,
        active,
        stop_time,
    })
}

// The simulator logs the final state of every core at the end of the run, so the last timestamp of
// the core logs is the end of the simulation.  Take the latest one in case they differ.

fn default_stop_time(logs: &[ResourceEventLog]) -> Result<f64, AnalysisError> {
    logs.iter()
        .filter_map(|l| l.records.last().map(|r| r.timestamp))
        .reduce(f64::max)
        .ok_or(AnalysisError::NoResources("active"))
}

#[cfg(feature = "parallel")]
pub fn active_aggregator<'a>(
    observer: &'a dyn Observer,
    compute_args: &ComputeArgs,
) -> ActiveUtilizationAggregator<'a> {
    let aggregator = ActiveUtilizationAggregator::new(observer);
    match compute_args.threads {
        Some(n) => aggregator.with_threads(n),
        None => aggregator,
    }
}

#[cfg(not(feature = "parallel"))]
pub fn active_aggregator<'a>(
    observer: &'a dyn Observer,
    compute_args: &ComputeArgs,
) -> ActiveUtilizationAggregator<'a> {
    if compute_args.threads.is_some() {
        tracing::warn!("--threads has no effect without the `parallel` feature");
    }
    ActiveUtilizationAggregator::new(observer)
}

#[cfg(test)]
use simlog::StateRecord;

#[test]
fn test_default_stop_time() {
    let mk = |ts: &[f64]| ResourceEventLog {
        name: ustr::ustr("core"),
        records: ts
            .iter()
            .map(|&timestamp| StateRecord {
                timestamp,
                value: 0,
            })
            .collect(),
    };
    assert!(default_stop_time(&[mk(&[0.0, 90.0]), mk(&[]), mk(&[5.0, 120.5])]).unwrap() == 120.5);
    assert!(default_stop_time(&[mk(&[])]).is_err());
    assert!(default_stop_time(&[]).is_err());
}

#[test]
fn test_load_run() {
    let run = load_run(Path::new("../tests/simlog/run1"), None).unwrap();
    assert!(run.active.len() == 2);
    assert!(run.stop_time == 100.0);
    assert!(run.config.resample_interval == rustutils::DEFAULT_RESAMPLE_INTERVAL);

    let run = load_run(Path::new("../tests/simlog/run1"), Some(250.0)).unwrap();
    assert!(run.stop_time == 250.0);
}
