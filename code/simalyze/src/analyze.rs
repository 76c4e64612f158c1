// The full analysis of a run.
//
// Everything is computed first: the core utilization, the job slot utilization, the throughput per
// job type, the response times, and the tables.  Only then is the output directory created and
// written, and the report printed.  The report goes to `output` and to `results.txt` in the run
// directory; the tables and `metadata.json` go to the output directory (`results` by default):
//
//   metadata.json                 the Metadata record
//   utilization.csv               time_start,delta_state,busy_cores,utilization
//   utilization-resampled.csv     time,utilization
//   throughput-simulated.csv      type,count,throughput
//   walltimes.csv                 type,time,response_time
//   throughput-comparison.csv     type,measured,simulated   (only with a throughput reference)

use crate::input::{self, Run};
use crate::ComputeArgs;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use simlog::{
    compare_throughput, count_records, read_passive_pools, read_response_times, resample,
    response_summary, simulation_days, throughput_table, utilization_table, walltime_table,
    Metadata, PassiveUtilizationAggregator, ResponseSummary, Rounding, Sample, Throughput,
    ThroughputComparison, TracingObserver, UtilizationReport, UtilizationRow, WalltimeRow,
};
use std::fs;
use std::io;
use std::path::Path;

pub const REPORT_FILE: &str = "results.txt";

struct Analysis {
    report: UtilizationReport,
    metadata: Metadata,
    throughput: Vec<Throughput>,
    responses: Vec<ResponseSummary>,
    reference_utilization: Option<f64>,
    rows: Vec<UtilizationRow>,
    resampled: Vec<Sample>,
    walltimes: Vec<WalltimeRow>,
    comparison: Option<Vec<ThroughputComparison>>,
}

pub fn analyze_and_write(
    output: &mut dyn io::Write,
    run: &Run,
    compute_args: &ComputeArgs,
) -> Result<()> {
    let analysis = analyze(run, compute_args)?;

    let outdir = run.config.output_dir();
    fs::create_dir_all(&outdir)
        .with_context(|| format!("Could not create {}", outdir.display()))?;
    let meta_file = outdir.join("metadata.json");
    fs::write(&meta_file, serde_json::to_string_pretty(&analysis.metadata)?)
        .with_context(|| format!("Could not create {}", meta_file.display()))?;
    write_csv(&outdir.join("utilization.csv"), &analysis.rows)?;
    write_csv(&outdir.join("utilization-resampled.csv"), &analysis.resampled)?;
    write_csv(&outdir.join("throughput-simulated.csv"), &analysis.throughput)?;
    write_csv(&outdir.join("walltimes.csv"), &analysis.walltimes)?;
    if let Some(ref comparison) = analysis.comparison {
        write_csv(&outdir.join("throughput-comparison.csv"), comparison)?;
    }

    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let text = report_text(&analysis, &now);
    let report_file = run.config.path.join(REPORT_FILE);
    fs::write(&report_file, &text)
        .with_context(|| format!("Could not create {}", report_file.display()))?;
    output.write_all(text.as_bytes())?;
    Ok(())
}

fn analyze(run: &Run, compute_args: &ComputeArgs) -> Result<Analysis> {
    let observer = TracingObserver;

    let total_path = match run.files.total_throughput {
        Some(ref p) => p,
        None => bail!(
            "Could not find the total throughput log (Usage_Scenario) in {}",
            run.config.path.display()
        ),
    };

    let active =
        input::active_aggregator(&observer, compute_args).aggregate(&run.active, run.stop_time)?;
    let pools = read_passive_pools(&run.files.passive)?;
    let passive = PassiveUtilizationAggregator::new(&observer).aggregate(&pools, run.stop_time)?;
    let report = UtilizationReport::new(&active, &passive);

    let days = run
        .config
        .simulation_days
        .unwrap_or_else(|| simulation_days(run.stop_time));
    let total_count = count_records(total_path)?;
    let mut counts = vec![];
    for (job_type, path) in &run.files.job_types {
        counts.push((*job_type, count_records(path)?));
    }
    let throughput = throughput_table(&counts, days)?;

    let mut response_logs = vec![];
    for (job_type, path) in &run.files.response_times {
        response_logs.push((*job_type, read_response_times(path)?));
    }
    let walltimes = walltime_table(&response_logs);
    let responses = response_summary(&walltimes);

    let rows = utilization_table(&active);
    let resampled = resample(&rows, run.config.resample_interval, Rounding::Ceil)?;

    let comparison = match run.config.reference_throughput {
        Some(ref p) => Some(compare_throughput(&throughput, &read_reference_throughput(p)?)),
        None => None,
    };

    Ok(Analysis {
        metadata: report.metadata(total_count, days),
        report,
        throughput,
        responses,
        reference_utilization: run.config.reference_utilization,
        rows,
        resampled,
        walltimes,
        comparison,
    })
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Could not create {}", path.display()))?;
    for r in rows {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

// The measured throughput is a CSV file with a `type` column and a `throughput_day` or `throughput`
// column, per-day values.  Other columns are ignored.

fn read_reference_throughput(path: &Path) -> Result<Vec<(String, f64)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let type_col = headers.iter().position(|h| h == "type");
    let value_col = headers
        .iter()
        .position(|h| h == "throughput_day")
        .or_else(|| headers.iter().position(|h| h == "throughput"));
    let (type_col, value_col) = match (type_col, value_col) {
        (Some(t), Some(v)) => (t, v),
        _ => bail!(
            "{} must have the columns 'type' and 'throughput_day' or 'throughput'",
            path.display()
        ),
    };
    let mut result = vec![];
    for record in reader.records() {
        let record = record?;
        let (Some(t), Some(v)) = (record.get(type_col), record.get(value_col)) else {
            bail!("{}: short record {:?}", path.display(), record.position());
        };
        let v = v
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{}: bad throughput value '{v}'", path.display()))?;
        result.push((t.to_string(), v));
    }
    Ok(result)
}

fn report_text(a: &Analysis, now: &str) -> String {
    let r = &a.report;
    let m = &a.metadata;
    let mut s = String::new();
    s += &format!("# Analysis run at {now}\n");
    s += &format!("Results stored in file {REPORT_FILE} (in input directory).\n\n");

    s += "## Core Utilizations\n";
    s += &format!("Number of utilization paths: {}\n", r.core_count);
    s += &format!("Overall utilization: {:.4}\n", r.overall_utilization);
    s += &format!("Average core utilization: {:.4}\n", r.mean_core_utilization);
    if let Some(u) = a.reference_utilization {
        s += &format!("Reference utilization: {u:.4}\n");
    }

    s += "\n## Throughput\n";
    s += &format!("Total throughput (Usage Scenario): {}\n", m.total_count);

    s += "\n## Throughput Per Type\n";
    for t in &a.throughput {
        if m.total_count > 0 {
            let share = t.count as f64 / m.total_count as f64;
            s += &format!("Type {}: {} ({share:.4} relative share)\n", t.job_type, t.count);
        } else {
            s += &format!("Type {}: {}\n", t.job_type, t.count);
        }
    }

    if !a.responses.is_empty() {
        s += "\n## Response Times\n";
        for rt in &a.responses {
            s += &format!(
                "Type {}: {} jobs, mean response time {:.1}s\n",
                rt.job_type, rt.count, rt.mean_response_time
            );
        }
    }

    s += "\n## Jobslot Utilization\n";
    s += &format!("Stop time: {}\n", m.stoptime);
    s += &format!("Simulation days: {:.4}\n", m.simulation_days);
    s += &format!("Number of passive resource paths: {}\n", r.node_count);
    s += &format!(
        "Average allocated jobslots: {:.4} (of {} total jobslots)\n",
        r.average_used_slots, r.total_slots
    );
    s += &format!(
        "Average free slots: {:.4}\n",
        r.total_slots as f64 - r.average_used_slots
    );
    s += &format!("Jobslot utilization: {:.4}\n", r.slot_utilization);
    s
}

#[test]
fn test_analyze_fixture() {
    let run = input::load_run(Path::new("../tests/simlog/run1"), None).unwrap();
    let a = analyze(&run, &ComputeArgs::default()).unwrap();
    assert!(a.report.core_count == 2);
    assert!((a.report.overall_utilization - 0.6).abs() < 1e-12);
    assert!((a.report.mean_core_utilization - 0.6).abs() < 1e-12);
    assert!(a.report.total_slots == 4);
    assert!((a.report.average_used_slots - 2.4).abs() < 1e-12);
    assert!(a.metadata.total_count == 5);
    assert!(a.metadata.stoptime == 100.0);
    assert!(a.rows.len() == 7);
    assert!(a.throughput.len() == 2);
    assert!(a.throughput[0].job_type == "analysis" && a.throughput[0].count == 3);
    assert!(a.walltimes.len() == 5);
    assert!(a.comparison.is_none());

    let text = report_text(&a, "2024-01-01 00:00:00");
    assert!(text.starts_with("# Analysis run at 2024-01-01 00:00:00\n"));
    assert!(text.contains("Overall utilization: 0.6000\n"));
    assert!(text.contains("Type reco: 2 (0.4000 relative share)\n"));
    assert!(text.contains("Average allocated jobslots: 2.4000 (of 4 total jobslots)\n"));
    assert!(text.contains("Jobslot utilization: 0.6000\n"));
}

#[test]
fn test_reference_throughput() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("reference.csv");
    fs::write(&p, ",type,throughput_day,jobs\n0,analysis,120.5,3\n1,reco,40,2\n").unwrap();
    let r = read_reference_throughput(&p).unwrap();
    assert!(r == vec![("analysis".to_string(), 120.5), ("reco".to_string(), 40.0)]);

    fs::write(&p, "type,throughput\nanalysis,1.5\n").unwrap();
    assert!(read_reference_throughput(&p).unwrap()[0].1 == 1.5);

    fs::write(&p, "kind,throughput\nanalysis,1.5\n").unwrap();
    assert!(read_reference_throughput(&p).is_err());
}

// This tests:
//  - that a result file which cannot be written is named in the error
//
// A directory standing where the file should go makes the write fail.

#[cfg(test)]
fn copy_fixture(to: &Path) {
    for entry in fs::read_dir("../tests/simlog/run1").unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
    }
}

#[test]
fn test_unwritable_results() {
    for blocked in ["results/metadata.json", REPORT_FILE] {
        let dir = tempfile::tempdir().unwrap();
        copy_fixture(dir.path());
        fs::create_dir_all(dir.path().join(blocked)).unwrap();
        let run = input::load_run(dir.path(), None).unwrap();
        let mut out = vec![];
        let e = analyze_and_write(&mut out, &run, &ComputeArgs::default()).unwrap_err();
        let msg = e.to_string();
        assert!(msg.starts_with("Could not create"), "{msg}");
        assert!(msg.contains(Path::new(blocked).file_name().unwrap().to_str().unwrap()), "{msg}");
        assert!(out.is_empty());
    }
}
