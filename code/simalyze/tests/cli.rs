// Blackbox tests: run the simalyze binary on copies of the test logs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn simalyze(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simalyze"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(o: &Output) -> String {
    String::from_utf8(o.stdout.clone()).unwrap()
}

fn stderr(o: &Output) -> String {
    String::from_utf8(o.stderr.clone()).unwrap()
}

// Copy the run1 fixture into a fresh directory, since `analyze` writes into the run directory.

fn copy_run(to: &Path) -> PathBuf {
    let from = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/simlog/run1");
    let run = to.join("run1");
    fs::create_dir_all(&run).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), run.join(entry.file_name())).unwrap();
    }
    run
}

#[test]
fn test_version() {
    let o = simalyze(&["version"]);
    assert!(o.status.success());
    assert!(stdout(&o).starts_with("simalyze version(0.1.0) features("));
}

#[test]
fn test_missing_argument() {
    let o = simalyze(&["analyze"]);
    assert!(o.status.code() == Some(1));
    assert!(stderr(&o).starts_with("ERROR: Missing argument"));
    assert!(stderr(&o).contains("Usage: simalyze [analyze] <directory-or-config.json>"));
}

#[test]
fn test_no_arguments() {
    let o = simalyze(&[]);
    assert!(o.status.code() == Some(1));
    assert!(stderr(&o).starts_with("ERROR: Missing argument"));
    assert!(stderr(&o).contains("Usage: simalyze"));
}

// A bare path is the same as `analyze` on it, options included.

#[test]
fn test_bare_path() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&[run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o).contains("Overall utilization: 0.6000\n"));
    assert!(run.join("results.txt").exists());

    let o = simalyze(&["--stop-time", "200", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o).contains("Overall utilization: 0.3000\n"));
}

#[test]
fn test_analyze() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&["analyze", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    let text = stdout(&o);
    assert!(text.contains("## Core Utilizations\n"));
    assert!(text.contains("Overall utilization: 0.6000\n"));
    assert!(text.contains("Jobslot utilization: 0.6000\n"));
    assert!(fs::read_to_string(run.join("results.txt")).unwrap() == text);

    let results = run.join("results");
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(results.join("metadata.json")).unwrap()).unwrap();
    assert!(meta["core_count"] == 2);
    assert!(meta["node_count"] == 1);
    assert!(meta["total_slots"] == 4);
    assert!(meta["total_count"] == 5);
    assert!(meta["stoptime"] == 100.0);
    assert!((meta["overall_utilization"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    assert!((meta["avg_used_jobslots"].as_f64().unwrap() - 2.4).abs() < 1e-9);

    let table = fs::read_to_string(results.join("utilization.csv")).unwrap();
    assert!(table.starts_with("time_start,delta_state,busy_cores,utilization\n0.0,1,1,0.5\n"));
    assert!(table.ends_with("100.0,-1,0,0.0\n"));
    for f in ["utilization-resampled.csv", "throughput-simulated.csv", "walltimes.csv"] {
        assert!(results.join(f).exists(), "{f}");
    }
    assert!(!results.join("throughput-comparison.csv").exists());
}

#[test]
fn test_analyze_stop_time() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&["analyze", "--stop-time", "200", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    // Everything is idle after 100.
    assert!(stdout(&o).contains("Overall utilization: 0.3000\n"));
}

#[test]
fn test_analyze_without_usage_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    fs::remove_file(run.join("Usage_Scenario_jobs.csv")).unwrap();
    let o = simalyze(&["analyze", run.to_str().unwrap()]);
    assert!(o.status.code() == Some(1));
    assert!(stderr(&o).contains("Usage_Scenario"));
    assert!(!run.join("results").exists());
    assert!(!run.join("results.txt").exists());
}

#[test]
fn test_malformed_log() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    fs::write(
        run.join("State_of_Active_Resource_Tuple_core1.csv"),
        "Point in Time [s],State\n10,0\n20,busy\n",
    )
    .unwrap();
    let o = simalyze(&["busy", run.to_str().unwrap()]);
    assert!(o.status.code() == Some(1));
    assert!(stderr(&o).contains("State_of_Active_Resource_Tuple_core1"));
}

#[test]
fn test_busy() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&["busy", "--fmt=time,busy,csv", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o) == "0,1\n10,1\n20,2\n30,1\n60,2\n70,1\n100,0\n");

    let o = simalyze(&["busy", "--fmt=help"]);
    assert!(o.status.success());
    assert!(stdout(&o).contains("Defaults:\n  time,busy,utilization\n"));
}

#[test]
fn test_pools() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&["pools", "--fmt=capacity,used,awk", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o) == "4 2.40\n");
}

#[test]
fn test_run_config() {
    let dir = tempfile::tempdir().unwrap();
    copy_run(dir.path());
    let config = dir.path().join("run.json");
    fs::write(
        &config,
        r##"{ "path": "run1", "stop-time": 200, "#note": "idle tail" }"##,
    )
    .unwrap();
    let o = simalyze(&["analyze", config.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o).contains("Overall utilization: 0.3000\n"));
    assert!(dir.path().join("run1/results/metadata.json").exists());

    // A window that ends before the last state change cannot be integrated.
    fs::write(&config, r#"{ "path": "run1", "stop-time": 50 }"#).unwrap();
    let o = simalyze(&["busy", config.to_str().unwrap()]);
    assert!(o.status.code() == Some(1));
    assert!(stderr(&o).contains("Invalid integration range"));
}

#[test]
fn test_compare() {
    let dir = tempfile::tempdir().unwrap();
    let run = copy_run(dir.path());
    let o = simalyze(&["analyze", run.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));

    let config = dir.path().join("compare.json");
    fs::write(
        &config,
        r#"{ "title": "Run 1", "output": "comparison",
             "simulations": [ { "key": "run1", "path": "run1", "label": "Simulated" } ],
             "references": [ { "label": "Measured", "value": 0.5 } ] }"#,
    )
    .unwrap();
    let o = simalyze(&["compare", "--fmt=label,average,csv", config.to_str().unwrap()]);
    assert!(o.status.success(), "{}", stderr(&o));
    assert!(stdout(&o) == "Simulated,0.6000\nMeasured,0.5000\n");
    let table = fs::read_to_string(dir.path().join("comparison/utilizations.csv")).unwrap();
    assert!(table.starts_with("time,run1,Measured\n"));
}
