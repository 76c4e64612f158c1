// Compare the core utilization of several analyzed runs with each other and with reference values.
//
// Each simulation named by the comparison configuration must already have been analyzed, so that
// its `results/utilization.csv` and `results/metadata.json` exist.  For each simulation we compute
// the time-weighted average utilization over the window from its first row to its stop time, and
// resample its series onto a common grid for charting.
//
// The table printed has one row per simulation and one per reference value, with the fields:
//
//  - label is the label of the line in the chart
//  - description is the label description
//  - kind is `simulated` or `reference`
//  - average is the average utilization, with four decimals
//  - color is the color of the line in the chart
//
// The file `utilizations.csv` in the output directory has a `time` column and then one column per
// simulation, named by its key, holding the resampled utilization, blank where that simulation has
// no sample.  Then there is one column per reference value, named by its label, holding the value on
// every row.

use crate::format;
use crate::PrintArgs;

use anyhow::{Context, Result};
use rustutils::{read_comparison_config, Simulation, DEFAULT_OUTPUT_DIR};
use simlog::{integrate, resample, Breakpoint, Metadata, Rounding, Sample, UtilizationRow};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

pub const COMPARISON_FILE: &str = "utilizations.csv";

struct Line {
    label: String,
    description: String,
    kind: &'static str,
    average: f64,
    color: String,
}

struct SimulatedSeries {
    key: String,
    average: f64,
    samples: Vec<Sample>,
}

pub fn compare_and_write(
    output: &mut dyn io::Write,
    config_file: &Path,
    print_args: &PrintArgs,
) -> Result<()> {
    let config = read_comparison_config(config_file)
        .with_context(|| format!("Reading {}", config_file.display()))?;
    tracing::info!("Comparison: {}", config.title);

    let mut series = vec![];
    let mut lines = vec![];
    for sim in &config.simulations {
        let s = simulated_series(sim, config.resample_interval)?;
        tracing::debug!("{}: average utilization {:.4}", sim.key, s.average);
        lines.push(Line {
            label: sim.label.clone(),
            description: sim.label_description.clone(),
            kind: "simulated",
            average: s.average,
            color: sim.color.clone(),
        });
        series.push(s);
    }
    for r in &config.references {
        lines.push(Line {
            label: r.label.clone(),
            description: r.label_description.clone(),
            kind: "reference",
            average: r.value,
            color: r.color.clone(),
        });
    }

    fs::create_dir_all(&config.output)
        .with_context(|| format!("Could not create {}", config.output.display()))?;
    let references = config
        .references
        .iter()
        .map(|r| (r.label.as_str(), r.value))
        .collect::<Vec<(&str, f64)>>();
    write_comparison(
        File::create(config.output.join(COMPARISON_FILE))?,
        &series,
        &references,
    )?;

    let (formatters, aliases) = my_formatters();
    let spec = print_args.fmt.as_deref().unwrap_or(FMT_DEFAULTS);
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, &lines, ())
}

fn simulated_series(sim: &Simulation, interval: f64) -> Result<SimulatedSeries> {
    let results = sim.path.join(DEFAULT_OUTPUT_DIR);
    let meta_file = results.join("metadata.json");
    let meta: Metadata = serde_json::from_reader(
        File::open(&meta_file).with_context(|| {
            format!("Could not open {}, has the run been analyzed?", meta_file.display())
        })?,
    )
    .with_context(|| format!("Reading {}", meta_file.display()))?;

    let table_file = results.join("utilization.csv");
    let mut reader = csv::Reader::from_path(&table_file)
        .with_context(|| format!("Could not open {}", table_file.display()))?;
    let rows = reader
        .deserialize::<UtilizationRow>()
        .collect::<Result<Vec<UtilizationRow>, csv::Error>>()
        .with_context(|| format!("Reading {}", table_file.display()))?;

    let average = integrate(
        rows.iter().map(|r| Breakpoint {
            timestamp: r.timestamp,
            level: r.utilization,
        }),
        meta.stoptime,
    )
    .and_then(|i| i.average())
    .with_context(|| format!("Utilization of simulation '{}'", sim.key))?;

    Ok(SimulatedSeries {
        key: sim.key.clone(),
        average,
        samples: resample(&rows, interval, Rounding::Floor)?,
    })
}

fn write_comparison<W: io::Write>(
    out: W,
    series: &[SimulatedSeries],
    references: &[(&str, f64)],
) -> Result<()> {
    let mut times = series
        .iter()
        .flat_map(|s| s.samples.iter().map(|x| x.time))
        .collect::<Vec<f64>>();
    times.sort_by(f64::total_cmp);
    times.dedup();

    let lookup = series
        .iter()
        .map(|s| {
            s.samples
                .iter()
                .map(|x| (x.time.to_bits(), x.utilization))
                .collect::<HashMap<u64, f64>>()
        })
        .collect::<Vec<HashMap<u64, f64>>>();

    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["time".to_string()];
    header.extend(series.iter().map(|s| s.key.clone()));
    header.extend(references.iter().map(|(label, _)| label.to_string()));
    writer.write_record(&header)?;
    for t in times {
        let mut record = vec![t.to_string()];
        for m in &lookup {
            record.push(match m.get(&t.to_bits()) {
                Some(u) => u.to_string(),
                None => "".to_string(),
            });
        }
        for (_, v) in references {
            record.push(v.to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases.into_iter().collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "label,kind,average";

type Datum<'a> = &'a Line;

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(Datum, ()) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(Datum, ()) -> String> = HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("label".to_string(), &format_label);
    formatters.insert("description".to_string(), &format_description);
    formatters.insert("kind".to_string(), &format_kind);
    formatters.insert("average".to_string(), &format_average);
    formatters.insert("color".to_string(), &format_color);
    aliases.insert(
        "all".to_string(),
        vec![
            "label".to_string(),
            "description".to_string(),
            "kind".to_string(),
            "average".to_string(),
            "color".to_string(),
        ],
    );
    (formatters, aliases)
}

fn format_label(d: Datum, _: ()) -> String {
    d.label.clone()
}

fn format_description(d: Datum, _: ()) -> String {
    d.description.clone()
}

fn format_kind(d: Datum, _: ()) -> String {
    d.kind.to_string()
}

fn format_average(d: Datum, _: ()) -> String {
    format!("{:.4}", d.average)
}

fn format_color(d: Datum, _: ()) -> String {
    d.color.clone()
}

// This tests:
//  - the time-weighted average of a hand-written analyzed run, which differs from the plain mean
//    of its rows
//  - the layout of utilizations.csv, including blanks where a simulation has no sample and the
//    constant reference column

#[cfg(test)]
fn write_analyzed_run(dir: &Path, rows: &str, stoptime: f64) {
    let results = dir.join(DEFAULT_OUTPUT_DIR);
    fs::create_dir_all(&results).unwrap();
    fs::write(
        results.join("utilization.csv"),
        format!("time_start,delta_state,busy_cores,utilization\n{rows}"),
    )
    .unwrap();
    fs::write(
        results.join("metadata.json"),
        format!(
            r#"{{"core_count":2,"stoptime":{stoptime},"simulation_days":1.0,"total_count":0,
                "node_count":1,"total_slots":4,"avg_used_jobslots":1.0}}"#
        ),
    )
    .unwrap();
}

#[test]
fn test_compare() {
    let dir = tempfile::tempdir().unwrap();
    write_analyzed_run(
        &dir.path().join("a"),
        "0,2,2,1.0\n90,-2,0,0.0\n100,0,0,0.0\n",
        100.0,
    );
    write_analyzed_run(&dir.path().join("b"), "0,1,1,0.5\n50,-1,0,0.0\n", 50.0);
    fs::write(
        dir.path().join("cmp.json"),
        r#"{ "title": "Test", "output": "out", "resample-interval": 50,
             "simulations": [
               { "key": "a", "path": "a", "label": "A", "color": "C0" },
               { "key": "b", "path": "b", "label": "B", "color": "C1" } ],
             "references": [ { "label": "Measured", "value": 0.75, "color": "red" } ] }"#,
    )
    .unwrap();

    let mut out = vec![];
    compare_and_write(
        &mut out,
        &dir.path().join("cmp.json"),
        &PrintArgs {
            fmt: Some("label,kind,average,csv".to_string()),
        },
    )
    .unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "A,simulated,0.9000\nB,simulated,0.5000\nMeasured,reference,0.7500\n"
    );

    let table = fs::read_to_string(dir.path().join("out").join(COMPARISON_FILE)).unwrap();
    assert!(table == "time,a,b,Measured\n0,1,0.5,0.75\n50,0,0,0.75\n100,0,,0.75\n");
}

#[test]
fn test_compare_unanalyzed() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(
        dir.path().join("cmp.json"),
        r#"{ "title": "Test", "output": "out",
             "simulations": [ { "key": "a", "path": "a", "label": "A" } ] }"#,
    )
    .unwrap();
    let mut out = vec![];
    let r = compare_and_write(&mut out, &dir.path().join("cmp.json"), &PrintArgs::default());
    assert!(r.is_err());
    assert!(!dir.path().join("out").exists());
}
