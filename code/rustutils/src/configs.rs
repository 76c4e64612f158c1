/// Read analysis configuration data from json files.
///
/// Run configuration file format:
///
/// An object { ... } with the following named fields and value types:
///
///   path - string, the directory holding the simulator's result logs, relative to the directory
///      containing the configuration file
///   stop-time - number, optional, the end of the observation window in simulation seconds.  The
///      default is computed from the logs by the client
///   simulation-days - number, optional, the length of the simulation in days, for computing
///      throughput per day.  The default is derived from the stop time
///   reference-utilization - number in [0,1], optional, the measured average core utilization
///   reference-throughput - string, optional, a CSV file with measured job throughput per type,
///      relative to the directory containing the configuration file
///   resample-interval - number, optional, the bucket width in seconds for the resampled
///      utilization series [default: 600]
///   output - string, optional, the name of the results directory within `path` [default: results]
///
/// Comparison configuration file format:
///
/// An object { ... } with the following named fields and value types:
///
///   title - string, the title of the comparison
///   output - string, the output directory, relative to the directory containing the file
///   simulations - array of objects, each with the string fields key, path, label,
///      labelDescription, and color.  `path` is relative to the directory containing the file and
///      names a run directory that has already been analyzed
///   references - array of objects, optional, each with the string fields label, labelDescription,
///      and color and the number field value
///
/// In both formats, any field name starting with '#' is reserved for arbitrary comments.
use anyhow::{bail, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_RESAMPLE_INTERVAL: f64 = 600.0;
pub const DEFAULT_OUTPUT_DIR: &str = "results";

// See above comment block for field documentation.

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub path: PathBuf,
    pub stop_time: Option<f64>,
    pub simulation_days: Option<f64>,
    pub reference_utilization: Option<f64>,
    pub reference_throughput: Option<PathBuf>,
    pub resample_interval: f64,
    pub output: String,
}

impl RunConfig {
    /// The configuration used when the program is pointed at a log directory directly.

    pub fn for_directory(path: &Path) -> RunConfig {
        RunConfig {
            path: path.to_path_buf(),
            stop_time: None,
            simulation_days: None,
            reference_utilization: None,
            reference_throughput: None,
            resample_interval: DEFAULT_RESAMPLE_INTERVAL,
            output: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path.join(&self.output)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Simulation {
    pub key: String,
    pub path: PathBuf,
    pub label: String,
    pub label_description: String,
    pub color: String,
}

#[derive(Debug, Default, Clone)]
pub struct Reference {
    pub label: String,
    pub label_description: String,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Default, Clone)]
pub struct ComparisonConfig {
    pub title: String,
    pub output: PathBuf,
    pub resample_interval: f64,
    pub simulations: Vec<Simulation>,
    pub references: Vec<Reference>,
}

/// As for the cluster configs the input is human-generated and has optional fields, so we use the
/// generic JSON parser followed by explicit decoding of the fields, rather than a (derived)
/// strongly-typed parser.  That also gives us error messages that name the offending field.

pub fn read_run_config(filename: &Path) -> Result<RunConfig> {
    let fields = read_object(filename)?;
    let base = base_directory(filename);
    let mut cfg = RunConfig::for_directory(&base.join(grab_string(&fields, "path")?));
    cfg.stop_time = grab_f64_opt(&fields, "stop-time")?;
    if let Some(t) = cfg.stop_time {
        if t < 0.0 {
            bail!("Field 'stop-time' must not be negative");
        }
    }
    cfg.simulation_days = grab_f64_opt(&fields, "simulation-days")?;
    if let Some(d) = cfg.simulation_days {
        if d <= 0.0 {
            bail!("Field 'simulation-days' must be positive");
        }
    }
    cfg.reference_utilization = grab_f64_opt(&fields, "reference-utilization")?;
    if let Some(u) = cfg.reference_utilization {
        if !(0.0..=1.0).contains(&u) {
            bail!("Field 'reference-utilization' must be in the range [0,1]");
        }
    }
    cfg.reference_throughput = grab_string_opt(&fields, "reference-throughput")?.map(|p| base.join(p));
    if let Some(r) = grab_f64_opt(&fields, "resample-interval")? {
        if r <= 0.0 {
            bail!("Field 'resample-interval' must be positive");
        }
        cfg.resample_interval = r;
    }
    if let Some(o) = grab_string_opt(&fields, "output")? {
        cfg.output = o;
    }
    Ok(cfg)
}

pub fn read_comparison_config(filename: &Path) -> Result<ComparisonConfig> {
    let fields = read_object(filename)?;
    let base = base_directory(filename);
    let mut cfg: ComparisonConfig = Default::default();
    cfg.title = grab_string(&fields, "title")?;
    cfg.output = base.join(grab_string(&fields, "output")?);
    cfg.resample_interval = grab_f64_opt(&fields, "resample-interval")?.unwrap_or(DEFAULT_RESAMPLE_INTERVAL);
    if cfg.resample_interval <= 0.0 {
        bail!("Field 'resample-interval' must be positive");
    }
    if let Some(Value::Array(objs)) = fields.get("simulations") {
        for obj in objs {
            if let Value::Object(sim) = obj {
                cfg.simulations.push(Simulation {
                    key: grab_string(sim, "key")?,
                    path: base.join(grab_string(sim, "path")?),
                    label: grab_string(sim, "label")?,
                    label_description: grab_string_opt(sim, "labelDescription")?.unwrap_or_default(),
                    color: grab_string_opt(sim, "color")?.unwrap_or_default(),
                });
            } else {
                bail!("Expected an object value in 'simulations'")
            }
        }
    } else {
        bail!("The field 'simulations' is required");
    }
    if cfg.simulations.is_empty() {
        bail!("The field 'simulations' must name at least one simulation");
    }
    if let Some(refs) = fields.get("references") {
        if let Value::Array(objs) = refs {
            for obj in objs {
                if let Value::Object(r) = obj {
                    cfg.references.push(Reference {
                        label: grab_string(r, "label")?,
                        label_description: grab_string_opt(r, "labelDescription")?.unwrap_or_default(),
                        value: grab_f64(r, "value")?,
                        color: grab_string_opt(r, "color")?.unwrap_or_default(),
                    });
                } else {
                    bail!("Expected an object value in 'references'")
                }
            }
        } else {
            bail!("Field 'references' must have an array value");
        }
    }
    Ok(cfg)
}

fn read_object(filename: &Path) -> Result<serde_json::Map<String, Value>> {
    let file = File::open(filename)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader)? {
        Value::Object(fields) => Ok(fields),
        _ => bail!("Expected an object value"),
    }
}

// Relative paths in a config file are relative to the directory holding the file.
fn base_directory(filename: &Path) -> PathBuf {
    match filename.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(Value::String(s)) = fields.get(name) {
        Ok(s.to_string())
    } else {
        bail!("Field '{name}' must be present and have a string value");
    }
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    if let Some(val) = fields.get(name) {
        if let Value::String(s) = val {
            Ok(Some(s.to_string()))
        } else {
            bail!("Field '{name}' must have a string value");
        }
    } else {
        Ok(None)
    }
}

fn grab_f64(fields: &serde_json::Map<String, Value>, name: &str) -> Result<f64> {
    if let Some(n) = grab_f64_opt(fields, name)? {
        Ok(n)
    } else {
        bail!("Field '{name}' must be present and have a numeric value")
    }
}

fn grab_f64_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<f64>> {
    if let Some(val) = fields.get(name) {
        if let Some(n) = val.as_f64() {
            Ok(Some(n))
        } else {
            bail!("Field '{name}' must have a numeric value")
        }
    } else {
        Ok(None)
    }
}

// Basic whitebox test that the reading of run configs works.  Error conditions are tested
// blackbox, see simalyze/tests.

#[test]
fn test_run_config() {
    let conf = read_run_config(Path::new("../tests/rustutils/run-config.json")).unwrap();
    assert!(conf.path == Path::new("../tests/rustutils/run-2018-05"));
    assert!(conf.stop_time == Some(604800.0));
    assert!(conf.simulation_days.is_none());
    assert!(conf.reference_utilization == Some(0.75));
    assert!(conf.reference_throughput == Some(PathBuf::from("../tests/rustutils/job_counts_reference_jm.csv")));
    assert!(conf.resample_interval == 300.0);
    assert!(conf.output == "results");
    assert!(conf.output_dir() == Path::new("../tests/rustutils/run-2018-05/results"));
}

#[test]
fn test_run_config_defaults() {
    let conf = RunConfig::for_directory(Path::new("some/where"));
    assert!(conf.stop_time.is_none());
    assert!(conf.resample_interval == DEFAULT_RESAMPLE_INTERVAL);
    assert!(conf.output_dir() == Path::new("some/where/results"));
}

#[test]
fn test_run_config_bad_reference() {
    let conf = read_run_config(Path::new("../tests/rustutils/bad-run-config.json"));
    assert!(conf.is_err());
    assert!(format!("{}", conf.unwrap_err()).contains("reference-utilization"));
}

#[test]
fn test_comparison_config() {
    let conf = read_comparison_config(Path::new("../tests/rustutils/comparison-config.json")).unwrap();
    assert!(conf.title == "GridKa");
    assert!(conf.output == Path::new("../tests/rustutils/comparison"));
    assert!(conf.resample_interval == DEFAULT_RESAMPLE_INTERVAL);
    assert!(conf.simulations.len() == 2);
    assert!(conf.simulations[0].key == "physical");
    assert!(conf.simulations[0].path == Path::new("../tests/rustutils/run-physical"));
    assert!(conf.simulations[1].label_description == "logical cores");
    assert!(conf.references.len() == 1);
    assert!(conf.references[0].value == 0.78);
    assert!(conf.references[0].color == "#ff7f0e");
}
