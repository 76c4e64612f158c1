/// Sort the files of a run directory into the kinds of logs the simulator writes, by file name.
///
/// A file name containing
///
///   State_of_Active_Resource_Tuple    is the state log of one core
///   State_of_Passive_Resource_Tuple   is the job slot log of one node
///   Usage_Scenario                    is the completion log of all jobs
///   provided_role_system              is the completion log of the jobs of one type
///   ExternalCall                      is the response time log of the jobs of one type
///
/// and the first of these that matches decides.  For the per-type logs the type name is extracted
/// from the file name; the type name is everything before the first digit of the role or call name,
/// so that e.g. `analysis1` and `analysis2` both count toward `analysis`.
use anyhow::{bail, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use ustr::{ustr, Ustr};

const ACTIVE_KEYWORD: &str = "State_of_Active_Resource_Tuple";
const PASSIVE_KEYWORD: &str = "State_of_Passive_Resource_Tuple";
const TOTAL_THROUGHPUT_KEYWORD: &str = "Usage_Scenario";
const JOB_TYPE_KEYWORD: &str = "provided_role_system";
const RESPONSE_TIME_KEYWORD: &str = "ExternalCall";

/// The logs of a run, each list sorted by file name.

#[derive(Debug, Default)]
pub struct RunFiles {
    pub active: Vec<PathBuf>,
    pub passive: Vec<PathBuf>,

    /// The first Usage_Scenario log, if there is one.
    pub total_throughput: Option<PathBuf>,

    pub job_types: Vec<(Ustr, PathBuf)>,
    pub response_times: Vec<(Ustr, PathBuf)>,

    /// Files that looked like logs but could not be used: further Usage_Scenario logs, and per-type
    /// logs whose type could not be extracted.
    pub ignored: Vec<PathBuf>,
}

pub struct Classifier {
    job_type: Regex,
    job_type_fallback: Regex,
    response_time: Regex,
}

impl Classifier {
    pub fn new() -> Result<Classifier> {
        Ok(Classifier {
            job_type: Regex::new(r"jobsSystem.provided_role_system_(.*?)([0-9].*?)?\.run_(.*)\.csv")?,
            job_type_fallback: Regex::new(r"jobsSystem.provided_role_system_(.*)\.(.*)\.csv")?,
            response_time: Regex::new(r"ExternalCall_externalCallType_(.*?)([0-9].*?)?_(.*)\.csv")?,
        })
    }

    pub fn job_type(&self, file_name: &str) -> Option<Ustr> {
        self.job_type
            .captures(file_name)
            .or_else(|| self.job_type_fallback.captures(file_name))
            .and_then(|c| c.get(1))
            .map(|m| ustr(m.as_str()))
    }

    pub fn response_time_type(&self, file_name: &str) -> Option<Ustr> {
        self.response_time
            .captures(file_name)
            .and_then(|c| c.get(1))
            .map(|m| ustr(m.as_str()))
    }

    /// Classify `file_names`, which are names of files in `dir`.  The result lists follow the order
    /// of `file_names`.  Names that match no keyword are dropped.

    pub fn classify(&self, dir: &Path, file_names: &[String]) -> RunFiles {
        let mut files = RunFiles::default();
        for name in file_names {
            let path = dir.join(name);
            if name.contains(ACTIVE_KEYWORD) {
                files.active.push(path);
            } else if name.contains(PASSIVE_KEYWORD) {
                files.passive.push(path);
            } else if name.contains(TOTAL_THROUGHPUT_KEYWORD) {
                if files.total_throughput.is_none() {
                    files.total_throughput = Some(path);
                } else {
                    files.ignored.push(path);
                }
            } else if name.contains(JOB_TYPE_KEYWORD) {
                match self.job_type(name) {
                    Some(t) => files.job_types.push((t, path)),
                    None => files.ignored.push(path),
                }
            } else if name.contains(RESPONSE_TIME_KEYWORD) {
                match self.response_time_type(name) {
                    Some(t) => files.response_times.push((t, path)),
                    None => files.ignored.push(path),
                }
            }
        }
        files
    }
}

/// List the regular files directly in `dir`, sorted by name, and classify them.  File names that
/// are not UTF-8 are ignored; the simulator does not produce them.

pub fn classify_run_directory(dir: &Path) -> Result<RunFiles> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    let mut names = vec![];
    for entry in dir.read_dir()? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(Classifier::new()?.classify(dir, &names))
}

// This tests:
//  - type names stop at the first digit of the role name
//  - the fallback pattern applies when there is no `.run_` part

#[test]
fn test_job_type() {
    let c = Classifier::new().unwrap();
    assert!(c.job_type("jobsSystem.provided_role_system_analysis1.run_0.csv") == Some(ustr("analysis")));
    assert!(c.job_type("jobsSystem.provided_role_system_reco.run_12.csv") == Some(ustr("reco")));
    assert!(c.job_type("jobsSystem.provided_role_system_merge.final.csv") == Some(ustr("merge")));
    assert!(c.job_type("provided_role_system.csv").is_none());
    assert!(
        c.response_time_type("ExternalCall_externalCallType_analysis12_Tuple.csv")
            == Some(ustr("analysis"))
    );
    assert!(
        c.response_time_type("ExternalCall_externalCallType_pileup_Tuple.csv")
            == Some(ustr("pileup"))
    );
    assert!(c.response_time_type("ExternalCall.csv").is_none());
}

#[test]
fn test_classify_names() {
    let c = Classifier::new().unwrap();
    let names = [
        "State_of_Active_Resource_Tuple_core0.csv",
        "State_of_Passive_Resource_Tuple_node0.csv",
        "Usage_Scenario_a.csv",
        "Usage_Scenario_b.csv",
        "jobsSystem.provided_role_system_analysis1.run_0.csv",
        "provided_role_system.csv",
        "ExternalCall_externalCallType_reco_Tuple.csv",
        "notes.txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect::<Vec<String>>();
    let f = c.classify(Path::new("run"), &names);
    assert!(f.active == vec![PathBuf::from("run/State_of_Active_Resource_Tuple_core0.csv")]);
    assert!(f.passive.len() == 1);
    assert!(f.total_throughput == Some(PathBuf::from("run/Usage_Scenario_a.csv")));
    assert!(f.job_types.len() == 1);
    assert!(f.job_types[0].0 == ustr("analysis"));
    assert!(f.response_times[0].0 == ustr("reco"));
    assert!(
        f.ignored
            == vec![
                PathBuf::from("run/Usage_Scenario_b.csv"),
                PathBuf::from("run/provided_role_system.csv")
            ]
    );
}

#[test]
fn test_classify_run_directory() {
    let f = classify_run_directory(Path::new("../tests/simlog/run1")).unwrap();
    assert!(f.active.len() == 2);
    assert!(f.active[0].ends_with("State_of_Active_Resource_Tuple_core0.csv"));
    assert!(f.passive.len() == 1);
    assert!(f.total_throughput.is_some());
    assert!(f.job_types.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>() == vec!["analysis", "reco"]);
    assert!(f.response_times.len() == 2);
    assert!(f.ignored.is_empty());

    assert!(classify_run_directory(Path::new("../tests/simlog/no-such-run")).is_err());
}
