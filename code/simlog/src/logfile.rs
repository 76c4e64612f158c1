/// Readers for the simulator's log files.
///
/// Every log is a comma-separated file of records with (at least) two numeric fields.  The exporter
/// may put a header line first; a first non-blank line with a non-numeric field is taken to be that
/// header and skipped, while a non-numeric field anywhere else is an error.  Blank lines are
/// skipped.  Fields beyond the second are ignored.
///
/// State logs hold (timestamp, value) records where the value is a non-negative integer, response
/// time logs hold (time, response time) records.  Errors carry the log's name and the line number.
use crate::{
    AnalysisError, PassiveResourcePool, ResourceEventLog, ResponseRecord, Result, StateRecord,
};
use rustutils::{CsvToken, CsvTokenizer};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use ustr::{ustr, Ustr};

type Field = std::result::Result<f64, String>;

// Parse the rows of `reader`, calling `f` with the line number and the first two fields of every
// data row.

fn for_each_row<F>(name: &str, reader: &mut dyn io::Read, mut f: F) -> Result<()>
where
    F: FnMut(usize, f64, f64) -> Result<()>,
{
    let mut tokenizer = CsvTokenizer::new(reader);
    let mut fields: Vec<Field> = Vec::with_capacity(2);
    let mut nfields = 0;
    let mut first_row = true;
    loop {
        let token = tokenizer.get().map_err(|e| {
            AnalysisError::malformed(name, format!("line {}: {e}", tokenizer.line()))
        })?;
        match token {
            CsvToken::Field(start, lim) => {
                if nfields < 2 {
                    let text = tokenizer.get_str(start, lim).trim();
                    fields.push(text.parse::<f64>().map_err(|_| text.to_string()));
                }
                nfields += 1;
            }
            CsvToken::EOL | CsvToken::EOF => {
                let line = tokenizer.line();
                let at_eof = matches!(token, CsvToken::EOF);
                let blank = match fields.as_slice() {
                    [] => true,
                    [Err(s)] => s.is_empty(),
                    _ => false,
                };
                if !blank {
                    let is_header = first_row && fields.iter().any(|f| f.is_err());
                    first_row = false;
                    if !is_header {
                        match fields.as_slice() {
                            [Ok(a), Ok(b)] => f(line, *a, *b)?,
                            [_] => {
                                return Err(AnalysisError::malformed(
                                    name,
                                    format!("line {line}: expected two fields, found {nfields}"),
                                ))
                            }
                            _ => {
                                let bad = fields
                                    .iter()
                                    .find_map(|f| f.as_ref().err())
                                    .map(|s| s.as_str())
                                    .unwrap_or("");
                                return Err(AnalysisError::malformed(
                                    name,
                                    format!("line {line}: '{bad}' is not a number"),
                                ));
                            }
                        }
                    }
                }
                if at_eof {
                    return Ok(());
                }
                fields.clear();
                nfields = 0;
            }
        }
    }
}

fn check_time(name: &str, line: usize, what: &str, t: f64) -> Result<f64> {
    if !t.is_finite() || t < 0.0 {
        return Err(AnalysisError::malformed(
            name,
            format!("line {line}: {what} {t} must be a finite non-negative number"),
        ));
    }
    Ok(t)
}

/// Parse a state log: (timestamp, value) records, value being an occupancy or a slot count.

pub fn parse_state_records(name: &str, reader: &mut dyn io::Read) -> Result<Vec<StateRecord>> {
    let mut records = vec![];
    for_each_row(name, reader, |line, timestamp, value| {
        let timestamp = check_time(name, line, "timestamp", timestamp)?;
        if !(value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64) {
            return Err(AnalysisError::malformed(
                name,
                format!("line {line}: value {value} must be a non-negative integer"),
            ));
        }
        records.push(StateRecord {
            timestamp,
            value: value as u32,
        });
        Ok(())
    })?;
    Ok(records)
}

/// Parse a response-time log: (completion time, response time) records.

pub fn parse_response_times(name: &str, reader: &mut dyn io::Read) -> Result<Vec<ResponseRecord>> {
    let mut records = vec![];
    for_each_row(name, reader, |line, time, response_time| {
        records.push(ResponseRecord {
            time: check_time(name, line, "time", time)?,
            response_time: check_time(name, line, "response time", response_time)?,
        });
        Ok(())
    })?;
    Ok(records)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| AnalysisError::Io {
        path: path.display().to_string(),
        source,
    })
}

// Logs are named by their file name without the extension.

fn log_name(path: &Path) -> Ustr {
    ustr(
        &path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string()),
    )
}

pub fn read_state_records(path: &Path) -> Result<Vec<StateRecord>> {
    let mut file = open(path)?;
    parse_state_records(log_name(path).as_str(), &mut file)
}

pub fn read_response_times(path: &Path) -> Result<Vec<ResponseRecord>> {
    let mut file = open(path)?;
    parse_response_times(log_name(path).as_str(), &mut file)
}

pub fn read_active_logs(paths: &[PathBuf]) -> Result<Vec<ResourceEventLog>> {
    paths
        .iter()
        .map(|p| {
            Ok(ResourceEventLog {
                name: log_name(p),
                records: read_state_records(p)?,
            })
        })
        .collect()
}

pub fn read_passive_pools(paths: &[PathBuf]) -> Result<Vec<PassiveResourcePool>> {
    paths
        .iter()
        .map(|p| {
            Ok(PassiveResourcePool {
                name: log_name(p),
                records: read_state_records(p)?,
            })
        })
        .collect()
}

/// The number of records in a completion log: its non-blank lines, less a header line if the first
/// of them is one.  The records themselves are not interpreted.

pub fn count_records(path: &Path) -> Result<usize> {
    let name = log_name(path);
    let mut file = open(path)?;
    let mut tokenizer = CsvTokenizer::new(&mut file);
    let mut count = 0;
    let mut nonblank = false;
    let mut numeric = true;
    let mut header = false;
    loop {
        let token = tokenizer.get().map_err(|e| {
            AnalysisError::malformed(name.as_str(), format!("line {}: {e}", tokenizer.line()))
        })?;
        match token {
            CsvToken::Field(start, lim) => {
                let text = tokenizer.get_str(start, lim).trim();
                if !text.is_empty() {
                    nonblank = true;
                    numeric = numeric && text.parse::<f64>().is_ok();
                }
            }
            CsvToken::EOL | CsvToken::EOF => {
                if nonblank {
                    if count == 0 && !header && !numeric {
                        header = true;
                    } else {
                        count += 1;
                    }
                }
                if matches!(token, CsvToken::EOF) {
                    return Ok(count);
                }
                nonblank = false;
                numeric = true;
            }
        }
    }
}

#[cfg(test)]
fn parse(text: &str) -> Result<Vec<(f64, u32)>> {
    let mut bytes = text.as_bytes();
    Ok(parse_state_records("test", &mut bytes)?
        .iter()
        .map(|r| (r.timestamp, r.value))
        .collect())
}

// This tests:
//  - a header line is skipped
//  - blank lines and CRLF line endings are handled
//  - integral floats are accepted as values

#[test]
fn test_parse_state_records() {
    let recs = parse("time_start,state\n0.0,1\n\n12.5,0\r\n\r\n13,2.0\n20.25,1").unwrap();
    assert!(recs == vec![(0.0, 1), (12.5, 0), (13.0, 2), (20.25, 1)]);

    let recs = parse("5,3,extra\n7,0\n").unwrap();
    assert!(recs == vec![(5.0, 3), (7.0, 0)]);

    assert!(parse("").unwrap().is_empty());
    assert!(parse("Point in Time,State\n").unwrap().is_empty());
}

#[test]
fn test_parse_state_errors() {
    for (text, line) in [
        ("0,1\nx,0\n", "line 2:"),
        ("time,state\n0,1\n5\n", "line 3:"),
        ("0,1\n2,-1\n", "line 2:"),
        ("0,1.5\n", "line 1:"),
        ("-3,1\n", "line 1:"),
        ("a,b\nc,d\n", "line 2:"),
        ("0,\"1\n", "line 1:"),
        ("0,1\r\n\r\n\n4,x\n", "line 4:"),
    ] {
        match parse(text) {
            Err(AnalysisError::MalformedLog { resource, reason }) => {
                assert!(resource == "test");
                assert!(reason.starts_with(line), "{text:?} => {reason}");
            }
            _ => panic!("Expected MalformedLog for {text:?}"),
        }
    }
}

#[test]
fn test_parse_response_times() {
    let mut bytes = "time,response_time\n100.5,3600\n200,7200.25\n".as_bytes();
    let recs = parse_response_times("walltimes", &mut bytes).unwrap();
    assert!(recs.len() == 2);
    assert!(recs[1] == ResponseRecord { time: 200.0, response_time: 7200.25 });
}

#[test]
fn test_read_logs() {
    let dir = PathBuf::from("../tests/simlog/run1");
    let active = read_active_logs(&[
        dir.join("State_of_Active_Resource_Tuple_core0.csv"),
        dir.join("State_of_Active_Resource_Tuple_core1.csv"),
    ])
    .unwrap();
    assert!(active.len() == 2);
    assert!(active[0].name.as_str() == "State_of_Active_Resource_Tuple_core0");
    assert!(active[0].records[0] == StateRecord { timestamp: 0.0, value: 1 });
    assert!(active[1].records.len() == 4);

    let pools = read_passive_pools(&[dir.join("State_of_Passive_Resource_Tuple_node0.csv")]).unwrap();
    assert!(pools[0].records.last() == Some(&StateRecord { timestamp: 80.0, value: 1 }));

    assert!(count_records(&dir.join("Usage_Scenario_jobs.csv")).unwrap() == 5);
    assert!(matches!(
        read_state_records(&dir.join("no-such-file.csv")),
        Err(AnalysisError::Io { .. })
    ));
}

#[test]
fn test_count_records() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("jobs.csv");
    std::fs::write(&p, "12.0,1\n\n13.0,1\n").unwrap();
    assert!(count_records(&p).unwrap() == 2);
    std::fs::write(&p, "time,id\n").unwrap();
    assert!(count_records(&p).unwrap() == 0);
    std::fs::write(&p, "").unwrap();
    assert!(count_records(&p).unwrap() == 0);
    std::fs::write(&p, "time,id\r\n12.0,1\r\n\r\n13.0,\"1\r\n").unwrap();
    match count_records(&p) {
        Err(AnalysisError::MalformedLog { reason, .. }) => {
            assert!(reason.starts_with("line 4:"), "{reason}")
        }
        _ => panic!("Expected MalformedLog"),
    }
}
