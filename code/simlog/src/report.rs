/// The products of an analysis run.  These are plain data; the front end decides how to write them.
///
/// The record types that go to CSV files carry serde attributes that give the column names the
/// charting scripts expect (`time_start`, `delta_state`, `busy_cores`, `utilization`, `type`, ...).
use crate::{
    ActiveUtilization, AnalysisError, PassiveUtilization, ResponseRecord, Result, StepFunction,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ustr::Ustr;

pub const SECONDS_PER_DAY: f64 = 86400.0;

pub fn simulation_days(stop_time: f64) -> f64 {
    stop_time / SECONDS_PER_DAY
}

/// The aggregate result of a run.

#[derive(Debug, Clone)]
pub struct UtilizationReport {
    pub core_count: usize,
    pub node_count: usize,
    pub overall_utilization: f64,
    pub mean_core_utilization: f64,
    pub busy_count_series: StepFunction,
    pub total_slots: u64,
    pub average_used_slots: f64,
    pub slot_utilization: f64,
}

impl UtilizationReport {
    pub fn new(active: &ActiveUtilization, passive: &PassiveUtilization) -> UtilizationReport {
        UtilizationReport {
            core_count: active.resource_count,
            node_count: passive.pools.len(),
            overall_utilization: active.overall_utilization,
            mean_core_utilization: active.mean_resource_utilization(),
            busy_count_series: active.busy_count_series.clone(),
            total_slots: passive.total_capacity,
            average_used_slots: passive.average_used_slots,
            slot_utilization: passive.utilization_ratio,
        }
    }

    pub fn stop_time(&self) -> f64 {
        self.busy_count_series.stop_time
    }

    pub fn metadata(&self, total_count: usize, simulation_days: f64) -> Metadata {
        Metadata {
            core_count: self.core_count,
            stoptime: self.stop_time(),
            simulation_days,
            total_count,
            node_count: self.node_count,
            total_slots: self.total_slots,
            avg_used_jobslots: self.average_used_slots,
            overall_utilization: self.overall_utilization,
        }
    }
}

/// The metadata record of a run, stored as `metadata.json` next to the tables.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub core_count: usize,
    pub stoptime: f64,
    pub simulation_days: f64,
    pub total_count: usize,
    pub node_count: usize,
    pub total_slots: u64,
    pub avg_used_jobslots: f64,
    // Older metadata files don't have this.
    #[serde(default)]
    pub overall_utilization: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRow {
    #[serde(rename = "time_start")]
    pub timestamp: f64,
    #[serde(rename = "delta_state")]
    pub delta: i64,
    pub busy_cores: i64,
    pub utilization: f64,
}

/// One row per merged timeline entry, with the busy count as a fraction of the core count.

pub fn utilization_table(active: &ActiveUtilization) -> Vec<UtilizationRow> {
    let n = active.resource_count as f64;
    active
        .timeline
        .entries
        .iter()
        .map(|e| UtilizationRow {
            timestamp: e.timestamp,
            delta: e.delta,
            busy_cores: e.busy,
            utilization: e.busy as f64 / n,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rounding {
    Ceil,
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub utilization: f64,
}

/// Bucket the rows by time, rounding each timestamp to a multiple of `interval`, and average the
/// utilization of the rows in each bucket.  This is the plain mean of the rows, it is for charts.
/// The rows must be sorted by time.

pub fn resample(rows: &[UtilizationRow], interval: f64, rounding: Rounding) -> Result<Vec<Sample>> {
    if !(interval > 0.0) {
        return Err(AnalysisError::InvalidRange(format!(
            "resampling interval {interval} must be positive"
        )));
    }
    let bucket = |t: f64| match rounding {
        Rounding::Ceil => (t / interval).ceil() * interval,
        Rounding::Floor => (t / interval).floor() * interval,
    };
    Ok(rows
        .iter()
        .group_by(|r| bucket(r.timestamp))
        .into_iter()
        .map(|(time, group)| {
            let (sum, n) = group.fold((0.0, 0usize), |(s, n), r| (s + r.utilization, n + 1));
            Sample {
                time,
                utilization: sum / n as f64,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    #[serde(rename = "type")]
    pub job_type: String,
    pub count: usize,
    #[serde(rename = "throughput")]
    pub per_day: f64,
}

/// Sum the completion counts of each job type and divide by the length of the simulation, sorted
/// by type name.

pub fn throughput_table(counts: &[(Ustr, usize)], simulation_days: f64) -> Result<Vec<Throughput>> {
    if simulation_days == 0.0 {
        return Err(AnalysisError::ZeroDuration(0.0));
    }
    let mut by_type = BTreeMap::<&str, usize>::new();
    for (t, n) in counts {
        *by_type.entry(t.as_str()).or_insert(0) += n;
    }
    Ok(by_type
        .into_iter()
        .map(|(t, count)| Throughput {
            job_type: t.to_string(),
            count,
            per_day: count as f64 / simulation_days,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputComparison {
    #[serde(rename = "type")]
    pub job_type: String,
    pub measured: f64,
    pub simulated: f64,
}

/// Join simulated and measured per-day throughput on the job type.  A type missing on either side
/// gets 0 there.

pub fn compare_throughput(
    simulated: &[Throughput],
    measured: &[(String, f64)],
) -> Vec<ThroughputComparison> {
    let mut joined = BTreeMap::<&str, (f64, f64)>::new();
    for (t, m) in measured {
        joined.entry(t.as_str()).or_insert((0.0, 0.0)).0 += m;
    }
    for s in simulated {
        joined.entry(s.job_type.as_str()).or_insert((0.0, 0.0)).1 += s.per_day;
    }
    joined
        .into_iter()
        .map(|(t, (measured, simulated))| ThroughputComparison {
            job_type: t.to_string(),
            measured,
            simulated,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalltimeRow {
    #[serde(rename = "type")]
    pub job_type: String,
    pub time: f64,
    pub response_time: f64,
}

pub fn walltime_table(logs: &[(Ustr, Vec<ResponseRecord>)]) -> Vec<WalltimeRow> {
    logs.iter()
        .flat_map(|(t, records)| {
            records.iter().map(move |r| WalltimeRow {
                job_type: t.to_string(),
                time: r.time,
                response_time: r.response_time,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSummary {
    pub job_type: String,
    pub count: usize,
    pub mean_response_time: f64,
}

/// Count and mean response time per job type, sorted by type.  Types without records are omitted.

pub fn response_summary(rows: &[WalltimeRow]) -> Vec<ResponseSummary> {
    let mut by_type = BTreeMap::<&str, (usize, f64)>::new();
    for r in rows {
        let e = by_type.entry(r.job_type.as_str()).or_insert((0, 0.0));
        e.0 += 1;
        e.1 += r.response_time;
    }
    by_type
        .into_iter()
        .map(|(t, (count, sum))| ResponseSummary {
            job_type: t.to_string(),
            count,
            mean_response_time: sum / count as f64,
        })
        .collect()
}

#[cfg(test)]
use crate::{ActiveUtilizationAggregator, NoopObserver, ResourceEventLog, StateRecord};

#[cfg(test)]
fn two_cores() -> ActiveUtilization {
    let mk = |name: &str, recs: &[(f64, u32)]| ResourceEventLog {
        name: ustr::ustr(name),
        records: recs
            .iter()
            .map(|&(timestamp, value)| StateRecord { timestamp, value })
            .collect(),
    };
    ActiveUtilizationAggregator::new(&NoopObserver)
        .aggregate(
            &[mk("c0", &[(0.0, 1), (10.0, 0)]), mk("c1", &[(5.0, 1), (15.0, 0)])],
            15.0,
        )
        .unwrap()
}

#[test]
fn test_utilization_table() {
    let rows = utilization_table(&two_cores());
    assert!(rows.len() == 4);
    assert!(rows[1] == UtilizationRow { timestamp: 5.0, delta: 1, busy_cores: 2, utilization: 1.0 });
    assert!(rows[2].utilization == 0.5);
    assert!(rows[3].busy_cores == 0);
}

// This tests:
//  - ceil puts t=0 in bucket 0 and t=5 in bucket 10, floor puts both in bucket 0
//  - rows in a bucket are averaged

#[test]
fn test_resample() {
    let rows = utilization_table(&two_cores());
    let up = resample(&rows, 10.0, Rounding::Ceil).unwrap();
    assert!(
        up == vec![
            Sample { time: 0.0, utilization: 0.5 },
            Sample { time: 10.0, utilization: 0.75 },
            Sample { time: 20.0, utilization: 0.0 }
        ]
    );
    let down = resample(&rows, 10.0, Rounding::Floor).unwrap();
    assert!(down.len() == 2);
    assert!(down[0] == Sample { time: 0.0, utilization: 0.75 });
    assert!(down[1] == Sample { time: 10.0, utilization: 0.25 });
    assert!(resample(&rows, 0.0, Rounding::Ceil).is_err());
}

#[test]
fn test_throughput_table() {
    let counts = vec![
        (ustr::ustr("reco"), 4),
        (ustr::ustr("analysis"), 10),
        (ustr::ustr("reco"), 2),
    ];
    let t = throughput_table(&counts, 2.0).unwrap();
    assert!(t.len() == 2);
    assert!(t[0] == Throughput { job_type: "analysis".to_string(), count: 10, per_day: 5.0 });
    assert!(t[1].count == 6);
    assert!(t[1].per_day == 3.0);
    assert!(matches!(throughput_table(&counts, 0.0), Err(AnalysisError::ZeroDuration(_))));

    let c = compare_throughput(&t, &[("pileup".to_string(), 1.5), ("reco".to_string(), 2.5)]);
    assert!(c.len() == 3);
    assert!(c[0].measured == 0.0 && c[0].simulated == 5.0);
    assert!(c[1].job_type == "pileup" && c[1].simulated == 0.0);
    assert!(c[2].measured == 2.5 && c[2].simulated == 3.0);
}

#[test]
fn test_walltimes() {
    let logs = vec![
        (
            ustr::ustr("analysis"),
            vec![
                ResponseRecord { time: 1.0, response_time: 10.0 },
                ResponseRecord { time: 2.0, response_time: 20.0 },
            ],
        ),
        (ustr::ustr("reco"), vec![ResponseRecord { time: 3.0, response_time: 7.0 }]),
        (ustr::ustr("analysis"), vec![ResponseRecord { time: 4.0, response_time: 30.0 }]),
    ];
    let rows = walltime_table(&logs);
    assert!(rows.len() == 4);
    assert!(rows[2].job_type == "reco");
    let s = response_summary(&rows);
    assert!(s.len() == 2);
    assert!(s[0].count == 3 && s[0].mean_response_time == 20.0);
    assert!(s[1].mean_response_time == 7.0);
}

#[test]
fn test_metadata() {
    let m = Metadata {
        core_count: 2,
        stoptime: 172800.0,
        simulation_days: simulation_days(172800.0),
        total_count: 5,
        node_count: 1,
        total_slots: 4,
        avg_used_jobslots: 1.5,
        overall_utilization: 0.5,
    };
    assert!(m.simulation_days == 2.0);
    let d: Metadata = serde_json::from_str(
        r#"{"core_count": 2, "stoptime": 172800.0, "simulation_days": 2.0, "total_count": 5,
            "node_count": 1, "total_slots": 4, "avg_used_jobslots": 1.5}"#,
    )
    .unwrap();
    assert!(d.overall_utilization == 0.0);
    assert!(d.total_slots == m.total_slots);
}
