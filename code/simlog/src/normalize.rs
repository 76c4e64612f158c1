/// Normalization of one active resource's raw log into busy/idle transitions.
///
/// The steps are:
///
///  - reject an empty log, and a log whose timestamps decrease anywhere
///  - collapse each run of records with the same timestamp to the last record of the run
///  - clamp the occupancy to the busy indicator min(value, 1), so that a core that is used by
///    several threads at once still counts as one busy core
///  - difference the indicator, taking the first record relative to IDLE_BASELINE
///
/// Taking the first difference relative to the baseline means the first delta equals the first
/// clamped state.  If instead the first delta were dropped or taken as zero, a core that starts out
/// busy would never be counted as busy in the merged timeline, and its first idle transition would
/// drive the busy count below zero.
use crate::{
    AnalysisError, Delta, NormalizedDeltaSeries, Observer, ResourceEventLog, Result, StateRecord,
};
use itertools::Itertools;

/// The busy indicator of every active resource before its first record: idle.
pub const IDLE_BASELINE: i32 = 0;

pub fn normalize(log: &ResourceEventLog, observer: &dyn Observer) -> Result<NormalizedDeltaSeries> {
    if log.records.is_empty() {
        return Err(AnalysisError::malformed(log.name.as_str(), "log has no records"));
    }
    check_ordered(log.name.as_str(), &log.records)?;

    let records = last_per_timestamp(&log.records);
    let dropped = log.records.len() - records.len();
    if dropped > 0 {
        observer.duplicates_resolved(log.name.as_str(), dropped);
    }

    let mut prev = IDLE_BASELINE;
    let deltas = records
        .iter()
        .map(|r| {
            let busy = r.value.min(1) as i32;
            let d = Delta {
                timestamp: r.timestamp,
                delta: busy - prev,
            };
            prev = busy;
            d
        })
        .collect::<Vec<Delta>>();

    Ok(NormalizedDeltaSeries {
        name: log.name,
        deltas,
    })
}

// Records within a log must come in time order; equal timestamps are allowed and are resolved by
// last_per_timestamp().

pub(crate) fn check_ordered(name: &str, records: &[StateRecord]) -> Result<()> {
    if let Some((a, b)) = records
        .iter()
        .tuple_windows()
        .find(|(a, b)| b.timestamp < a.timestamp)
    {
        return Err(AnalysisError::malformed(
            name,
            format!(
                "timestamp {} follows timestamp {}, records are out of order",
                b.timestamp, a.timestamp
            ),
        ));
    }
    Ok(())
}

// Keep only the last record of each run of equal timestamps.  Given sorted input the result has
// strictly increasing timestamps.

pub(crate) fn last_per_timestamp(records: &[StateRecord]) -> Vec<StateRecord> {
    records
        .iter()
        .group_by(|r| r.timestamp)
        .into_iter()
        .filter_map(|(_, group)| group.last().copied())
        .collect::<Vec<StateRecord>>()
}

#[cfg(test)]
use crate::observe::testing::RecordingObserver;
#[cfg(test)]
use crate::NoopObserver;

#[cfg(test)]
fn mklog(name: &str, records: &[(f64, u32)]) -> ResourceEventLog {
    ResourceEventLog {
        name: ustr::ustr(name),
        records: records
            .iter()
            .map(|&(timestamp, value)| StateRecord { timestamp, value })
            .collect(),
    }
}

#[cfg(test)]
fn deltas(series: &NormalizedDeltaSeries) -> Vec<(f64, i32)> {
    series.deltas.iter().map(|d| (d.timestamp, d.delta)).collect()
}

// This tests:
//  - the first delta is taken against the idle baseline, so a core that starts busy starts at +1
//  - occupancy above one is clamped
//  - a repeated state yields a zero delta

#[test]
fn test_normalize_basic() {
    let log = mklog("core0", &[(0.0, 1), (3.0, 4), (5.5, 0), (8.0, 0), (9.0, 2)]);
    let n = normalize(&log, &NoopObserver).unwrap();
    assert!(n.name.as_str() == "core0");
    assert!(deltas(&n) == vec![(0.0, 1), (3.0, 0), (5.5, -1), (8.0, 0), (9.0, 1)]);

    let idle_start = mklog("core1", &[(2.0, 0), (4.0, 1)]);
    let n = normalize(&idle_start, &NoopObserver).unwrap();
    assert!(deltas(&n) == vec![(2.0, 0), (4.0, 1)]);
}

// This tests:
//  - records (5,0),(5,1) collapse to one entry whose occupancy is 1
//  - the dropped records are reported to the observer

#[test]
fn test_normalize_duplicates() {
    let obs = RecordingObserver::default();
    let log = mklog("core7", &[(1.0, 0), (5.0, 0), (5.0, 1), (7.0, 1), (7.0, 0), (7.0, 3)]);
    let n = normalize(&log, &obs).unwrap();
    assert!(deltas(&n) == vec![(1.0, 0), (5.0, 1), (7.0, 0)]);
    let reported = obs.duplicates.lock().unwrap();
    assert!(*reported == vec![("core7".to_string(), 3)]);

    let n = normalize(&mklog("x", &[(5.0, 0), (5.0, 1)]), &NoopObserver).unwrap();
    assert!(n.deltas.len() == 1);
    assert!(n.to_event_log().records[0] == StateRecord { timestamp: 5.0, value: 1 });
}

// Normalizing the reconstructed clamped log gives back the same series.

#[test]
fn test_normalize_idempotent() {
    let log = mklog(
        "core3",
        &[(0.0, 2), (0.0, 0), (1.5, 3), (2.0, 1), (2.0, 1), (4.0, 0), (6.0, 5)],
    );
    let obs = RecordingObserver::default();
    let once = normalize(&log, &NoopObserver).unwrap();
    let twice = normalize(&once.to_event_log(), &obs).unwrap();
    assert!(once == twice);
    assert!(obs.duplicates.lock().unwrap().is_empty());
    assert!(once.deltas.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

// The running sum of the deltas never leaves [0, 1].

#[test]
fn test_normalize_running_sum() {
    let log = mklog(
        "core9",
        &[(0.0, 3), (1.0, 0), (1.0, 2), (2.0, 0), (3.0, 0), (4.0, 1), (4.5, 7), (9.0, 0)],
    );
    let n = normalize(&log, &NoopObserver).unwrap();
    let mut sum = IDLE_BASELINE;
    for d in &n.deltas {
        assert!(d.delta >= -1 && d.delta <= 1);
        sum += d.delta;
        assert!(sum == 0 || sum == 1);
    }
    assert!(sum == 0);
}

#[test]
fn test_normalize_errors() {
    assert!(matches!(
        normalize(&mklog("empty", &[]), &NoopObserver),
        Err(AnalysisError::MalformedLog { resource, .. }) if resource == "empty"
    ));
    assert!(matches!(
        normalize(&mklog("backwards", &[(3.0, 1), (2.0, 0)]), &NoopObserver),
        Err(AnalysisError::MalformedLog { .. })
    ));
}
