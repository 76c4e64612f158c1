/// Merge the normalized delta series of many resources into one timeline.
///
/// All deltas are pooled, sorted by timestamp, and the deltas at each distinct timestamp are
/// summed.  The busy count at each timestamp is the running sum of the combined deltas, so it is
/// the number of resources whose busy indicator is 1 from that timestamp until the next one.
///
/// Combining every event at a timestamp before taking the running sum matters: a prefix sum over
/// unmerged events at the same timestamp would expose an intermediate count that the system was
/// never actually in.
use crate::{Breakpoint, NormalizedDeltaSeries, StepFunction};
use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    pub timestamp: f64,
    pub delta: i64,
    pub busy: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MergedTimeline {
    pub entries: Vec<TimelineEntry>,
}

pub fn merge<I>(series: I) -> MergedTimeline
where
    I: IntoIterator<Item = NormalizedDeltaSeries>,
{
    let mut all = series
        .into_iter()
        .flat_map(|s| s.deltas.into_iter())
        .collect::<Vec<_>>();
    all.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut busy = 0i64;
    let entries = all
        .iter()
        .group_by(|d| d.timestamp)
        .into_iter()
        .map(|(timestamp, group)| {
            let delta = group.map(|d| d.delta as i64).sum::<i64>();
            busy += delta;
            TimelineEntry {
                timestamp,
                delta,
                busy,
            }
        })
        .collect::<Vec<TimelineEntry>>();

    MergedTimeline { entries }
}

impl MergedTimeline {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The number of busy resources at time `t`, which is zero before the first entry.
    pub fn busy_at(&self, t: f64) -> i64 {
        let ix = self.entries.partition_point(|e| e.timestamp <= t);
        if ix == 0 {
            0
        } else {
            self.entries[ix - 1].busy
        }
    }

    pub fn to_step_function(&self, stop_time: f64) -> StepFunction {
        StepFunction {
            breakpoints: self
                .entries
                .iter()
                .map(|e| Breakpoint {
                    timestamp: e.timestamp,
                    level: e.busy as f64,
                })
                .collect(),
            stop_time,
        }
    }
}

#[cfg(test)]
use crate::Delta;

#[cfg(test)]
fn series(name: &str, deltas: &[(f64, i32)]) -> NormalizedDeltaSeries {
    NormalizedDeltaSeries {
        name: ustr::ustr(name),
        deltas: deltas
            .iter()
            .map(|&(timestamp, delta)| Delta { timestamp, delta })
            .collect(),
    }
}

// This tests:
//  - timestamps in the output are strictly increasing and are the union of the input timestamps
//  - deltas at equal timestamps across resources are summed into one entry
//  - the busy count is the running sum

#[test]
fn test_merge_basic() {
    let m = merge(vec![
        series("a", &[(0.0, 1), (10.0, -1)]),
        series("b", &[(5.0, 1), (10.0, 0), (15.0, -1)]),
        series("c", &[(10.0, 1), (12.0, 0)]),
    ]);
    let got = m
        .entries
        .iter()
        .map(|e| (e.timestamp, e.delta, e.busy))
        .collect::<Vec<_>>();
    assert!(
        got == vec![
            (0.0, 1, 1),
            (5.0, 1, 2),
            (10.0, 0, 2),
            (12.0, 0, 2),
            (15.0, -1, 1)
        ]
    );
    assert!(m.busy_at(-1.0) == 0);
    assert!(m.busy_at(7.0) == 2);
    assert!(m.busy_at(15.0) == 1);
}

// A swap of busy state between two resources at the same instant never shows up as a transient.

#[test]
fn test_merge_simultaneous() {
    let m = merge(vec![
        series("a", &[(0.0, 1), (4.0, -1)]),
        series("b", &[(0.0, 0), (4.0, 1), (8.0, -1)]),
    ]);
    assert!(m.len() == 3);
    assert!(m.entries.iter().all(|e| e.busy == 1 || e.timestamp == 8.0));
    assert!(m.entries[2].busy == 0);
}

#[test]
fn test_merge_empty() {
    assert!(merge(Vec::<NormalizedDeltaSeries>::new()).is_empty());
    let m = merge(vec![series("a", &[])]);
    assert!(m.is_empty());
    assert!(m.busy_at(100.0) == 0);
}

#[test]
fn test_merge_step_function() {
    let m = merge(vec![
        series("a", &[(0.0, 1), (10.0, -1)]),
        series("b", &[(5.0, 1), (15.0, -1)]),
    ]);
    let f = m.to_step_function(15.0);
    assert!(f.breakpoints.len() == 4);
    assert!(f.integrate().unwrap().weighted_sum == 20.0);
}
