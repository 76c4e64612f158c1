/// Aggregation of the active (busy/idle) resources of a run.
///
/// Every log is normalized independently, possibly in parallel, and the normalized series are then
/// merged into the busy-count timeline on the calling thread.  The overall utilization is the
/// time-weighted average of busyCount(t) / resourceCount over [t_0, stop_time), where t_0 is the
/// earliest timestamp of any resource.
///
/// As a cross-check, every resource's busy time is also integrated directly from its own
/// normalized series over the same window, with the resource taken to be at IDLE_BASELINE before
/// its first record.  The per-resource busy times must add up to the busy time of the merged
/// timeline, and the mean of the per-resource utilizations must equal the overall utilization.
use crate::normalize::normalize;
use crate::{
    integrate, merge, AnalysisError, Breakpoint, MergedTimeline, NormalizedDeltaSeries, Observer,
    ResourceEventLog, Result, StepFunction, IDLE_BASELINE,
};
use ustr::Ustr;

#[derive(Debug, Clone)]
pub struct ResourceUtilization {
    pub name: Ustr,
    /// Integral of the busy indicator over the window, in seconds.
    pub busy_time: f64,
    pub window: f64,
    pub utilization: f64,
}

#[derive(Debug, Clone)]
pub struct ActiveUtilization {
    pub timeline: MergedTimeline,
    pub busy_count_series: StepFunction,
    pub resource_count: usize,
    pub busy_time: f64,
    pub window: f64,
    pub overall_utilization: f64,
    pub per_resource: Vec<ResourceUtilization>,
}

impl ActiveUtilization {
    pub fn start_time(&self) -> f64 {
        self.busy_count_series.breakpoints[0].timestamp
    }

    pub fn stop_time(&self) -> f64 {
        self.busy_count_series.stop_time
    }

    /// Mean over the resources of each resource's own utilization.
    pub fn mean_resource_utilization(&self) -> f64 {
        let sum = self
            .per_resource
            .iter()
            .map(|r| r.utilization)
            .sum::<f64>();
        sum / self.per_resource.len() as f64
    }
}

pub struct ActiveUtilizationAggregator<'a> {
    observer: &'a dyn Observer,
    #[cfg(feature = "parallel")]
    threads: usize,
}

impl<'a> ActiveUtilizationAggregator<'a> {
    pub fn new(observer: &'a dyn Observer) -> ActiveUtilizationAggregator<'a> {
        ActiveUtilizationAggregator {
            observer,
            #[cfg(feature = "parallel")]
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Use at most `threads` workers for normalization.  Zero means one.
    #[cfg(feature = "parallel")]
    pub fn with_threads(mut self, threads: usize) -> ActiveUtilizationAggregator<'a> {
        self.threads = threads.max(1);
        self
    }

    pub fn aggregate(&self, logs: &[ResourceEventLog], stop_time: f64) -> Result<ActiveUtilization> {
        if logs.is_empty() {
            return Err(AnalysisError::NoResources("active"));
        }
        let resource_count = logs.len();

        self.observer
            .progress(&format!("Normalizing {resource_count} active resource logs"));
        let series = self.normalize_all(logs)?;

        // Every series has at least one delta, normalize() rejects empty logs.
        let start_time = series
            .iter()
            .map(|s| s.deltas[0].timestamp)
            .fold(f64::INFINITY, f64::min);
        let per_resource = series
            .iter()
            .map(|s| measure(s, start_time, stop_time))
            .collect::<Result<Vec<ResourceUtilization>>>()?;

        self.observer.progress("Merging busy/idle transitions");
        let timeline = merge(series);
        let busy_count_series = timeline.to_step_function(stop_time);

        let busy = busy_count_series.integrate()?;
        let n = resource_count as f64;
        let overall_utilization = integrate(
            busy_count_series.breakpoints.iter().map(|b| Breakpoint {
                timestamp: b.timestamp,
                level: b.level / n,
            }),
            stop_time,
        )?
        .average()?;

        Ok(ActiveUtilization {
            timeline,
            busy_count_series,
            resource_count,
            busy_time: busy.weighted_sum,
            window: busy.duration(),
            overall_utilization,
            per_resource,
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn normalize_all(&self, logs: &[ResourceEventLog]) -> Result<Vec<NormalizedDeltaSeries>> {
        logs.iter().map(|l| normalize(l, self.observer)).collect()
    }

    // Workers each take a contiguous chunk of logs, so the results come back in input order.  The
    // merge is the barrier: nothing proceeds until every worker has finished.

    #[cfg(feature = "parallel")]
    fn normalize_all(&self, logs: &[ResourceEventLog]) -> Result<Vec<NormalizedDeltaSeries>> {
        let observer = self.observer;
        if self.threads <= 1 || logs.len() < 2 {
            return logs.iter().map(|l| normalize(l, observer)).collect();
        }
        let chunk_size = (logs.len() + self.threads - 1) / self.threads;
        std::thread::scope(|s| {
            let workers = logs
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|l| normalize(l, observer))
                            .collect::<Result<Vec<NormalizedDeltaSeries>>>()
                    })
                })
                .collect::<Vec<_>>();
            let mut result = Vec::with_capacity(logs.len());
            for w in workers {
                let normalized = w
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))?;
                result.extend(normalized);
            }
            Ok(result)
        })
    }
}

/// The utilization of one resource computed directly from its own log, over the window from its
/// first record to `stop_time`.

pub fn resource_utilization(
    log: &ResourceEventLog,
    stop_time: f64,
    observer: &dyn Observer,
) -> Result<ResourceUtilization> {
    let series = normalize(log, observer)?;
    let start_time = series.deltas[0].timestamp;
    measure(&series, start_time, stop_time)
}

// Integrate the busy indicator of one series over [start_time, stop_time).  The indicator is
// IDLE_BASELINE from start_time until the first delta.

fn measure(
    series: &NormalizedDeltaSeries,
    start_time: f64,
    stop_time: f64,
) -> Result<ResourceUtilization> {
    let mut breakpoints = vec![];
    if series.deltas.first().map(|d| d.timestamp) != Some(start_time) {
        breakpoints.push(Breakpoint {
            timestamp: start_time,
            level: IDLE_BASELINE as f64,
        });
    }
    let mut state = IDLE_BASELINE;
    for d in &series.deltas {
        state += d.delta;
        breakpoints.push(Breakpoint {
            timestamp: d.timestamp,
            level: state as f64,
        });
    }
    let integral = integrate(breakpoints, stop_time)?;
    Ok(ResourceUtilization {
        name: series.name,
        busy_time: integral.weighted_sum,
        window: integral.duration(),
        utilization: integral.average()?,
    })
}

#[cfg(test)]
use crate::{NoopObserver, StateRecord};

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
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// This tests:
//  - two resources busy over [0,10) and [5,15) give busy counts 2 at t=7 and 1 at t=12
//  - the overall utilization over [0,15) is (10+10)/(2*15)

#[test]
fn test_aggregate_two_resources() {
    let logs = vec![
        mklog("core0", &[(0.0, 1), (10.0, 0)]),
        mklog("core1", &[(5.0, 1), (15.0, 0)]),
    ];
    let u = ActiveUtilizationAggregator::new(&NoopObserver)
        .aggregate(&logs, 15.0)
        .unwrap();
    assert!(u.resource_count == 2);
    assert!(u.timeline.busy_at(7.0) == 2);
    assert!(u.timeline.busy_at(12.0) == 1);
    assert!(u.busy_count_series.level_at(7.0) == Some(2.0));
    assert!(u.busy_time == 20.0);
    assert!(u.window == 15.0);
    assert!(close(u.overall_utilization, 20.0 / 30.0));
    assert!(format!("{:.3}", u.overall_utilization) == "0.667");
    assert!(u.start_time() == 0.0);
    assert!(u.stop_time() == 15.0);
}

// The per-resource integrations agree with the merged aggregate.

#[test]
fn test_aggregate_cross_check() {
    let logs = vec![
        mklog("core0", &[(0.0, 1), (3.0, 3), (3.0, 0), (8.5, 2), (20.0, 0)]),
        mklog("core1", &[(2.0, 0), (4.0, 1), (4.0, 1), (11.0, 0), (12.0, 1)]),
        mklog("core2", &[(1.0, 2), (30.0, 0)]),
        mklog("core3", &[(6.0, 0)]),
    ];
    let u = ActiveUtilizationAggregator::new(&NoopObserver)
        .aggregate(&logs, 40.0)
        .unwrap();
    let sum = u.per_resource.iter().map(|r| r.busy_time).sum::<f64>();
    assert!(close(sum, u.busy_time));
    assert!(close(u.mean_resource_utilization(), u.overall_utilization));
    assert!(u.per_resource.iter().all(|r| r.window == 40.0));
    assert!(u.per_resource[0].busy_time == 3.0 + 11.5);
    assert!(u.per_resource[3].busy_time == 0.0);
    assert!(u.timeline.entries.iter().all(|e| e.busy >= 0 && e.busy <= 4));
}

#[cfg(feature = "parallel")]
#[test]
fn test_aggregate_threads() {
    let logs = (0..37)
        .map(|i| {
            let t = i as f64;
            mklog(&format!("core{i}"), &[(t, 1), (t + 10.0, 0), (t + 10.0, 1), (t + 50.0, 0)])
        })
        .collect::<Vec<_>>();
    let serial = ActiveUtilizationAggregator::new(&NoopObserver)
        .with_threads(1)
        .aggregate(&logs, 100.0)
        .unwrap();
    let parallel = ActiveUtilizationAggregator::new(&NoopObserver)
        .with_threads(4)
        .aggregate(&logs, 100.0)
        .unwrap();
    assert!(serial.timeline.entries == parallel.timeline.entries);
    assert!(serial.overall_utilization == parallel.overall_utilization);
    assert!(parallel.per_resource[36].name.as_str() == "core36");
}

#[test]
fn test_aggregate_errors() {
    let agg = ActiveUtilizationAggregator::new(&NoopObserver);
    assert!(matches!(
        agg.aggregate(&[], 10.0),
        Err(AnalysisError::NoResources(_))
    ));
    assert!(matches!(
        agg.aggregate(&[mklog("core0", &[(0.0, 1), (12.0, 0)])], 10.0),
        Err(AnalysisError::InvalidRange(_))
    ));
    assert!(matches!(
        agg.aggregate(&[mklog("core0", &[(4.0, 1)])], 4.0),
        Err(AnalysisError::ZeroDuration(_))
    ));
}

// This tests:
//  - a single-row log whose stop time equals its timestamp has no average
//  - a resource busy over its whole window has utilization 1

#[test]
fn test_resource_utilization() {
    assert!(matches!(
        resource_utilization(&mklog("core0", &[(5.0, 1)]), 5.0, &NoopObserver),
        Err(AnalysisError::ZeroDuration(t)) if t == 5.0
    ));

    let r = resource_utilization(&mklog("core0", &[(2.0, 1), (6.0, 3)]), 10.0, &NoopObserver)
        .unwrap();
    assert!(r.utilization == 1.0);
    assert!(r.window == 8.0);

    let r = resource_utilization(
        &mklog("core1", &[(0.0, 0), (2.0, 1), (6.0, 0)]),
        10.0,
        &NoopObserver,
    )
    .unwrap();
    assert!(r.busy_time == 4.0);
    assert!(r.utilization == 0.4);
}
