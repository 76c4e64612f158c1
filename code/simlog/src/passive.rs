/// Aggregation of the passive (capacity-bearing) resources of a run, typically the job-slot pool of
/// every node.
///
/// A pool's log records the number of *available* slots.  Pools are not merged; each is reduced on
/// its own and the results are summed:
///
///  - the records are stably sorted by time and grouped by timestamp, keeping the last record
///  - the capacity is the maximum available count ever observed
///  - the available count is integrated from the first record to the stop time, the last count
///    persisting until then, and the average occupied slots are capacity - average available
///
/// Totals are the plain sums over pools, so pools of different size contribute in proportion to
/// their size.
use crate::normalize::last_per_timestamp;
use crate::{integrate, AnalysisError, Breakpoint, Observer, PassiveResourcePool, Result};
use ustr::Ustr;

#[derive(Debug, Clone)]
pub struct PoolUtilization {
    pub name: Ustr,
    pub capacity: u64,
    pub average_available: f64,
    pub average_used: f64,
}

impl PoolUtilization {
    /// None for a pool that never had any slots.
    pub fn utilization(&self) -> Option<f64> {
        if self.capacity == 0 {
            None
        } else {
            Some(self.average_used / self.capacity as f64)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassiveUtilization {
    pub pools: Vec<PoolUtilization>,
    pub total_capacity: u64,
    pub average_used_slots: f64,
    pub utilization_ratio: f64,
}

pub fn pool_utilization(
    pool: &PassiveResourcePool,
    stop_time: f64,
    observer: &dyn Observer,
) -> Result<PoolUtilization> {
    if pool.records.is_empty() {
        return Err(AnalysisError::malformed(pool.name.as_str(), "log has no records"));
    }

    let mut sorted = pool.records.clone();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let records = last_per_timestamp(&sorted);
    let dropped = sorted.len() - records.len();
    if dropped > 0 {
        observer.duplicates_resolved(pool.name.as_str(), dropped);
    }

    let capacity = pool.records.iter().map(|r| r.value).max().unwrap_or(0) as u64;
    let average_available = integrate(
        records.iter().map(|r| Breakpoint {
            timestamp: r.timestamp,
            level: r.value as f64,
        }),
        stop_time,
    )?
    .average()?;

    Ok(PoolUtilization {
        name: pool.name,
        capacity,
        average_available,
        average_used: capacity as f64 - average_available,
    })
}

pub struct PassiveUtilizationAggregator<'a> {
    observer: &'a dyn Observer,
}

impl<'a> PassiveUtilizationAggregator<'a> {
    pub fn new(observer: &'a dyn Observer) -> PassiveUtilizationAggregator<'a> {
        PassiveUtilizationAggregator { observer }
    }

    pub fn aggregate(
        &self,
        pools: &[PassiveResourcePool],
        stop_time: f64,
    ) -> Result<PassiveUtilization> {
        if pools.is_empty() {
            return Err(AnalysisError::NoResources("passive"));
        }
        self.observer
            .progress(&format!("Averaging {} passive resource pools", pools.len()));

        let pools = pools
            .iter()
            .map(|p| pool_utilization(p, stop_time, self.observer))
            .collect::<Result<Vec<PoolUtilization>>>()?;
        let total_capacity = pools.iter().map(|p| p.capacity).sum::<u64>();
        let average_used_slots = pools.iter().map(|p| p.average_used).sum::<f64>();
        if total_capacity == 0 {
            return Err(AnalysisError::ZeroCapacity);
        }

        Ok(PassiveUtilization {
            pools,
            total_capacity,
            average_used_slots,
            utilization_ratio: average_used_slots / total_capacity as f64,
        })
    }
}

#[cfg(test)]
use crate::observe::testing::RecordingObserver;
#[cfg(test)]
use crate::{NoopObserver, StateRecord};

#[cfg(test)]
fn mkpool(name: &str, records: &[(f64, u32)]) -> PassiveResourcePool {
    PassiveResourcePool {
        name: ustr::ustr(name),
        records: records
            .iter()
            .map(|&(timestamp, value)| StateRecord { timestamp, value })
            .collect(),
    }
}

// This tests:
//  - pools of capacity 4 and 6 with average occupancy 2 and 3 add up to capacity 10 and 5 used
//  - the ratio is computed from the sums, not as a mean of the per-pool ratios

#[test]
fn test_aggregate_additivity() {
    let pools = vec![
        mkpool("node1", &[(0.0, 4), (10.0, 0)]),
        mkpool("node2", &[(0.0, 6), (10.0, 0)]),
    ];
    let p = PassiveUtilizationAggregator::new(&NoopObserver)
        .aggregate(&pools, 20.0)
        .unwrap();
    assert!(p.total_capacity == 10);
    assert!(p.average_used_slots == 5.0);
    assert!(p.utilization_ratio == 0.5);
    assert!(p.pools[0].average_used == 2.0);
    assert!(p.pools[1].average_available == 3.0);
    assert!(p.pools[1].utilization() == Some(0.5));

    let pools = vec![
        mkpool("small", &[(0.0, 1), (5.0, 0)]),
        mkpool("large", &[(0.0, 9)]),
    ];
    let p = PassiveUtilizationAggregator::new(&NoopObserver)
        .aggregate(&pools, 10.0)
        .unwrap();
    assert!(p.total_capacity == 10);
    assert!(p.average_used_slots == 0.5);
    assert!(p.utilization_ratio == 0.05);
}

// This tests:
//  - the last record at a timestamp wins, also when the records are out of order in the file
//  - the capacity is taken over the raw records, including those dropped by grouping

#[test]
fn test_pool_grouping() {
    let obs = RecordingObserver::default();
    let pool = mkpool("node3", &[(10.0, 2), (0.0, 8), (0.0, 4), (10.0, 3)]);
    let p = pool_utilization(&pool, 20.0, &obs).unwrap();
    assert!(p.capacity == 8);
    assert!(p.average_available == 3.5);
    assert!(p.average_used == 4.5);
    assert!(*obs.duplicates.lock().unwrap() == vec![("node3".to_string(), 2)]);
}

#[test]
fn test_passive_errors() {
    let agg = PassiveUtilizationAggregator::new(&NoopObserver);
    assert!(matches!(
        agg.aggregate(&[], 10.0),
        Err(AnalysisError::NoResources(_))
    ));
    assert!(matches!(
        agg.aggregate(&[mkpool("a", &[(0.0, 0)]), mkpool("b", &[(1.0, 0)])], 10.0),
        Err(AnalysisError::ZeroCapacity)
    ));
    assert!(matches!(
        agg.aggregate(&[mkpool("a", &[])], 10.0),
        Err(AnalysisError::MalformedLog { .. })
    ));
    assert!(matches!(
        agg.aggregate(&[mkpool("a", &[(0.0, 4), (30.0, 2)])], 10.0),
        Err(AnalysisError::InvalidRange(_))
    ));
    assert!(matches!(
        agg.aggregate(&[mkpool("a", &[(10.0, 4)])], 10.0),
        Err(AnalysisError::ZeroDuration(_))
    ));
}
