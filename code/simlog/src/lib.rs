/// A simulation run leaves behind a directory of *state logs*: for every simulated core there is a
/// log of (timestamp, occupancy) pairs recording each change of its busy/idle state, for every
/// node there is a log of (timestamp, available slots) pairs for its job-slot pool, and there are
/// logs of job completions and job response times.  Timestamps are simulation seconds.
///
/// The state logs are *sparse*: a record marks the start of a state, the state holds until the
/// next record, and the last record's state holds until the end of the observation window, the
/// *stop time*, which is never inferred from any single record.  The logs may contain several
/// records with the same timestamp, and an active resource may report an occupancy greater than
/// one when several threads use it at once.
///
/// This library has as its fundamental task to reduce these logs to utilization metrics:
///
/// - Read the logs, handling the optional header line and rejecting malformed records.
///
/// - Classify the files of a run directory by name into the kinds of logs above.
///
/// - Normalize each core's log into a sequence of busy/idle transitions (+1, 0, -1), resolving
///   duplicate timestamps by keeping the last record.
///
/// - Merge the transitions of all cores into one timeline and reconstruct the number of busy cores
///   at each instant by prefix summation.
///
/// - Integrate step functions over the observation window to get exact time-weighted averages:
///   the overall core utilization, and the average number of occupied job slots per pool.
///
/// There is an important invariant on the merged timeline:
///
/// - the running sum of the transitions up to and including any timestamp is exactly the number of
///   busy cores at that instant
///
/// which holds only if every core's first transition is taken relative to the idle baseline (see
/// normalize.rs).
mod active;
mod classify;
mod error;
mod logfile;
mod merge;
mod normalize;
mod observe;
mod passive;
mod report;
mod stepfn;

use ustr::Ustr;

// The error taxonomy for everything in this library that looks at log contents.

pub use error::AnalysisError;
pub use error::Result;

// Receivers of diagnostics from the normalizer and the aggregators, instead of a global logger.

pub use observe::NoopObserver;
pub use observe::Observer;
pub use observe::TracingObserver;

// Read state logs, response-time logs, and completion logs, from files or from any reader.

pub use logfile::count_records;
pub use logfile::parse_response_times;
pub use logfile::parse_state_records;
pub use logfile::read_active_logs;
pub use logfile::read_passive_pools;
pub use logfile::read_response_times;
pub use logfile::read_state_records;

// Sort the files of a run directory into the kinds of logs we know about.

pub use classify::classify_run_directory;
pub use classify::Classifier;
pub use classify::RunFiles;

// Turn one core's raw log into busy/idle transitions.  The idle state that every core is assumed
// to be in before its first record is the constant below.

pub use normalize::normalize;
pub use normalize::IDLE_BASELINE;

// Integrate a piecewise-constant signal over a window that ends at an explicit time.

pub use stepfn::integrate;
pub use stepfn::Breakpoint;
pub use stepfn::Integral;
pub use stepfn::Segment;
pub use stepfn::StepFunction;

// Merge the transitions of many cores into one timeline with busy-core counts.

pub use merge::merge;
pub use merge::MergedTimeline;
pub use merge::TimelineEntry;

// Aggregate a set of core logs into the busy-core series and the overall utilization, and compute
// the utilization of a single core directly from its log.

pub use active::resource_utilization;
pub use active::ActiveUtilization;
pub use active::ActiveUtilizationAggregator;
pub use active::ResourceUtilization;

// Aggregate a set of job-slot pools into average used slots and total capacity.

pub use passive::pool_utilization;
pub use passive::PassiveUtilization;
pub use passive::PassiveUtilizationAggregator;
pub use passive::PoolUtilization;

// The products of a run: the aggregate report, its metadata record, and the tables written for
// the formatting and charting collaborators.

pub use report::compare_throughput;
pub use report::resample;
pub use report::response_summary;
pub use report::simulation_days;
pub use report::throughput_table;
pub use report::utilization_table;
pub use report::walltime_table;
pub use report::Metadata;
pub use report::ResponseSummary;
pub use report::Rounding;
pub use report::Sample;
pub use report::Throughput;
pub use report::ThroughputComparison;
pub use report::UtilizationReport;
pub use report::UtilizationRow;
pub use report::WalltimeRow;
pub use report::SECONDS_PER_DAY;

/// One record of a state log: the time at which a state starts, and the state.  For an active
/// resource the value is the number of threads occupying it, for a passive resource it is the
/// number of available slots.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateRecord {
    pub timestamp: f64,
    pub value: u32,
}

/// The raw log of one active (busy/idle) resource, typically a core, in file order.  It may have
/// duplicate timestamps and values greater than 1.  It is consumed by normalization.

#[derive(Debug, Clone)]
pub struct ResourceEventLog {
    pub name: Ustr,
    pub records: Vec<StateRecord>,
}

/// The raw log of one passive (capacity-bearing) resource, typically one node's job-slot pool, in
/// file order.  Duplicate timestamps are resolved by keeping the last record for each timestamp.

#[derive(Debug, Clone)]
pub struct PassiveResourcePool {
    pub name: Ustr,
    pub records: Vec<StateRecord>,
}

/// A change in the busy indicator of one resource at a point in time.  `delta` is -1, 0, or +1.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub timestamp: f64,
    pub delta: i32,
}

/// The normalized form of a ResourceEventLog: strictly increasing timestamps, and the deltas of
/// the busy indicator (occupancy clamped to 0 or 1), with the first delta taken against the idle
/// baseline.

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDeltaSeries {
    pub name: Ustr,
    pub deltas: Vec<Delta>,
}

impl NormalizedDeltaSeries {
    /// Reconstruct a log of clamped binary states from the deltas.  Normalizing the result yields
    /// the same series.

    pub fn to_event_log(&self) -> ResourceEventLog {
        let mut state = IDLE_BASELINE;
        let records = self
            .deltas
            .iter()
            .map(|d| {
                state += d.delta;
                StateRecord {
                    timestamp: d.timestamp,
                    value: state as u32,
                }
            })
            .collect::<Vec<StateRecord>>();
        ResourceEventLog {
            name: self.name,
            records,
        }
    }
}

/// One record of a response-time log: the completion time of a job and its response time
/// (walltime), both in simulation seconds.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseRecord {
    pub time: f64,
    pub response_time: f64,
}
