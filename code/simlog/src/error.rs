/// Errors are raised by the component that first sees the bad precondition and are never
/// suppressed inside the library.  A degenerate denominator is an error, not a zero or a NaN.
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// An input log is empty, or a record in it can't be parsed, or the records are out of order.
    #[error("Malformed log {resource}: {reason}")]
    MalformedLog { resource: String, reason: String },

    /// The integration window does not contain the data: the end time precedes a breakpoint, or
    /// the breakpoints are not ordered, or there are none.
    #[error("Invalid integration range: {0}")]
    InvalidRange(String),

    /// The integration window has zero length, so there is no average.
    #[error("Zero-length integration window at time {0}")]
    ZeroDuration(f64),

    /// The passive resources have no slots at all, so there is no utilization ratio.
    #[error("Total capacity of the passive resources is zero")]
    ZeroCapacity,

    /// An aggregator was given no resources.
    #[error("No {0} resources to aggregate")]
    NoResources(&'static str),

    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl AnalysisError {
    pub(crate) fn malformed(resource: &str, reason: impl Into<String>) -> AnalysisError {
        AnalysisError::MalformedLog {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
