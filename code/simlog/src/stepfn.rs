/// Time-weighted integration of piecewise-constant signals.
///
/// A signal is given by breakpoints (t_i, level_i), i = 0..n-1, with t_0 <= t_1 <= ..., where
/// level_i holds over [t_i, t_{i+1}).  The last level holds until an explicitly supplied end time
/// t_n, because the last breakpoint marks the start of the final state and not its end.  Then
///
///   weighted_sum = sum_i level_i * (t_{i+1} - t_i)
///   average      = weighted_sum / (t_n - t_0)
///
/// Both aggregators use this for all their averages; there is no other integration code.
use crate::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub timestamp: f64,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub level: f64,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct Integral {
    pub segments: Vec<Segment>,
    pub weighted_sum: f64,
}

impl Integral {
    /// The length of the integration window, t_n - t_0.  Invariant: this equals the sum of the
    /// segment lengths.

    pub fn duration(&self) -> f64 {
        // There is always at least one segment.
        self.segments[self.segments.len() - 1].end - self.segments[0].start
    }

    pub fn average(&self) -> Result<f64> {
        let duration = self.duration();
        if duration == 0.0 {
            return Err(AnalysisError::ZeroDuration(self.segments[0].start));
        }
        Ok(self.weighted_sum / duration)
    }
}

/// Integrate the signal given by `breakpoints` over [t_0, end_time).  Fails with InvalidRange if
/// there are no breakpoints, if they are not in order, or if `end_time` precedes the last of them.

pub fn integrate<I>(breakpoints: I, end_time: f64) -> Result<Integral>
where
    I: IntoIterator<Item = Breakpoint>,
{
    let mut segments: Vec<Segment> = vec![];
    let mut weighted_sum = 0.0;
    let mut pending: Option<Breakpoint> = None;
    for b in breakpoints {
        if let Some(p) = pending {
            if b.timestamp < p.timestamp {
                return Err(AnalysisError::InvalidRange(format!(
                    "breakpoint at {} follows breakpoint at {}",
                    b.timestamp, p.timestamp
                )));
            }
            weighted_sum += p.level * (b.timestamp - p.timestamp);
            segments.push(Segment {
                start: p.timestamp,
                end: b.timestamp,
                level: p.level,
            });
        }
        pending = Some(b);
    }
    let last = match pending {
        Some(p) => p,
        None => {
            return Err(AnalysisError::InvalidRange(
                "no breakpoints to integrate".to_string(),
            ))
        }
    };
    if end_time < last.timestamp {
        return Err(AnalysisError::InvalidRange(format!(
            "end time {end_time} precedes the last breakpoint at {}",
            last.timestamp
        )));
    }
    weighted_sum += last.level * (end_time - last.timestamp);
    segments.push(Segment {
        start: last.timestamp,
        end: end_time,
        level: last.level,
    });
    Ok(Integral {
        segments,
        weighted_sum,
    })
}

/// A step function with its end time attached, so that it can be integrated or sampled without
/// further context.

#[derive(Debug, Clone)]
pub struct StepFunction {
    pub breakpoints: Vec<Breakpoint>,
    pub stop_time: f64,
}

impl StepFunction {
    pub fn integrate(&self) -> Result<Integral> {
        integrate(self.breakpoints.iter().copied(), self.stop_time)
    }

    /// The level in effect at time `t`, or None if `t` is before the first breakpoint or at or
    /// after the stop time.  Among breakpoints with equal timestamps the last one is in effect.

    pub fn level_at(&self, t: f64) -> Option<f64> {
        if t >= self.stop_time {
            return None;
        }
        let ix = self.breakpoints.partition_point(|b| b.timestamp <= t);
        if ix == 0 {
            None
        } else {
            Some(self.breakpoints[ix - 1].level)
        }
    }
}

#[cfg(test)]
fn bp(timestamp: f64, level: f64) -> Breakpoint {
    Breakpoint { timestamp, level }
}

#[test]
fn test_integrate_segments() {
    let i = integrate(vec![bp(2.0, 1.0), bp(5.0, 3.0), bp(5.0, 0.0), bp(9.5, 2.0)], 12.0).unwrap();
    assert!(i.segments.len() == 4);
    assert!(i.segments[0] == Segment { start: 2.0, end: 5.0, level: 1.0 });
    assert!(i.segments[1].length() == 0.0);
    assert!(i.segments[3] == Segment { start: 9.5, end: 12.0, level: 2.0 });
    assert!(i.weighted_sum == 3.0 + 0.0 + 0.0 + 5.0);
    assert!(i.duration() == 10.0);
    assert!(i.average().unwrap() == 0.8);
}

// Segment lengths always add up to the length of the window.

#[test]
fn test_integrate_conservation() {
    let points = vec![
        bp(0.25, 1.0),
        bp(1.0, 0.0),
        bp(1.0, 4.0),
        bp(3.75, 2.0),
        bp(100.5, 1.0),
    ];
    for end in [100.5, 101.0, 2048.125] {
        let i = integrate(points.iter().copied(), end).unwrap();
        let total = i.segments.iter().fold(0.0, |acc, s| acc + s.length());
        assert!(total == end - 0.25);
        assert!(i.duration() == end - 0.25);
        assert!(i.segments.iter().all(|s| s.length() >= 0.0));
    }
}

#[test]
fn test_integrate_errors() {
    assert!(matches!(
        integrate(vec![], 10.0),
        Err(AnalysisError::InvalidRange(_))
    ));
    assert!(matches!(
        integrate(vec![bp(0.0, 1.0), bp(20.0, 0.0)], 10.0),
        Err(AnalysisError::InvalidRange(_))
    ));
    assert!(matches!(
        integrate(vec![bp(5.0, 1.0), bp(4.0, 0.0)], 10.0),
        Err(AnalysisError::InvalidRange(_))
    ));

    // A window of length zero integrates fine but has no average.
    let i = integrate(vec![bp(7.0, 1.0)], 7.0).unwrap();
    assert!(i.weighted_sum == 0.0);
    assert!(matches!(i.average(), Err(AnalysisError::ZeroDuration(t)) if t == 7.0));
}

#[test]
fn test_step_function_level_at() {
    let f = StepFunction {
        breakpoints: vec![bp(1.0, 1.0), bp(4.0, 2.0), bp(4.0, 3.0), bp(6.0, 0.0)],
        stop_time: 10.0,
    };
    assert!(f.level_at(0.5).is_none());
    assert!(f.level_at(1.0) == Some(1.0));
    assert!(f.level_at(3.999) == Some(1.0));
    assert!(f.level_at(4.0) == Some(3.0));
    assert!(f.level_at(9.0) == Some(0.0));
    assert!(f.level_at(10.0).is_none());
    assert!(f.integrate().unwrap().weighted_sum == 3.0 + 6.0);
}
