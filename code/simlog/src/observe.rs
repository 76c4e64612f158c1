// Diagnostics from the normalizer and the aggregators go to an Observer passed in by the caller.
// Observers are shared by the normalization workers, hence Sync.

pub trait Observer: Sync {
    /// `count` records of `resource` were dropped because a later record had the same timestamp.
    fn duplicates_resolved(&self, _resource: &str, _count: usize) {}

    fn progress(&self, _message: &str) {}
}

pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Forwards diagnostics to whatever `tracing` subscriber the program has installed.

pub struct TracingObserver;

impl Observer for TracingObserver {
    fn duplicates_resolved(&self, resource: &str, count: usize) {
        tracing::warn!(resource, count, "Utilization time series has duplicates");
    }

    fn progress(&self, message: &str) {
        tracing::info!("{message}");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Observer;
    use std::sync::Mutex;

    // Records every duplicate report so that tests can inspect them.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub duplicates: Mutex<Vec<(String, usize)>>,
    }

    impl Observer for RecordingObserver {
        fn duplicates_resolved(&self, resource: &str, count: usize) {
            self.duplicates
                .lock()
                .unwrap()
                .push((resource.to_string(), count));
        }
    }
}
