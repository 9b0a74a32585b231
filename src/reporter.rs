//! Sink for test failures.

use std::sync::{Arc, Mutex, PoisonError};

/// Receives failures detected by the stub server.
///
/// The server never inspects what the reporter does with a message.
pub trait TestReporter: Send + Sync {
    /// Record a failure and let the test continue.
    fn report_non_fatal_failure(&self, message: &str);

    /// Record a failure the test cannot recover from.
    fn report_fatal_failure(&self, message: &str);
}

impl<T: TestReporter + ?Sized> TestReporter for Arc<T> {
    fn report_non_fatal_failure(&self, message: &str) {
        (**self).report_non_fatal_failure(message)
    }

    fn report_fatal_failure(&self, message: &str) {
        (**self).report_fatal_failure(message)
    }
}

/// Reporter that keeps every failure for later assertions.
///
/// Clones share the same failure list.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    failures: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All failures reported so far.
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    /// Panic with every recorded failure if any were reported.
    pub fn assert_clean(&self) {
        let failures = self.failures();
        if !failures.is_empty() {
            panic!("stub server reported failures:{}", failures.join("\n"));
        }
    }

    fn record(&self, message: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

impl TestReporter for RecordingReporter {
    fn report_non_fatal_failure(&self, message: &str) {
        self.record(message);
    }

    fn report_fatal_failure(&self, message: &str) {
        self.record(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_failures() {
        let reporter = RecordingReporter::new();
        let clone = reporter.clone();

        clone.report_non_fatal_failure("first");
        clone.report_fatal_failure("second");

        assert_eq!(reporter.failures(), vec!["first", "second"]);
        assert!(!reporter.is_clean());
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_assert_clean_panics_with_failures() {
        let reporter = RecordingReporter::new();
        reporter.report_non_fatal_failure("boom");
        reporter.assert_clean();
    }
}
