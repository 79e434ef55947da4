//! Outer reporting tier for explicit user actions.
//!
//! Sync operations return plain results. Call sites that act on behalf of
//! the user pass the result through [`report`] so success and failure reach
//! a [`Reporter`]; silent callers skip it.

use std::fmt::Display;

use tracing::{info, warn};

use crate::sync::types::SyncError;

/// Destination for user-facing sync outcomes.
pub trait Reporter: Send + Sync {
    fn success(&self, action: &str, detail: &str);
    fn failure(&self, action: &str, error: &SyncError);
}

/// Reporter that writes outcomes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn success(&self, action: &str, detail: &str) {
        info!(action, detail, "sync action succeeded");
    }

    fn failure(&self, action: &str, error: &SyncError) {
        warn!(action, kind = ?error.kind(), error = %error, "sync action failed");
    }
}

/// Surface `result` through `reporter` and hand it back unchanged.
pub fn report<T: Display>(
    reporter: &dyn Reporter,
    action: &str,
    result: Result<T, SyncError>,
) -> Result<T, SyncError> {
    match &result {
        Ok(value) => reporter.success(action, &value.to_string()),
        Err(err) => reporter.failure(action, err),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        lines: Mutex<Vec<String>>,
    }

    impl Reporter for Recording {
        fn success(&self, action: &str, detail: &str) {
            self.lines.lock().unwrap().push(format!("ok {action}: {detail}"));
        }

        fn failure(&self, action: &str, error: &SyncError) {
            self.lines.lock().unwrap().push(format!("err {action}: {}", error.user_message()));
        }
    }

    #[test]
    fn success_and_failure_are_reported_and_returned() {
        let reporter = Recording::default();

        let ok = report(&reporter, "dedupe", Ok::<usize, SyncError>(2));
        assert_eq!(ok.unwrap(), 2);

        let err = report(&reporter, "pull", Err::<usize, SyncError>(SyncError::NotConfigured));
        assert!(matches!(err, Err(SyncError::NotConfigured)));

        let lines = reporter.lines.lock().unwrap();
        assert_eq!(lines[0], "ok dedupe: 2");
        assert!(lines[1].starts_with("err pull: Sync is not set up"));
    }
}
