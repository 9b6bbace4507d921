use std::sync::{Arc, Mutex, PoisonError};

use super::RunReport;

/// Holds the most recent run for download endpoints.
///
/// `replace` swaps in the new report and drops the previous one; there is
/// never more than one live report per server.
#[derive(Clone, Debug, Default)]
pub struct LatestRun {
    slot: Arc<Mutex<Option<Arc<RunReport>>>>,
}

impl LatestRun {
    pub fn replace(&self, report: RunReport) -> Arc<RunReport> {
        let report = Arc::new(report);
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&report));
        drop(previous);
        report
    }

    pub fn current(&self) -> Option<Arc<RunReport>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
