use super::{SyncEngine, SyncReport};
use crate::state::LogEntry;

impl SyncEngine {
    /// Give every failing entry in `history` exactly one more copy attempt,
    /// in history order, persisting each outcome.
    ///
    /// Nothing here aborts the run; failures stay on the entries for the next
    /// pass.
    pub(super) async fn retry_failing(
        &self,
        subject: &str,
        history: &[LogEntry],
        report: &mut SyncReport,
    ) {
        let failing: Vec<&LogEntry> = history.iter().filter(|e| e.is_failing()).collect();
        if failing.is_empty() {
            return;
        }
        tracing::info!(subject, count = failing.len(), "Retrying previously failed documents");

        for previous in failing {
            let mut entry = previous.clone();
            report.retried += 1;
            if self.copy(&mut entry).await {
                report.recovered += 1;
            } else {
                report.failed += 1;
            }
            self.persist(&entry, report).await;
        }
    }
}
