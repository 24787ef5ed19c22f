//! Incremental sync engine: moves a subject's new documents from the source
//! registry to the ingest sink, using the transaction log to copy each
//! document successfully at most once and to retry failures on later runs.
//!
//! One `synchronize` call runs, in order:
//! 1. load the subject's history (fatal on failure)
//! 2. retry every failing entry once
//! 3. compute the query watermark from the history loaded in step 1
//! 4. query the registry from the watermark (fatal on failure or rejection)
//! 5. drop unsupported formats and already-known documents
//! 6. copy each remaining document and log the outcome

mod copy;
pub mod error;
mod filter;
mod reconcile;
#[cfg(test)]
pub(crate) mod testutil;
pub mod watermark;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::SyncError;

use crate::sink::SinkClient;
use crate::source::SourceClient;
use crate::state::{LogEntry, LogStore};

/// Outcome counts for one subject's `synchronize` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Failing entries given another attempt.
    pub retried: u64,
    /// Retried entries that succeeded.
    pub recovered: u64,
    /// New log entries created from the query response.
    pub discovered: u64,
    /// Newly discovered documents copied on their first attempt.
    pub copied: u64,
    /// Attempts (retried or new) that failed.
    pub failed: u64,
    pub skipped_unsupported: u64,
    pub skipped_known: u64,
    /// Attempts whose outcome could not be written to the log.
    pub persistence_failures: u64,
}

/// Synchronizes one subject at a time against injected collaborators.
///
/// Holds no per-subject state, so one engine can serve many subjects
/// concurrently. Concurrent runs for the *same* subject are not safe.
pub struct SyncEngine {
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn SinkClient>,
    store: Arc<dyn LogStore>,
    copy_dir: Option<PathBuf>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn SinkClient>,
        store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            copy_dir: None,
        }
    }

    /// Also write every fetched document under `dir` before ingesting it.
    ///
    /// The directory is created now; write failures during a run are only
    /// logged.
    pub fn with_local_copies(mut self, dir: &Path) -> Result<Self, SyncError> {
        let invalid = |source| SyncError::LocalCopyDir {
            path: dir.to_path_buf(),
            source,
        };
        if dir.as_os_str().is_empty() {
            return Err(invalid(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path is empty",
            )));
        }
        std::fs::create_dir_all(dir).map_err(invalid)?;
        self.copy_dir = Some(dir.to_path_buf());
        Ok(self)
    }

    /// Run one incremental pass for `subject`.
    ///
    /// Returns `Err` only for failures that stop the pass: loading history,
    /// querying the registry, or a rejected query. Per-document failures are
    /// recorded in the log and counted in the report.
    pub async fn synchronize(
        &self,
        subject: &str,
        formats: &[String],
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let history = self
            .store
            .find_by_subject(subject)
            .await
            .map_err(|source| SyncError::History {
                subject: subject.to_string(),
                source,
            })?;
        tracing::debug!(subject, entries = history.len(), "Loaded transaction log");

        self.retry_failing(subject, &history, &mut report).await;

        let start = watermark::next_query_start(&history);
        let response = self
            .source
            .query(subject, Some(start), None)
            .await
            .map_err(|source| SyncError::Query {
                subject: subject.to_string(),
                source,
            })?;

        if !response.status {
            let message = if response.error.is_empty() {
                "no error message".to_string()
            } else {
                response.error
            };
            return Err(SyncError::QueryRejected {
                subject: subject.to_string(),
                message,
            });
        }
        let Some(window_end) = response.query.end else {
            return Err(SyncError::MissingWindowEnd {
                subject: subject.to_string(),
            });
        };

        let window = &response.query;
        if !window.subject.is_empty() && window.subject != subject {
            tracing::warn!(subject, answered_for = %window.subject, "Source answered for a different subject");
        }
        let candidates = filter::new_candidates(&response.results, &history, formats, &mut report);
        tracing::debug!(
            subject,
            %start,
            %window_end,
            env = %window.env,
            host = %window.host,
            requested_start = ?window.start,
            elapsed_ms = ?window
                .started_at
                .zip(window.completed_at)
                .map(|(s, c)| (c - s).num_milliseconds()),
            results = response.results.len(),
            new = candidates.len(),
            "Queried source registry"
        );

        for descriptor in candidates {
            let mut entry = LogEntry::discovered(subject, descriptor, window_end);
            report.discovered += 1;
            if self.copy(&mut entry).await {
                report.copied += 1;
            } else {
                report.failed += 1;
            }
            self.persist(&entry, &mut report).await;
        }

        tracing::info!(
            subject,
            discovered = report.discovered,
            copied = report.copied,
            retried = report.retried,
            recovered = report.recovered,
            failed = report.failed,
            skipped = report.skipped_unsupported + report.skipped_known,
            persistence_failures = report.persistence_failures,
            "Subject synchronized"
        );
        Ok(report)
    }

    async fn persist(&self, entry: &LogEntry, report: &mut SyncReport) {
        if let Err(e) = self.store.upsert(entry).await {
            report.persistence_failures += 1;
            tracing::warn!(
                subject = %entry.subject,
                document_id = %entry.document_id,
                "Failed to record log entry: {}",
                e
            );
        }
    }
}
