use std::collections::HashSet;

use super::SyncReport;
use crate::source::DocumentDescriptor;
use crate::state::LogEntry;

/// Descriptors from a query response that should become new log entries.
///
/// A descriptor is dropped when its type is not a supported format, or when
/// its document ID is already in the subject's history (failing or not) or
/// earlier in the same response. Order of the response is preserved.
pub(super) fn new_candidates<'a>(
    results: &'a [DocumentDescriptor],
    history: &[LogEntry],
    formats: &[String],
    report: &mut SyncReport,
) -> Vec<&'a DocumentDescriptor> {
    let mut seen: HashSet<&str> = history.iter().map(|e| e.document_id.as_str()).collect();
    let mut candidates = Vec::new();

    for descriptor in results {
        if !formats.iter().any(|f| *f == descriptor.document_type) {
            tracing::debug!(
                document_id = %descriptor.document_id,
                document_type = %descriptor.document_type,
                "Skipping unsupported format"
            );
            report.skipped_unsupported += 1;
            continue;
        }
        if !seen.insert(descriptor.document_id.as_str()) {
            tracing::debug!(document_id = %descriptor.document_id, "Skipping known document");
            report.skipped_known += 1;
            continue;
        }
        candidates.push(descriptor);
    }

    candidates
}
