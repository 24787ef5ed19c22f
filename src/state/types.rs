//! Types for the transaction log.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::source::DocumentDescriptor;

/// Recorded in place of an empty failure message so a failing entry never
/// carries an empty `last_error`.
const UNKNOWN_ERROR: &str = "unknown error";

/// One document's sync attempt/outcome for one subject.
///
/// `document_id`, `retrieve_locator`, `document_type` and `log_date` are fixed
/// when the entry is created; only `last_error` and `failure_count` change on
/// later attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Source registry document identifier, unique within a subject.
    pub document_id: String,
    /// Owning subject (EE number).
    pub subject: String,
    /// Opaque URL used to fetch the document bytes.
    pub retrieve_locator: String,
    /// Format tag, matched against the supported formats.
    pub document_type: String,
    pub title: String,
    pub hash: String,
    pub size: u64,
    pub creation_time: NaiveDateTime,
    /// End of the query window that discovered this document.
    pub log_date: NaiveDateTime,
    /// Empty when the last attempt succeeded.
    pub last_error: String,
    /// Consecutive failed attempts including the most recent; 0 = succeeded.
    pub failure_count: u32,
}

impl LogEntry {
    /// Create the entry for a newly discovered document.
    ///
    /// `log_date` is the discovering query's window end, not the document's
    /// own creation time.
    pub fn discovered(subject: &str, descriptor: &DocumentDescriptor, log_date: NaiveDateTime) -> Self {
        Self {
            document_id: descriptor.document_id.clone(),
            subject: subject.to_string(),
            retrieve_locator: descriptor.retrieve_locator.clone(),
            document_type: descriptor.document_type.clone(),
            title: descriptor.title.clone(),
            hash: descriptor.hash.clone(),
            size: descriptor.size,
            creation_time: descriptor.creation_time,
            log_date,
            last_error: String::new(),
            failure_count: 0,
        }
    }

    /// Whether the most recent attempt failed.
    pub fn is_failing(&self) -> bool {
        self.failure_count > 0
    }

    pub fn record_success(&mut self) {
        self.last_error.clear();
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self, message: &str) {
        self.last_error = if message.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message.to_string()
        };
        self.failure_count = self.failure_count.saturating_add(1);
    }
}

/// Statistics for a single sync pass over all configured subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub subjects_synced: u64,
    /// Subjects whose run aborted with a fatal-to-run error.
    pub subjects_failed: u64,
    pub documents_discovered: u64,
    pub documents_copied: u64,
    pub documents_failed: u64,
    /// Whether the pass stopped early on shutdown.
    pub interrupted: bool,
}

/// Summary of the transaction log.
#[derive(Debug, Clone)]
pub struct LogSummary {
    pub total_entries: u64,
    pub succeeded: u64,
    pub failing: u64,
    pub subjects: u64,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor {
            retrieve_locator: "http://test.foo.net/document/1.1.1.1.1.1".to_string(),
            creation_time: at(2014, 4, 25, 2, 51, 3),
            title: "Test Continuity of Care".to_string(),
            document_type: "XML^HL7^231^CCD^C32".to_string(),
            document_id: "1.1.1.1.1.1".to_string(),
            hash: "4C167E7B7F006A18ABB2E4A1A9B2489936947E91".to_string(),
            size: 28452,
        }
    }

    #[test]
    fn test_discovered_uses_window_end_as_log_date() {
        let window_end = at(2016, 6, 8, 23, 59, 59);
        let entry = LogEntry::discovered("123456789", &descriptor(), window_end);
        assert_eq!(entry.log_date, window_end);
        assert_eq!(entry.creation_time, at(2014, 4, 25, 2, 51, 3));
        assert_eq!(entry.subject, "123456789");
        assert_eq!(entry.document_id, "1.1.1.1.1.1");
        assert_eq!(entry.failure_count, 0);
        assert!(entry.last_error.is_empty());
        assert!(!entry.is_failing());
    }

    #[test]
    fn test_failure_then_success_resets_bookkeeping() {
        let mut entry = LogEntry::discovered("123", &descriptor(), at(2016, 1, 1, 0, 0, 0));
        entry.failure_count = 3;
        entry.last_error = "earlier".to_string();

        entry.record_failure("connection refused");
        assert_eq!(entry.failure_count, 4);
        assert_eq!(entry.last_error, "connection refused");
        assert!(entry.is_failing());

        entry.record_success();
        assert_eq!(entry.failure_count, 0);
        assert!(entry.last_error.is_empty());
    }

    #[test]
    fn test_empty_failure_message_keeps_error_non_empty() {
        let mut entry = LogEntry::discovered("123", &descriptor(), at(2016, 1, 1, 0, 0, 0));
        entry.record_failure("");
        assert_eq!(entry.failure_count, 1);
        assert_eq!(entry.last_error, UNKNOWN_ERROR);
    }
}
