use std::path::PathBuf;

use thiserror::Error;

use crate::sink::SinkError;
use crate::source::SourceError;
use crate::state::StateError;

/// Errors that abort a subject's synchronization.
///
/// Per-document copy failures never surface here; they are recorded on the
/// log entry and retried on the next run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to load transaction log for subject {subject}: {source}")]
    History {
        subject: String,
        #[source]
        source: StateError,
    },

    #[error("Source query for subject {subject} failed: {source}")]
    Query {
        subject: String,
        #[source]
        source: SourceError,
    },

    #[error("Source rejected query for subject {subject}: {message}")]
    QueryRejected { subject: String, message: String },

    #[error("Source response for subject {subject} has no query window end")]
    MissingWindowEnd { subject: String },

    #[error("Cannot use local copy directory {path}: {source}")]
    LocalCopyDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single copy attempt. The `Display` text becomes the entry's
/// `last_error`.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error(transparent)]
    Fetch(#[from] SourceError),

    #[error(transparent)]
    Ingest(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_error_message_is_the_underlying_failure() {
        let e = CopyError::from(SourceError::Rejected("invalid document ID".into()));
        assert_eq!(e.to_string(), "invalid document ID");

        let e = CopyError::from(SinkError::HttpStatus {
            status: 500,
            message: "down".into(),
        });
        assert_eq!(e.to_string(), "Non-OK response from ingest server: 500 (down)");
    }
}
