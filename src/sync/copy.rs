use std::path::{Path, PathBuf};

use tokio::fs;

use super::error::CopyError;
use super::SyncEngine;
use crate::state::LogEntry;

impl SyncEngine {
    /// One copy attempt for `entry`: fetch, optional local copy, ingest.
    ///
    /// The outcome is recorded on the entry's failure fields; the return value
    /// says whether the attempt succeeded. Persisting the entry is left to the
    /// caller.
    pub(super) async fn copy(&self, entry: &mut LogEntry) -> bool {
        match self.transfer(entry).await {
            Ok(()) => {
                tracing::debug!(
                    subject = %entry.subject,
                    document_id = %entry.document_id,
                    "Document copied"
                );
                entry.record_success();
                true
            }
            Err(e) => {
                tracing::warn!(
                    subject = %entry.subject,
                    document_id = %entry.document_id,
                    attempts = entry.failure_count.saturating_add(1),
                    "Copy failed: {}",
                    e
                );
                entry.record_failure(&e.to_string());
                false
            }
        }
    }

    async fn transfer(&self, entry: &LogEntry) -> Result<(), CopyError> {
        let document = self.source.fetch(&entry.retrieve_locator).await?;

        // The fetched body is held in memory, so the local copy and the
        // ingested bytes are identical.
        if let Some(dir) = &self.copy_dir {
            let path = local_copy_path(
                dir,
                &entry.subject,
                &entry.document_id,
                &document.content_type,
            );
            if let Err(e) = write_local_copy(&path, &document.bytes).await {
                tracing::warn!("Failed to write local copy {}: {}", path.display(), e);
            }
        }

        self.sink
            .ingest(&document.content_type, document.bytes)
            .await?;
        Ok(())
    }
}

/// `<dir>/<subject>/<document_id>.<ext>`, with both name components made
/// safe to use as a single path segment.
pub(super) fn local_copy_path(dir: &Path, subject: &str, document_id: &str, content_type: &str) -> PathBuf {
    dir.join(clean_component(subject)).join(format!(
        "{}.{}",
        clean_component(document_id),
        extension_for(content_type)
    ))
}

/// Percent-encode characters that are unsafe in a file name (and `%` itself),
/// so distinct names never clean to the same file.
fn clean_component(name: &str) -> String {
    let mut clean = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_control() || matches!(c, '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                clean.push_str(&format!("%{b:02X}"));
            }
        } else {
            clean.push(c);
        }
    }
    if clean.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        clean
    }
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        t if t.ends_with("xml") => "xml",
        t if t.ends_with("json") => "json",
        _ => "bin",
    }
}

/// Write through a `.part` file so a crash never leaves a truncated copy
/// under the final name.
async fn write_local_copy(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    fs::write(&part, bytes).await?;
    fs::rename(&part, path).await
}
