//! In-memory collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::sink::{SinkClient, SinkError};
use crate::source::{
    DocumentDescriptor, FetchedDocument, QueryResponse, QueryWindow, SourceClient, SourceError,
};
use crate::state::{LogEntry, LogStore, StateError};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

pub fn locator(document_id: &str) -> String {
    format!("http://registry.test/document/{document_id}")
}

pub fn descriptor(document_id: &str, document_type: &str) -> DocumentDescriptor {
    DocumentDescriptor {
        retrieve_locator: locator(document_id),
        creation_time: at(2014, 4, 25, 2, 51, 3),
        title: format!("Document {document_id}"),
        document_type: document_type.to_string(),
        document_id: document_id.to_string(),
        hash: String::new(),
        size: 0,
    }
}

pub fn entry(subject: &str, document_id: &str, log_date: NaiveDateTime, failure_count: u32) -> LogEntry {
    let mut e = LogEntry::discovered(subject, &descriptor(document_id, "A"), log_date);
    if failure_count > 0 {
        e.last_error = "previous failure".to_string();
        e.failure_count = failure_count;
    }
    e
}

/// A logically successful response whose window ends at `end`.
pub fn response(end: NaiveDateTime, results: Vec<DocumentDescriptor>) -> QueryResponse {
    QueryResponse {
        status: true,
        results,
        error: String::new(),
        query: QueryWindow {
            end: Some(end),
            ..QueryWindow::default()
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub subject: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Registry fake. Fetches of unknown locators are rejected the way the real
/// registry rejects a bad document ID.
#[derive(Default)]
pub struct FakeSource {
    response: Mutex<QueryResponse>,
    fail_queries: AtomicBool,
    documents: Mutex<HashMap<String, FetchedDocument>>,
    queries: Mutex<Vec<RecordedQuery>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn set_response(&self, response: QueryResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn add_document(&self, document_id: &str, content_type: &str, bytes: &[u8]) {
        self.documents.lock().unwrap().insert(
            locator(document_id),
            FetchedDocument {
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn query(
        &self,
        subject: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<QueryResponse, SourceError> {
        self.queries.lock().unwrap().push(RecordedQuery {
            subject: subject.to_string(),
            start,
            end,
        });
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SourceError::HttpStatus {
                status: 503,
                message: "registry unavailable".to_string(),
            });
        }
        Ok(self.response.lock().unwrap().clone())
    }

    async fn fetch(&self, locator: &str) -> Result<FetchedDocument, SourceError> {
        self.fetches.lock().unwrap().push(locator.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| SourceError::Rejected("invalid document ID".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct FakeSink {
    fail: AtomicBool,
    delivered: Mutex<Vec<Delivery>>,
}

impl FakeSink {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl SinkClient for FakeSink {
    async fn ingest(&self, content_type: &str, bytes: Vec<u8>) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::HttpStatus {
                status: 500,
                message: "ingest unavailable".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(Delivery {
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(())
    }
}

/// Log store fake with the same write rules as the SQLite store: inserts keep
/// arrival order, conflicts only update the failure fields.
#[derive(Default)]
pub struct MemoryLogStore {
    entries: Mutex<Vec<LogEntry>>,
    fail_loads: AtomicBool,
    fail_upserts_for: Mutex<HashSet<String>>,
    upserts: Mutex<Vec<LogEntry>>,
}

impl MemoryLogStore {
    pub fn with_entries(entries: Vec<LogEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn fail_upserts_for(&self, document_id: &str) {
        self.fail_upserts_for
            .lock()
            .unwrap()
            .insert(document_id.to_string());
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn get(&self, subject: &str, document_id: &str) -> Option<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.subject == subject && e.document_id == document_id)
            .cloned()
    }

    /// Every successful upsert, in call order.
    pub fn upserts(&self) -> Vec<LogEntry> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<LogEntry>, StateError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StateError::Query("injected load failure".to_string()));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subject == subject)
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &LogEntry) -> Result<(), StateError> {
        if entry.document_id.is_empty() {
            return Err(StateError::MissingDocumentId {
                subject: entry.subject.clone(),
            });
        }
        if self.fail_upserts_for.lock().unwrap().contains(&entry.document_id) {
            return Err(StateError::Query("injected upsert failure".to_string()));
        }

        let mut entries = self.entries.lock().unwrap();
        match entries
            .iter_mut()
            .find(|e| e.subject == entry.subject && e.document_id == entry.document_id)
        {
            Some(existing) => {
                existing.last_error = entry.last_error.clone();
                existing.failure_count = entry.failure_count;
            }
            None => entries.push(entry.clone()),
        }
        self.upserts.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
