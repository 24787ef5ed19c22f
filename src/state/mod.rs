//! Transaction log: the persisted record of every document's discovery and
//! copy-attempt outcome, keyed by subject and document ID.
//!
//! The log drives:
//! - the query watermark (latest discovery window per subject)
//! - duplicate suppression against history
//! - retry of failed copies on the next run
//! - status reporting

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{LogStore, SqliteLogStore};
pub use error::StateError;
pub use types::{LogEntry, SyncRunStats};
