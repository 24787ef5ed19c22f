//! Client for the remote document registry: query a subject's documents by
//! date window, and fetch one document's bytes by locator.

pub mod error;
pub mod http;
pub mod types;

use async_trait::async_trait;
use chrono::NaiveDateTime;

pub use error::SourceError;
pub use http::HttpSourceClient;
pub use types::{DocumentDescriptor, FetchedDocument, QueryResponse, QueryWindow};

/// Remote document registry.
///
/// Object-safe so the sync engine can hold it as `Arc<dyn SourceClient>`.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Documents for `subject` whose registry timestamp falls within
    /// `[start, end]`; a missing bound is open.
    ///
    /// A transport or HTTP-level failure is an `Err`; a logical rejection
    /// comes back as `Ok` with `status == false`.
    async fn query(
        &self,
        subject: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<QueryResponse, SourceError>;

    async fn fetch(&self, locator: &str) -> Result<FetchedDocument, SourceError>;
}
