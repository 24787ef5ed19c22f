//! Downstream ingestion endpoint that receives copied documents.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Non-OK response from ingest server: {status} ({message})")]
    HttpStatus { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Accepts one document's bytes with its content type.
#[async_trait]
pub trait SinkClient: Send + Sync {
    async fn ingest(&self, content_type: &str, bytes: Vec<u8>) -> Result<(), SinkError>;
}

/// [`SinkClient`] that POSTs each document to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSinkClient {
    client: Client,
    url: String,
}

impl HttpSinkClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SinkClient for HttpSinkClient {
    async fn ingest(&self, content_type: &str, bytes: Vec<u8>) -> Result<(), SinkError> {
        tracing::debug!(content_type, size = bytes.len(), "Sending document to ingest server");
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(SinkError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}
