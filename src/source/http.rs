use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};

use super::error::SourceError;
use super::types::{FetchedDocument, QueryResponse, WINDOW_FORMAT};
use super::SourceClient;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Basic-auth credentials for the registry.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

/// [`SourceClient`] over the registry's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSourceClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl HttpSourceClient {
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            credentials,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.user, c.password.as_deref()),
            None => builder,
        }
    }
}

/// Pull the registry's `error` message out of a non-OK body, if it has one.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<QueryResponse>(body)
        .ok()
        .map(|r| r.error)
        .filter(|e| !e.is_empty())
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn query(
        &self,
        subject: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<QueryResponse, SourceError> {
        let mut params = vec![("ee", subject.to_string())];
        if let Some(start) = start {
            params.push(("startDateTime", start.format(WINDOW_FORMAT).to_string()));
        }
        if let Some(end) = end {
            params.push(("endDateTime", end.format(WINDOW_FORMAT).to_string()));
        }

        tracing::debug!(subject, ?start, ?end, "Querying source registry");
        let response = self.get(&self.base_url).query(&params).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or(body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch(&self, locator: &str) -> Result<FetchedDocument, SourceError> {
        tracing::debug!(locator, "Fetching document");
        let response = self.get(locator).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(match error_message(&body) {
                Some(message) => SourceError::Rejected(message),
                None => SourceError::HttpStatus {
                    status: status.as_u16(),
                    message: body,
                },
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedDocument {
            content_type,
            bytes,
        })
    }
}
