use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Format of the query window bounds, both on the wire and in the request.
pub const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format of a descriptor's `creationTime`.
const CREATION_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Response to a query for a subject's documents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    /// Logical outcome; `false` means the registry rejected the query.
    pub status: bool,
    #[serde(rename = "result", default, deserialize_with = "null_as_empty")]
    pub results: Vec<DocumentDescriptor>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error: String,
    #[serde(default)]
    pub query: QueryWindow,
}

/// Echo of the query the registry actually ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryWindow {
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "ee", default)]
    pub subject: String,
    #[serde(rename = "startDateTime", default, deserialize_with = "window_time")]
    pub start: Option<NaiveDateTime>,
    /// End of the window; becomes the `log_date` of documents it discovers.
    #[serde(rename = "endDateTime", default, deserialize_with = "window_time")]
    pub end: Option<NaiveDateTime>,
    #[serde(rename = "queryStartDateTime", default, deserialize_with = "rfc3339_time")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "queryCompleteDateTime", default, deserialize_with = "rfc3339_time")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A document reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentDescriptor {
    #[serde(rename = "retrieveURL")]
    pub retrieve_locator: String,
    #[serde(rename = "creationTime", deserialize_with = "creation_time")]
    pub creation_time: NaiveDateTime,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "documentType")]
    pub document_type: String,
    #[serde(rename = "documentID")]
    pub document_id: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

/// Document bytes as returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

fn window_time<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    non_empty(deserializer)?
        .map(|s| NaiveDateTime::parse_from_str(&s, WINDOW_FORMAT))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Accepts any number of fractional-second digits (0-9).
fn rfc3339_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    non_empty(deserializer)?
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn creation_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&s, CREATION_TIME_FORMAT).map_err(serde::de::Error::custom)
}
