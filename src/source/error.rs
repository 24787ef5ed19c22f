use thiserror::Error;

/// Errors returned by a [`super::SourceClient`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The registry answered with a non-OK status.
    #[error("Non-OK response from source server: {status} ({message})")]
    HttpStatus { status: u16, message: String },

    /// A fetch was refused; carries the registry's own error message.
    #[error("{0}")]
    Rejected(String),

    #[error("Failed to decode source response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
