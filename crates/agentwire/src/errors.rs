use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single adapter invocation
///
/// `Cancelled` is not a fault: the caller aborted the request and may resume later.
/// Everything else is a `Transport` failure that is handed back to the caller unchanged.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProviderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error: {status}{}", diagnostic(.body))]
    Server { status: StatusCode, body: String },

    #[error("Request failed: {status} - {body}")]
    Status { status: StatusCode, body: String },

    #[error("{provider} API error: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    #[error("Context length exceeded. Message: {0}")]
    ContextLengthExceeded(String),

    #[error("No valid response from {0}")]
    NoValidResponse(&'static str),

    #[error("Could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn diagnostic(body: &str) -> String {
    match body.trim() {
        "" => String::new(),
        body => format!(" - {}", body),
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
