use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, ProviderResult, TransportError};

/// Build the HTTP client shared by every request of one adapter
pub fn build_client() -> anyhow::Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(600)) // 10 minutes timeout
        .build()?;
    Ok(client)
}

/// Send a prepared request and decode its JSON body.
///
/// The exchange races against `cancel`; when the token fires first the request
/// future is dropped, which tears down the underlying connection.
///
/// `check_envelope` inspects every JSON body for the backend's error envelope. On an
/// error status only a context overflow overrides the status classification.
pub async fn send<F>(
    request: RequestBuilder,
    cancel: &CancellationToken,
    check_envelope: F,
) -> ProviderResult<Value>
where
    F: Fn(&Value) -> Result<(), TransportError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = exchange(request, check_envelope) => result.map_err(ProviderError::from),
    }
}

async fn exchange<F>(request: RequestBuilder, check_envelope: F) -> Result<Value, TransportError>
where
    F: Fn(&Value) -> Result<(), TransportError>,
{
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        let value: Value = serde_json::from_str(&body)?;
        check_envelope(&value)?;
        return Ok(value);
    }

    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        if let Err(err @ TransportError::ContextLengthExceeded(_)) = check_envelope(&value) {
            return Err(err);
        }
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(TransportError::Server { status, body })
    } else {
        Err(TransportError::Status { status, body })
    }
}
