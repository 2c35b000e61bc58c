//! Small helpers shared by the Google API clients.

use eelc_core::error::ServiceError;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::auth::TokenProvider;

/// Attach a bearer token from `tokens` to `request`.
pub async fn authorised(
    tokens: &TokenProvider,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::RequestBuilder, ServiceError> {
    let token = tokens
        .access_token()
        .await
        .map_err(|e| ServiceError::with_source("failed to obtain access token", e))?;
    Ok(request.bearer_auth(token))
}

/// Send `request` and decode a JSON body, turning transport errors and
/// non-success statuses into [`ServiceError`]s that carry the response body.
pub async fn send_json<T: DeserializeOwned>(
    what: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, ServiceError> {
    let response = request.send().await.map_err(|e| {
        error!(error = %e, request = what, "HTTP request failed");
        ServiceError::with_source(format!("{what}: request failed"), e)
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(%status, body = %body, request = what, "API returned an error status");
        return Err(ServiceError::new(format!("{what}: {status}: {body}")));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::with_source(format!("{what}: unexpected response body"), e))
}
