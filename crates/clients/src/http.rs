use crate::error::{ClientError, Result};
use serde::de::DeserializeOwned;

const MAX_ERROR_BODY_CHARS: usize = 512;

pub(crate) const USER_AGENT: &str = concat!("iam-finder/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| ClientError::InvalidConfig(format!("failed to build HTTP client: {err}")))
}

/// Turn non-2xx answers into [`ClientError::Status`] carrying a bounded body excerpt.
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let response = ensure_success(service, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(ClientError::transport(service))?;
    serde_json::from_slice(&bytes).map_err(|err| ClientError::invalid(service, err.to_string()))
}

pub(crate) fn trim_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
