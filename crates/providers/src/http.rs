//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use pixelforge_core::sanitize::sanitize_payload;
use serde_json::Value;

use crate::error::ProviderError;

/// Generation calls are slow; allow minutes before giving up.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the shared client with the raised generation timeout.
pub(crate) fn build_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Resolve an API credential: the link-configured variable first, then the
/// provider's global fallback. Absence is a configuration error, never a
/// retry.
pub(crate) fn resolve_api_key(
    link_env: Option<&str>,
    fallback_env: &str,
) -> Result<String, ProviderError> {
    for name in link_env.iter().copied().chain([fallback_env]) {
        if let Ok(value) = std::env::var(name) {
            if !value.trim().is_empty() {
                return Ok(value);
            }
        }
    }
    Err(ProviderError::Configuration(format!(
        "no API key configured (checked {} and {fallback_env})",
        link_env.unwrap_or("<no link variable>")
    )))
}

/// Send a JSON request and parse the JSON response.
///
/// A non-2xx status becomes [`ProviderError::Request`] carrying the
/// sanitized request body and the raw response text, surfaced unmodified to
/// the caller. Retries belong to the task queue, not here.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ProviderError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Request {
            status: status.as_u16(),
            request_body: sanitize_payload(body),
            response_body: text,
        });
    }

    serde_json::from_str(&text)
        .map_err(|e| ProviderError::Response(format!("response is not valid JSON: {e}")))
}

/// Token usage from the known response shapes; zero when absent.
pub(crate) fn token_count(raw: &Value) -> u64 {
    raw.pointer("/usageMetadata/totalTokenCount")
        .or_else(|| raw.pointer("/usage/total_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// File extension for a result blob, from its mime type.
pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}
