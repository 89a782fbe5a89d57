//! Provider error taxonomy.

use serde_json::Value;

/// Errors from the provider adapter layer.
///
/// `Configuration` is never retried; it is a defect in the model/provider
/// setup. `Request` and `Response` carry enough of the exchange for
/// diagnosis without ever holding raw media payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Missing credential, template, response path, or an unknown provider
    /// discriminator.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// The provider returned a non-2xx status code.
    #[error("Provider request failed ({status}): {response_body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Sanitized copy of the body that was sent.
        request_body: Value,
        /// Raw response body for debugging.
        response_body: String,
    },

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A 2xx response whose body does not have the expected shape.
    #[error("Malformed provider response: {0}")]
    Response(String),

    /// Template rendering or field coercion failed.
    #[error(transparent)]
    Core(#[from] pixelforge_core::CoreError),

    /// Storing a result blob or building its thumbnail failed.
    #[error(transparent)]
    Storage(#[from] pixelforge_storage::StorageError),
}
