//! Bespoke synchronous image vendor (`contents`/`parts` request shape).
//!
//! The response normalizer enumerates the two shapes this vendor is known
//! to return image bytes in; anything else is a loud [`ProviderError::Response`],
//! never a silent empty result.

use std::time::Instant;

use pixelforge_core::cost::UsageMetrics;
use pixelforge_core::sanitize::sanitize_payload;
use pixelforge_core::template;
use serde_json::{json, Map, Value};

use crate::adapter::{
    GenerationContext, ProviderAdapter, ProviderConfig, ProviderOutcome, ProviderResponse,
};
use crate::error::ProviderError;
use crate::http;
use crate::results::{store_results, ResultEntry};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Global credential fallback for this vendor.
const FALLBACK_KEY_ENV: &str = "GEMINI_API_KEY";

pub(crate) async fn generate(
    adapter: &ProviderAdapter,
    config: &ProviderConfig,
    fields: &Map<String, Value>,
    ctx: GenerationContext,
) -> Result<ProviderResponse, ProviderError> {
    let api_key = http::resolve_api_key(config.api_key_env.as_deref(), FALLBACK_KEY_ENV)?;
    let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

    let body = if config.request_template.is_null() {
        default_body(fields)
    } else {
        template::render(&config.request_template, fields)?.payload
    };
    let endpoint = format!(
        "{base_url}/models/{}:generateContent",
        config.provider_model_id
    );

    let started = Instant::now();
    let raw = http::send_json(
        adapter
            .client
            .post(endpoint)
            .header("x-goog-api-key", api_key),
        &body,
    )
    .await?;
    let duration_seconds = started.elapsed().as_secs_f64();

    let entries = normalize_response(&raw)?;
    let unit_count = entries.len() as u32;
    let (result, thumbnail_url) = store_results(adapter, ctx, entries).await?;

    Ok(ProviderResponse {
        request_body: sanitize_payload(&body),
        metrics: UsageMetrics {
            duration_seconds,
            unit_count,
            token_count: http::token_count(&raw),
        },
        raw_response: sanitize_payload(&raw),
        outcome: ProviderOutcome::Completed {
            result,
            thumbnail_url,
        },
    })
}

/// Assemble the vendor's request shape when no template is configured:
/// the prompt as a text part, followed by every image-bearing field.
fn default_body(fields: &Map<String, Value>) -> Value {
    let mut parts = Vec::new();
    if let Some(prompt) = fields.get("prompt").and_then(Value::as_str) {
        parts.push(json!({"text": prompt}));
    }
    for (name, value) in fields {
        if name == "prompt" {
            continue;
        }
        push_media_parts(value, &mut parts);
    }
    json!({"contents": [{"role": "user", "parts": parts}]})
}

fn push_media_parts(value: &Value, parts: &mut Vec<Value>) {
    match value {
        Value::String(s) => {
            if let Some(media) = template::media_from_str(s) {
                parts.push(media.to_value());
            }
        }
        Value::Array(items) => {
            for item in items {
                push_media_parts(item, parts);
            }
        }
        _ => {}
    }
}

/// Fold the vendor's response into inline result entries.
///
/// Known shapes: `candidates[].content.parts[].inlineData.{mimeType,data}`
/// and `predictions[].bytesBase64Encoded`. A response carrying neither is
/// an error, with the block reason surfaced when the vendor reports one.
fn normalize_response(raw: &Value) -> Result<Vec<ResultEntry>, ProviderError> {
    let mut entries = Vec::new();

    if let Some(candidates) = raw.get("candidates").and_then(Value::as_array) {
        for candidate in candidates {
            let parts = candidate
                .pointer("/content/parts")
                .and_then(Value::as_array);
            for part in parts.into_iter().flatten() {
                if let Some(inline) = part.get("inlineData") {
                    if let Some(data) = inline.get("data").and_then(Value::as_str) {
                        entries.push(ResultEntry::Inline {
                            mime: inline
                                .get("mimeType")
                                .and_then(Value::as_str)
                                .unwrap_or("image/png")
                                .to_string(),
                            data: data.to_string(),
                        });
                    }
                }
            }
        }
    }

    if let Some(predictions) = raw.get("predictions").and_then(Value::as_array) {
        for prediction in predictions {
            if let Some(data) = prediction
                .get("bytesBase64Encoded")
                .and_then(Value::as_str)
            {
                entries.push(ResultEntry::Inline {
                    mime: prediction
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .unwrap_or("image/png")
                        .to_string(),
                    data: data.to_string(),
                });
            }
        }
    }

    if entries.is_empty() {
        let reason = raw
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str);
        return Err(match reason {
            Some(reason) => ProviderError::Response(format!(
                "request was blocked by the provider: {reason}"
            )),
            None => ProviderError::Response("no image data in the response".to_string()),
        });
    }
    Ok(entries)
}
