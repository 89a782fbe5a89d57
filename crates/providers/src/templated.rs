//! The schema-driven HTTP provider.
//!
//! Everything about the request is configuration: the endpoint, the
//! credential variable, the `request_template` rendered against the input
//! fields, and the `response_path` that locates the result inside the raw
//! response.

use std::time::Instant;

use pixelforge_core::cost::UsageMetrics;
use pixelforge_core::sanitize::sanitize_payload;
use pixelforge_core::{json_path, template};
use serde_json::{Map, Value};

use crate::adapter::{
    GenerationContext, ProviderAdapter, ProviderConfig, ProviderOutcome, ProviderResponse,
};
use crate::error::ProviderError;
use crate::results::{store_results, ResultEntry};
use crate::http;

/// Global credential fallback for templated providers.
const FALLBACK_KEY_ENV: &str = "PROVIDER_API_KEY";

pub(crate) async fn generate(
    adapter: &ProviderAdapter,
    config: &ProviderConfig,
    fields: &Map<String, Value>,
    ctx: GenerationContext,
) -> Result<ProviderResponse, ProviderError> {
    let endpoint = config.base_url.as_deref().ok_or_else(|| {
        ProviderError::Configuration("provider endpoint (base_url) not configured".to_string())
    })?;
    if config.request_template.is_null() {
        return Err(ProviderError::Configuration(
            "request template not configured".to_string(),
        ));
    }
    let response_path = config.response_path.as_deref().ok_or_else(|| {
        ProviderError::Configuration(
            "response path not configured for a synchronous provider".to_string(),
        )
    })?;
    let api_key = http::resolve_api_key(config.api_key_env.as_deref(), FALLBACK_KEY_ENV)?;

    let rendered = template::render(&config.request_template, fields)?;

    let started = Instant::now();
    let raw = http::send_json(
        adapter.client.post(endpoint).bearer_auth(api_key),
        &rendered.payload,
    )
    .await?;
    let duration_seconds = started.elapsed().as_secs_f64();

    let extracted = json_path::lookup(&raw, response_path).ok_or_else(|| {
        ProviderError::Response(format!("response path '{response_path}' matched nothing"))
    })?;
    let entries = extract_entries(extracted)?;
    let unit_count = entries.len() as u32;
    let (result, thumbnail_url) = store_results(adapter, ctx, entries).await?;

    Ok(ProviderResponse {
        request_body: sanitize_payload(&rendered.payload),
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

/// Normalize the value at `response_path` into result entries.
///
/// Accepted shapes: a URL string, an inline base64 string (data URI or
/// bare), a `{url}` object, a `{b64_json}` object, or an array of any of
/// those.
fn extract_entries(value: &Value) -> Result<Vec<ResultEntry>, ProviderError> {
    match value {
        Value::Array(items) => items.iter().map(classify_entry).collect(),
        other => Ok(vec![classify_entry(other)?]),
    }
}

fn classify_entry(value: &Value) -> Result<ResultEntry, ProviderError> {
    match value {
        Value::String(s) => {
            if s.starts_with("http://") || s.starts_with("https://") || s.starts_with("gs://") {
                return Ok(ResultEntry::Url(s.clone()));
            }
            if let Some(media) = template::media_from_str(s) {
                if let template::MediaContent::Inline(data) = media.content {
                    return Ok(ResultEntry::Inline {
                        mime: media.mime_type,
                        data,
                    });
                }
            }
            // Bare base64 with no data-URI wrapper; decoded (and validated)
            // at upload time.
            Ok(ResultEntry::Inline {
                mime: "image/png".to_string(),
                data: s.clone(),
            })
        }
        Value::Object(map) => {
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                return Ok(ResultEntry::Url(url.to_string()));
            }
            if let Some(data) = map.get("b64_json").and_then(Value::as_str) {
                return Ok(ResultEntry::Inline {
                    mime: "image/png".to_string(),
                    data: data.to_string(),
                });
            }
            Err(ProviderError::Response(
                "result entry object has neither 'url' nor 'b64_json'".to_string(),
            ))
        }
        other => Err(ProviderError::Response(format!(
            "unrecognized result entry: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn url_array_flattens_to_url_entries() {
        let entries = extract_entries(&json!([
            {"url": "https://p.example.com/1.png"},
            {"url": "https://p.example.com/2.png"}
        ]))
        .unwrap();
        assert_eq!(
            entries,
            vec![
                ResultEntry::Url("https://p.example.com/1.png".into()),
                ResultEntry::Url("https://p.example.com/2.png".into()),
            ]
        );
    }

    #[test]
    fn single_string_url_is_one_entry() {
        let entries = extract_entries(&json!("https://p.example.com/out.png")).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn data_uri_keeps_its_mime_type() {
        let entries = extract_entries(&json!("data:image/jpeg;base64,aGk=")).unwrap();
        assert_eq!(
            entries,
            vec![ResultEntry::Inline {
                mime: "image/jpeg".into(),
                data: "aGk=".into()
            }]
        );
    }

    #[test]
    fn bare_base64_defaults_to_png() {
        let entries = extract_entries(&json!("aGVsbG8=")).unwrap();
        assert_matches!(&entries[0], ResultEntry::Inline { mime, .. } if mime == "image/png");
    }

    #[test]
    fn b64_json_objects_are_inline() {
        let entries = extract_entries(&json!([{"b64_json": "aGk="}])).unwrap();
        assert_matches!(&entries[0], ResultEntry::Inline { .. });
    }

    #[test]
    fn unrecognized_shapes_are_rejected_loudly() {
        assert_matches!(
            extract_entries(&json!([{"neither": true}])),
            Err(ProviderError::Response(_))
        );
        assert_matches!(extract_entries(&json!(42)), Err(ProviderError::Response(_)));
    }
}
