//! Long-running video vendor (`instances[]`/`parameters{}` request shape).
//!
//! Initiation returns an operation name; completion is observed by polling
//! `fetchPredictOperation` until the normalized status reports `done`.

use std::time::Instant;

use pixelforge_core::cost::UsageMetrics;
use pixelforge_core::sanitize::sanitize_payload;
use pixelforge_core::template;
use serde_json::{json, Map, Value};

use crate::adapter::{
    OperationStatus, ProviderAdapter, ProviderConfig, ProviderOutcome, ProviderResponse,
};
use crate::error::ProviderError;
use crate::http;

const DEFAULT_BASE_URL: &str = "https://us-central1-aiplatform.googleapis.com/v1";

/// Global credential fallback for this vendor.
const FALLBACK_KEY_ENV: &str = "VERTEX_API_KEY";

/// Fields that belong in `parameters{}` rather than the instance when no
/// template dictates the shape.
const PARAMETER_FIELDS: &[&str] = &[
    "durationSeconds",
    "aspectRatio",
    "sampleCount",
    "negativePrompt",
    "seed",
];

/// Known locations of the result URI in a completed operation.
const RESULT_PATHS: &[&str] = &[
    "/response/videos/0/gcsUri",
    "/response/videos/0/uri",
    "/response/generateVideoResponse/generatedSamples/0/video/uri",
];

pub(crate) async fn generate(
    adapter: &ProviderAdapter,
    config: &ProviderConfig,
    fields: &Map<String, Value>,
) -> Result<ProviderResponse, ProviderError> {
    let api_key = http::resolve_api_key(config.api_key_env.as_deref(), FALLBACK_KEY_ENV)?;
    let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

    let body = build_body(config, fields)?;
    let endpoint = format!("{base_url}/{}:predictLongRunning", model_path(config));

    let started = Instant::now();
    let raw = http::send_json(adapter.client.post(endpoint).bearer_auth(api_key), &body).await?;
    tracing::debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "long-running generation initiated"
    );

    let operation_name = raw
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::Response(
                "initiation response carries no operation name".to_string(),
            )
        })?;

    // The initiation call is all the billing signal an async flow gets;
    // duration-priced strategies use the requested media duration.
    let metrics = UsageMetrics {
        duration_seconds: requested_duration(&body),
        unit_count: 1,
        token_count: 0,
    };

    Ok(ProviderResponse {
        request_body: sanitize_payload(&body),
        raw_response: sanitize_payload(&raw),
        metrics,
        outcome: ProviderOutcome::Pending { operation_name },
    })
}

pub(crate) async fn check_status(
    adapter: &ProviderAdapter,
    config: &ProviderConfig,
    operation_name: &str,
) -> Result<OperationStatus, ProviderError> {
    let api_key = http::resolve_api_key(config.api_key_env.as_deref(), FALLBACK_KEY_ENV)?;
    let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

    let endpoint = format!("{base_url}/{}:fetchPredictOperation", model_path(config));
    let body = json!({"operationName": operation_name});
    let raw = http::send_json(adapter.client.post(endpoint).bearer_auth(api_key), &body).await?;
    Ok(normalize_status(raw))
}

pub(crate) async fn download(
    adapter: &ProviderAdapter,
    config: &ProviderConfig,
    url: &str,
) -> Result<Vec<u8>, ProviderError> {
    let api_key = http::resolve_api_key(config.api_key_env.as_deref(), FALLBACK_KEY_ENV)?;
    let fetch_url = https_url(url);

    let response = adapter
        .client
        .get(&fetch_url)
        .bearer_auth(api_key)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Request {
            status: status.as_u16(),
            request_body: json!({"url": fetch_url}),
            response_body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// Model path inside the vendor API; bare ids are assumed first-party.
fn model_path(config: &ProviderConfig) -> String {
    if config.provider_model_id.contains('/') {
        config.provider_model_id.clone()
    } else {
        format!("publishers/google/models/{}", config.provider_model_id)
    }
}

/// Build the initiation body: render the template when one is configured
/// (wrapping it when it is not already `instances`-shaped), otherwise split
/// the fields into one instance plus the known parameter keys.
fn build_body(
    config: &ProviderConfig,
    fields: &Map<String, Value>,
) -> Result<Value, ProviderError> {
    if !config.request_template.is_null() {
        let rendered = template::render(&config.request_template, fields)?.payload;
        if rendered.get("instances").is_some() {
            return Ok(rendered);
        }
        return Ok(json!({"instances": [rendered], "parameters": {}}));
    }

    let mut instance = Map::new();
    let mut parameters = Map::new();
    for (name, value) in fields {
        if PARAMETER_FIELDS.contains(&name.as_str()) {
            parameters.insert(name.clone(), value.clone());
        } else {
            instance.insert(name.clone(), value.clone());
        }
    }
    Ok(json!({"instances": [instance], "parameters": parameters}))
}

/// The requested media duration, for duration-priced strategies.
fn requested_duration(body: &Value) -> f64 {
    match body.pointer("/parameters/durationSeconds") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Fold the vendor's operation shape into the common status triple.
///
/// A done operation with neither a result nor an error (e.g. a filtered
/// output) is reported as an error so the caller never sees an empty
/// success.
fn normalize_status(raw: Value) -> OperationStatus {
    let done = raw.get("done").and_then(Value::as_bool).unwrap_or(false);
    if !done {
        return OperationStatus {
            done: false,
            result_url: None,
            error: None,
            raw: sanitize_payload(&raw),
        };
    }

    if let Some(error) = raw.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return OperationStatus {
            done: true,
            result_url: None,
            error: Some(message),
            raw: sanitize_payload(&raw),
        };
    }

    let result_url = RESULT_PATHS
        .iter()
        .find_map(|path| raw.pointer(path).and_then(Value::as_str))
        .map(str::to_string);
    let error = result_url.is_none().then(|| {
        "generation finished without a result; the output may have been filtered".to_string()
    });

    OperationStatus {
        done: true,
        result_url,
        error,
        raw: sanitize_payload(&raw),
    }
}

/// Bucket URIs are fetched over their public HTTPS form.
fn https_url(url: &str) -> String {
    match url.strip_prefix("gs://") {
        Some(rest) => format!("https://storage.googleapis.com/{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_with_template(template: Value) -> ProviderConfig {
        ProviderConfig {
            provider_model_id: "veo-3.0-generate".into(),
            request_template: template,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn bare_model_ids_get_the_publisher_path() {
        let config = config_with_template(Value::Null);
        assert_eq!(
            model_path(&config),
            "publishers/google/models/veo-3.0-generate"
        );
        let qualified = ProviderConfig {
            provider_model_id: "projects/p/models/custom".into(),
            ..ProviderConfig::default()
        };
        assert_eq!(model_path(&qualified), "projects/p/models/custom");
    }

    #[test]
    fn fields_split_into_instance_and_parameters() {
        let fields = json!({
            "prompt": "a drone shot of cliffs",
            "image": "https://cdn.example.com/start.png",
            "durationSeconds": 8,
            "aspectRatio": "16:9"
        });
        let body = build_body(&config_with_template(Value::Null), fields.as_object().unwrap())
            .unwrap();
        assert_eq!(body["instances"][0]["prompt"], "a drone shot of cliffs");
        assert_eq!(body["instances"][0]["image"], "https://cdn.example.com/start.png");
        assert!(body["instances"][0].get("durationSeconds").is_none());
        assert_eq!(body["parameters"]["durationSeconds"], 8);
        assert_eq!(body["parameters"]["aspectRatio"], "16:9");
    }

    #[test]
    fn templates_not_already_instance_shaped_are_wrapped() {
        let body = build_body(
            &config_with_template(json!({"prompt": "{{prompt}}"})),
            json!({"prompt": "waves"}).as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(body["instances"][0]["prompt"], "waves");
    }

    #[test]
    fn instance_shaped_templates_pass_through() {
        let template = json!({"instances": [{"p": "{{prompt}}"}], "parameters": {"seed": 1}});
        let body = build_body(
            &config_with_template(template),
            json!({"prompt": "waves"}).as_object().unwrap(),
        )
        .unwrap();
        assert_eq!(body["parameters"]["seed"], 1);
        assert_eq!(body["instances"][0]["p"], "waves");
    }

    #[test]
    fn requested_duration_reads_numbers_and_strings() {
        assert_eq!(
            requested_duration(&json!({"parameters": {"durationSeconds": 8}})),
            8.0
        );
        assert_eq!(
            requested_duration(&json!({"parameters": {"durationSeconds": "6"}})),
            6.0
        );
        assert_eq!(requested_duration(&json!({"parameters": {}})), 0.0);
    }

    #[test]
    fn pending_operations_normalize_to_not_done() {
        let status = normalize_status(json!({"name": "operations/1"}));
        assert!(!status.done);
        assert!(status.result_url.is_none());
        assert!(status.error.is_none());
    }

    #[test]
    fn errored_operations_surface_the_message() {
        let status = normalize_status(json!({
            "done": true,
            "error": {"code": 3, "message": "quota exhausted"}
        }));
        assert!(status.done);
        assert_eq!(status.error.as_deref(), Some("quota exhausted"));
    }

    #[test]
    fn completed_operations_yield_the_result_url() {
        let status = normalize_status(json!({
            "done": true,
            "response": {"videos": [{"gcsUri": "gs://bucket/out.mp4"}]}
        }));
        assert_eq!(status.result_url.as_deref(), Some("gs://bucket/out.mp4"));
        assert!(status.error.is_none());
    }

    #[test]
    fn sample_shaped_responses_are_recognized() {
        let status = normalize_status(json!({
            "done": true,
            "response": {"generateVideoResponse": {"generatedSamples": [
                {"video": {"uri": "https://v.example.com/out.mp4"}}
            ]}}
        }));
        assert_eq!(
            status.result_url.as_deref(),
            Some("https://v.example.com/out.mp4")
        );
    }

    #[test]
    fn done_without_result_is_an_error_not_an_empty_success() {
        let status = normalize_status(json!({"done": true, "response": {}}));
        assert!(status.done);
        assert!(status.result_url.is_none());
        assert!(status.error.is_some());
    }

    #[test]
    fn bucket_uris_become_https() {
        assert_eq!(
            https_url("gs://bucket/path/out.mp4"),
            "https://storage.googleapis.com/bucket/path/out.mp4"
        );
        assert_eq!(
            https_url("https://v.example.com/out.mp4"),
            "https://v.example.com/out.mp4"
        );
    }
}
