//! Normalization of provider results into storage URLs.
//!
//! Raw base64 payloads never leave this module: inline entries are decoded
//! and uploaded to the blob store, and only the resulting URLs appear in a
//! [`crate::ProviderOutcome`].

use base64::Engine as _;
use pixelforge_storage::thumbnail;
use serde_json::Value;

use crate::adapter::{GenerationContext, ProviderAdapter};
use crate::error::ProviderError;
use crate::http;

/// One result item, before storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResultEntry {
    /// Already a fetchable URL.
    Url(String),
    /// Inline base64 payload that must be uploaded.
    Inline { mime: String, data: String },
}

/// Upload inline entries and collapse everything to the final result value:
/// a single URL string, or an array of URL strings.
///
/// A thumbnail is built from the first inline entry whose bytes decode as
/// an image; thumbnail failures are logged, not fatal.
pub(crate) async fn store_results(
    adapter: &ProviderAdapter,
    ctx: GenerationContext,
    entries: Vec<ResultEntry>,
) -> Result<(Value, Option<String>), ProviderError> {
    let mut urls = Vec::with_capacity(entries.len());
    let mut thumbnail_url = None;

    for (index, entry) in entries.into_iter().enumerate() {
        match entry {
            ResultEntry::Url(url) => urls.push(url),
            ResultEntry::Inline { mime, data } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| {
                        ProviderError::Response(format!(
                            "result entry {index} is not valid base64: {e}"
                        ))
                    })?;
                let path = ctx.result_path(index, http::extension_for_mime(&mime));
                let url = adapter.blobs.put(&path, &bytes).await?;

                if thumbnail_url.is_none() {
                    match thumbnail::make_thumbnail(&bytes) {
                        Ok(thumb) => {
                            let thumb_path =
                                thumbnail::thumbnail_path(ctx.user_id, ctx.generation_id);
                            thumbnail_url = Some(adapter.blobs.put(&thumb_path, &thumb).await?);
                        }
                        Err(e) => {
                            tracing::warn!(
                                generation_id = ctx.generation_id,
                                error = %e,
                                "could not build a thumbnail for an inline result"
                            );
                        }
                    }
                }
                urls.push(url);
            }
        }
    }

    if urls.is_empty() {
        return Err(ProviderError::Response(
            "provider returned an empty result set".to_string(),
        ));
    }

    let result = if urls.len() == 1 {
        Value::String(urls.remove(0))
    } else {
        Value::Array(urls.into_iter().map(Value::String).collect())
    };
    Ok((result, thumbnail_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pixelforge_storage::{BlobStore, MemoryBlobStore};
    use serde_json::json;

    fn adapter_with_memory() -> (ProviderAdapter, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let adapter = ProviderAdapter::new("templated_http", blobs.clone()).unwrap();
        (adapter, blobs)
    }

    fn ctx() -> GenerationContext {
        GenerationContext {
            user_id: 7,
            generation_id: 42,
        }
    }

    #[tokio::test]
    async fn url_entries_pass_through_unstored() {
        let (adapter, blobs) = adapter_with_memory();
        let (result, thumb) = store_results(
            &adapter,
            ctx(),
            vec![ResultEntry::Url("https://cdn.example.com/a.png".into())],
        )
        .await
        .unwrap();
        assert_eq!(result, json!("https://cdn.example.com/a.png"));
        assert!(thumb.is_none());
        assert!(!blobs.exists("generations/7/42/result_0.png").await.unwrap());
    }

    #[tokio::test]
    async fn inline_entries_are_uploaded_and_never_returned_as_base64() {
        let (adapter, blobs) = adapter_with_memory();
        // "aGk=" is base64 for "hi"; not an image, so no thumbnail.
        let (result, thumb) = store_results(
            &adapter,
            ctx(),
            vec![ResultEntry::Inline {
                mime: "image/png".into(),
                data: "aGk=".into(),
            }],
        )
        .await
        .unwrap();
        assert_eq!(result, json!("memory://generations/7/42/result_0.png"));
        assert!(thumb.is_none());
        assert_eq!(
            blobs.get("generations/7/42/result_0.png").await.unwrap(),
            b"hi"
        );
    }

    #[tokio::test]
    async fn multiple_entries_stay_an_array() {
        let (adapter, _) = adapter_with_memory();
        let (result, _) = store_results(
            &adapter,
            ctx(),
            vec![
                ResultEntry::Url("https://cdn.example.com/a.png".into()),
                ResultEntry::Url("https://cdn.example.com/b.png".into()),
            ],
        )
        .await
        .unwrap();
        assert_eq!(
            result,
            json!(["https://cdn.example.com/a.png", "https://cdn.example.com/b.png"])
        );
    }

    #[tokio::test]
    async fn garbage_base64_is_a_response_error() {
        let (adapter, _) = adapter_with_memory();
        let err = store_results(
            &adapter,
            ctx(),
            vec![ResultEntry::Inline {
                mime: "image/png".into(),
                data: "!!not-base64!!".into(),
            }],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProviderError::Response(_)));
    }

    #[tokio::test]
    async fn empty_result_set_is_an_error() {
        let (adapter, _) = adapter_with_memory();
        let err = store_results(&adapter, ctx(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Response(_)));
    }
}
