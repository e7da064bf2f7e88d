//! Provider-agnostic embedding with size-aware batch retry.

pub mod providers;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use crate::core::config::DocVaultConfig;
use crate::core::types::EmbeddingConfig;

const SIZE_ERROR_PATTERNS: [&str; 6] = [
    "maximum context length",
    "input is too long",
    "token limit",
    "too large",
    "exceeds the limit",
    "max token count",
];

fn is_size_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    SIZE_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

/// The public embedding seam used by the store and retriever.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    fn dimension(&self) -> u32;
}

/// A provider's raw, unretried batch call. Implementations only need to
/// speak to their API; the bisect/truncate policy lives once, here.
#[async_trait]
pub trait RawEmbedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
    fn native_dimension(&self) -> u32;
}

/// Wraps a `RawEmbedder` with the size-aware bisection/truncation retry
/// policy, and projects to a fixed output dimension when the provider's
/// native dimension differs (truncation, for MRL-capable models).
pub struct RetryingEmbedder<P: RawEmbedder> {
    raw: P,
    output_dimension: u32,
}

impl<P: RawEmbedder> RetryingEmbedder<P> {
    pub fn new(raw: P, output_dimension: u32) -> Self {
        Self {
            raw,
            output_dimension,
        }
    }

    fn project(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if vector.len() as u32 > self.output_dimension {
            vector.truncate(self.output_dimension as usize);
        }
        vector
    }
}

fn embed_with_retry<'a, P: RawEmbedder + Sync>(
    raw: &'a P,
    texts: &'a [String],
) -> BoxFuture<'a, anyhow::Result<Vec<Vec<f32>>>> {
    async move {
        match raw.embed_batch(texts).await {
            Ok(v) => Ok(v),
            Err(e) if is_size_error(&e.to_string()) && texts.len() > 1 => {
                let mid = texts.len() / 2;
                let (left_texts, right_texts) = texts.split_at(mid);
                let mut left = embed_with_retry(raw, left_texts).await?;
                let right = embed_with_retry(raw, right_texts).await?;
                left.extend(right);
                Ok(left)
            }
            Err(e) if is_size_error(&e.to_string()) && texts.len() == 1 => {
                let original = &texts[0];
                let half_len = original.chars().count() / 2;
                let truncated: String = original.chars().take(half_len.max(1)).collect();
                raw.embed_batch(&[truncated]).await
            }
            Err(e) => Err(e),
        }
    }
    .boxed()
}

#[async_trait]
impl<P: RawEmbedder + Sync + Send> Embedder for RetryingEmbedder<P> {
    async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = embed_with_retry(&self.raw, texts).await?;
        Ok(vectors.into_iter().map(|v| self.project(v)).collect())
    }

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let owned = vec![text.to_string()];
        let mut vectors = embed_with_retry(&self.raw, &owned).await?;
        Ok(self.project(vectors.pop().unwrap_or_default()))
    }

    fn dimension(&self) -> u32 {
        self.output_dimension
    }
}

/// Builds the configured embedder, if any, from `provider:model` (§4.6).
/// Returns `None` when no spec is configured — the store then degrades to
/// FTS-only search. A recognized provider with missing credentials is a
/// construction-time failure naming every missing variable.
pub async fn build_embedder(
    config: &DocVaultConfig,
    http_client: reqwest::Client,
) -> anyhow::Result<Option<(Arc<dyn Embedder>, EmbeddingConfig)>> {
    let Some(spec) = config.embedding.resolve_spec() else {
        return Ok(None);
    };
    let (provider, model) = EmbeddingConfig::parse_spec(&spec)
        .map_err(|e| anyhow::anyhow!(e))?;
    let dimension = config.embedding.resolve_dimension();

    let raw_dimension = match provider.as_str() {
        "openai" => {
            let base_url = config
                .embedding
                .resolve_base_url("https://api.openai.com/v1");
            let embedder =
                providers::OpenAiCompatibleEmbedder::new(http_client, base_url, model.clone(), dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        "azure" | "azure_openai" => {
            let embedder = providers::OpenAiCompatibleEmbedder::azure(http_client, model.clone(), dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        "vertex" => {
            let embedder = providers::VertexEmbedder::new(http_client, model.clone(), dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        "gemini" => {
            let embedder = providers::GeminiEmbedder::new(http_client, model.clone(), dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        "bedrock" => {
            let embedder = providers::BedrockEmbedder::new(http_client, model.clone(), dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        "sagemaker" => {
            let embedder = providers::SageMakerEmbedder::new(http_client, dimension)?;
            Arc::new(RetryingEmbedder::new(embedder, dimension)) as Arc<dyn Embedder>
        }
        other => anyhow::bail!("unknown embedding provider '{other}'"),
    };

    let embedding_config = EmbeddingConfig {
        provider,
        model,
        dimension,
        spec,
    };

    Ok(Some((raw_dimension, embedding_config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RawEmbedder for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texts.len() > 2 {
                anyhow::bail!("maximum context length exceeded");
            }
            Ok(texts.iter().map(|_| vec![0.0_f32; 4]).collect())
        }
        fn native_dimension(&self) -> u32 {
            4
        }
    }

    #[tokio::test]
    async fn bisects_oversized_batch() {
        let embedder = RetryingEmbedder::new(FlakyEmbedder { calls: AtomicUsize::new(0) }, 4);
        let texts: Vec<String> = (0..4).map(|i| format!("text-{i}")).collect();
        let result = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(result.len(), 4);
    }

    struct AlwaysTooLarge;

    #[async_trait]
    impl RawEmbedder for AlwaysTooLarge {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.len() == 1 && texts[0].len() <= 2 {
                return Ok(vec![vec![0.0_f32; 4]]);
            }
            anyhow::bail!("token limit exceeded")
        }
        fn native_dimension(&self) -> u32 {
            4
        }
    }

    #[tokio::test]
    async fn truncates_single_oversized_text() {
        let embedder = RetryingEmbedder::new(AlwaysTooLarge, 4);
        let result = embedder.embed_query(&"x".repeat(16)).await.unwrap();
        assert_eq!(result.len(), 4);
    }
}
