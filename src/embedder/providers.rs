//! Provider variants behind the `RawEmbedder` seam (§4.6). Each provider
//! resolves its own credentials from the process environment at
//! construction time; a missing credential is a fatal, enumerated error
//! rather than a late runtime failure.

use async_trait::async_trait;
use serde::Deserialize;

use super::RawEmbedder;

/// Resolves a list of required env vars, or fails naming every missing one.
fn require_env(keys: &[&str]) -> anyhow::Result<Vec<String>> {
    let mut missing = Vec::new();
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        match std::env::var(key) {
            Ok(v) if !v.trim().is_empty() => values.push(v),
            _ => missing.push(key.to_string()),
        }
    }
    if !missing.is_empty() {
        anyhow::bail!(
            "missing required credentials for embedding provider: {}",
            missing.join(", ")
        );
    }
    Ok(values)
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

/// OpenAI and OpenAI-compatible endpoints (most third-party embedding
/// gateways mirror this wire shape, which is why Azure OpenAI reuses it
/// below with a different base URL and header).
pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: u32,
    auth_header: &'static str,
    auth_prefix: &'static str,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(client: reqwest::Client, base_url: String, model: String, dimension: u32) -> anyhow::Result<Self> {
        let [api_key] = require_env(&["OPENAI_API_KEY"])?[..] else {
            unreachable!()
        };
        Ok(Self {
            client,
            base_url,
            model,
            api_key: api_key.clone(),
            dimension,
            auth_header: "Authorization",
            auth_prefix: "Bearer ",
        })
    }

    pub fn azure(
        client: reqwest::Client,
        model: String,
        dimension: u32,
    ) -> anyhow::Result<Self> {
        let values = require_env(&["AZURE_OPENAI_API_KEY", "AZURE_OPENAI_ENDPOINT"])?;
        let (api_key, endpoint) = (values[0].clone(), values[1].clone());
        let api_version = std::env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2024-02-01".to_string());
        let base_url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            endpoint.trim_end_matches('/'),
            model,
            api_version
        );
        Ok(Self {
            client,
            base_url,
            model,
            api_key,
            dimension,
            auth_header: "api-key",
            auth_prefix: "",
        })
    }
}

#[async_trait]
impl RawEmbedder for OpenAiCompatibleEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = if self.base_url.contains("/embeddings") {
            self.base_url.clone()
        } else {
            format!("{}/embeddings", self.base_url.trim_end_matches('/'))
        };

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&url)
            .header(self.auth_header, format!("{}{}", self.auth_prefix, self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("embedding request failed ({status}): {text}");
        }

        let parsed: OpenAiEmbeddingResponse = response.json().await?;
        let mut items = parsed.data;
        items.sort_by_key(|i| i.index);
        Ok(items.into_iter().map(|i| i.embedding).collect())
    }

    fn native_dimension(&self) -> u32 {
        self.dimension
    }
}

/// Google Vertex AI's `predict` endpoint for text embedding models.
pub struct VertexEmbedder {
    client: reqwest::Client,
    project: String,
    location: String,
    model: String,
    access_token: String,
    dimension: u32,
}

impl VertexEmbedder {
    pub fn new(client: reqwest::Client, model: String, dimension: u32) -> anyhow::Result<Self> {
        let values = require_env(&[
            "VERTEX_PROJECT_ID",
            "VERTEX_LOCATION",
            "VERTEX_ACCESS_TOKEN",
        ])?;
        Ok(Self {
            client,
            project: values[0].clone(),
            location: values[1].clone(),
            access_token: values[2].clone(),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl RawEmbedder for VertexEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.location, self.project, self.location, self.model
        );
        let instances: Vec<_> = texts.iter().map(|t| serde_json::json!({"content": t})).collect();
        let body = serde_json::json!({ "instances": instances });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("vertex embedding request failed ({status}): {text}");
        }

        #[derive(Deserialize)]
        struct Prediction {
            embeddings: EmbeddingValues,
        }
        #[derive(Deserialize)]
        struct EmbeddingValues {
            values: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct VertexResponse {
            predictions: Vec<Prediction>,
        }

        let parsed: VertexResponse = response.json().await?;
        Ok(parsed.predictions.into_iter().map(|p| p.embeddings.values).collect())
    }

    fn native_dimension(&self) -> u32 {
        self.dimension
    }
}

/// Gemini's `embedContent`/batch endpoint (API-key auth, distinct from
/// Vertex's service-account flow).
pub struct GeminiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    dimension: u32,
}

impl GeminiEmbedder {
    pub fn new(client: reqwest::Client, model: String, dimension: u32) -> anyhow::Result<Self> {
        let [api_key] = require_env(&["GEMINI_API_KEY"])?[..] else {
            unreachable!()
        };
        Ok(Self {
            client,
            model,
            api_key: api_key.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl RawEmbedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
            self.model, self.api_key
        );
        let requests: Vec<_> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": t }] }
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("gemini embedding request failed ({status}): {text}");
        }

        #[derive(Deserialize)]
        struct Embedding {
            values: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct GeminiEmbeddingEntry {
            embedding: Embedding,
        }
        #[derive(Deserialize)]
        struct GeminiResponse {
            embeddings: Vec<GeminiEmbeddingEntry>,
        }

        let parsed: GeminiResponse = response.json().await?;
        Ok(parsed.embeddings.into_iter().map(|e| e.embedding.values).collect())
    }

    fn native_dimension(&self) -> u32 {
        self.dimension
    }
}

/// AWS Bedrock invoke-model embedding (Titan/Cohere embedding models).
/// Uses a pre-signed-request-style bearer token resolved from the
/// environment rather than implementing SigV4 directly — this crate does
/// not own AWS request signing (§1 out-of-scope: "the specific HTTP
/// client ... used to fetch bytes").
pub struct BedrockEmbedder {
    client: reqwest::Client,
    region: String,
    model: String,
    access_token: String,
    dimension: u32,
}

impl BedrockEmbedder {
    pub fn new(client: reqwest::Client, model: String, dimension: u32) -> anyhow::Result<Self> {
        let values = require_env(&["AWS_REGION", "AWS_BEARER_TOKEN_BEDROCK"])?;
        Ok(Self {
            client,
            region: values[0].clone(),
            access_token: values[1].clone(),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl RawEmbedder for BedrockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let url = format!(
                "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
                self.region, self.model
            );
            let body = serde_json::json!({ "inputText": text });
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("bedrock embedding request failed ({status}): {text}");
            }
            #[derive(Deserialize)]
            struct TitanResponse {
                embedding: Vec<f32>,
            }
            let parsed: TitanResponse = response.json().await?;
            out.push(parsed.embedding);
        }
        Ok(out)
    }

    fn native_dimension(&self) -> u32 {
        self.dimension
    }
}

/// SageMaker real-time inference endpoint hosting a custom embedding model.
pub struct SageMakerEmbedder {
    client: reqwest::Client,
    endpoint_url: String,
    access_token: String,
    dimension: u32,
}

impl SageMakerEmbedder {
    pub fn new(client: reqwest::Client, dimension: u32) -> anyhow::Result<Self> {
        let values = require_env(&["SAGEMAKER_ENDPOINT_URL", "SAGEMAKER_BEARER_TOKEN"])?;
        Ok(Self {
            client,
            endpoint_url: values[0].clone(),
            access_token: values[1].clone(),
            dimension,
        })
    }
}

#[async_trait]
impl RawEmbedder for SageMakerEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "inputs": texts });
        let response = self
            .client
            .post(&self.endpoint_url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("sagemaker embedding request failed ({status}): {text}");
        }
        let vectors: Vec<Vec<f32>> = response.json().await?;
        Ok(vectors)
    }

    fn native_dimension(&self) -> u32 {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_enumerate_every_key() {
        std::env::remove_var("SAGEMAKER_ENDPOINT_URL");
        std::env::remove_var("SAGEMAKER_BEARER_TOKEN");
        let err = require_env(&["SAGEMAKER_ENDPOINT_URL", "SAGEMAKER_BEARER_TOKEN"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SAGEMAKER_ENDPOINT_URL"));
        assert!(message.contains("SAGEMAKER_BEARER_TOKEN"));
    }
}
