use crate::error::{RagError, Result};
use crate::models::Vector;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Hashed character-trigram embedder. Local, deterministic and L2-normalized.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    name: String,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            name: format!("char-trigram-{dimensions}"),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vector {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Embeddings from any server speaking the OpenAI `/embeddings` protocol.
pub struct OpenAiCompatibleEmbedder {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    name: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("embeddings"))
            .map_err(|error| {
                RagError::Configuration(format!("invalid embedding url {base_url}: {error}"))
            })?;
        if dimensions == 0 {
            return Err(RagError::Configuration(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }

        let model = model.into();
        Ok(Self {
            client: Client::new(),
            name: format!("openai-compatible:{model}"),
            endpoint,
            api_key: None,
            model,
            dimensions,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = %self.name, batch_size = texts.len(), "embedding batch");

        let mut request = self.client.post(self.endpoint.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|err| {
            error!(provider = %self.name, error = %err, "embedding request failed");
            RagError::embedding(&self.name, format!("request failed: {err}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::embedding(
                &self.name,
                format!("endpoint returned {status}: {body}"),
            ));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RagError::embedding(&self.name, format!("malformed response: {err}")))?;

        order_embeddings(&self.name, payload, texts.len(), self.dimensions)
    }
}

fn order_embeddings(
    provider: &str,
    payload: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vector>> {
    if payload.data.len() != expected {
        return Err(RagError::embedding(
            provider,
            format!("expected {expected} embeddings, got {}", payload.data.len()),
        ));
    }

    let mut slots: Vec<Option<Vector>> = vec![None; expected];
    for (position, item) in payload.data.into_iter().enumerate() {
        let slot = item.index.unwrap_or(position);
        if slot >= expected || slots[slot].is_some() {
            return Err(RagError::embedding(
                provider,
                format!("response index {slot} is out of range or repeated"),
            ));
        }
        if item.embedding.len() != dimensions {
            return Err(RagError::embedding(
                provider,
                format!(
                    "embedding dimension {} != declared {dimensions}",
                    item.embedding.len()
                ),
            ));
        }
        slots[slot] = Some(item.embedding);
    }

    Ok(slots.into_iter().flatten().collect())
}
