use crate::error::{ExtractError, Result};
use crate::models::Vector;
use async_trait::async_trait;
use std::path::Path;

/// Maps text to fixed-dimension vectors.
///
/// `embed` returns one vector per input in input order, and batching must not
/// change any individual result. An empty batch yields an empty result.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identity recorded by every index built with this provider.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>>;
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable name used for logging and chat attribution.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}
