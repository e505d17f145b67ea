pub mod cohere;
pub mod gemini;
pub mod groq;

pub use cohere::CohereProvider;
pub use gemini::GeminiProvider;
pub use groq::GroqProvider;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{RagError, Result};
use crate::traits::ModelProvider;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use url::Url;

/// One of the supported model backends, chosen once from configuration.
pub enum ModelBackend {
    Gemini(GeminiProvider),
    Groq(GroqProvider),
    Cohere(CohereProvider),
}

impl ModelBackend {
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        Ok(match config.kind {
            ProviderKind::Gemini => Self::Gemini(GeminiProvider::new(config)?),
            ProviderKind::Groq => Self::Groq(GroqProvider::new(config)?),
            ProviderKind::Cohere => Self::Cohere(CohereProvider::new(config)?),
        })
    }

    pub fn from_env(kind: ProviderKind) -> Result<Self> {
        Self::from_config(ProviderConfig::from_env(kind)?)
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Gemini(_) => ProviderKind::Gemini,
            Self::Groq(_) => ProviderKind::Groq,
            Self::Cohere(_) => ProviderKind::Cohere,
        }
    }
}

#[async_trait]
impl ModelProvider for ModelBackend {
    fn name(&self) -> &str {
        match self {
            Self::Gemini(provider) => provider.name(),
            Self::Groq(provider) => provider.name(),
            Self::Cohere(provider) => provider.name(),
        }
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        match self {
            Self::Gemini(provider) => provider.generate(prompt, temperature).await,
            Self::Groq(provider) => provider.generate(prompt, temperature).await,
            Self::Cohere(provider) => provider.generate(prompt, temperature).await,
        }
    }
}

pub(crate) fn endpoint(config: &ProviderConfig, path: &str) -> Result<Url> {
    Url::parse(&config.base_url)
        .and_then(|base| base.join(path))
        .map_err(|error| {
            RagError::Configuration(format!(
                "invalid base url for {}: {error}",
                config.kind
            ))
        })
}

/// Turns a non-success response into a provider error that names the failure class.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Value>()
            .await
            .map_err(|error| RagError::provider(provider, format!("malformed response: {error}")));
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> RagError {
    let class = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
        StatusCode::TOO_MANY_REQUESTS => "quota or rate limit exceeded",
        _ if status.is_server_error() => "backend unavailable",
        _ => "request rejected",
    };
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.pointer("/message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    RagError::provider(provider, format!("{class} ({status}): {detail}"))
}

pub(crate) fn non_empty(provider: &str, text: Option<String>) -> Result<String> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(RagError::provider(
            provider,
            "malformed response: no generated text",
        )),
    }
}
