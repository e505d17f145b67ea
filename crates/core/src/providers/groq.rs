use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::providers::{check_status, endpoint, non_empty};
use crate::traits::ModelProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const NAME: &str = "groq";

/// Groq through its OpenAI-compatible chat completions API.
pub struct GroqProvider {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl GroqProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let url = endpoint(&config, "chat/completions")?;
        Ok(Self {
            client: Client::new(),
            url,
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl ModelProvider for GroqProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!(provider = NAME, model = %self.model, prompt_chars = prompt.len(), "generate");

        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": temperature,
            }))
            .send()
            .await
            .map_err(|error| RagError::provider(NAME, format!("request failed: {error}")))?;

        let body = check_status(NAME, response).await?;
        parse_response(&body)
    }
}

fn parse_response(body: &Value) -> Result<String> {
    let text = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string);
    non_empty(NAME, text)
}
