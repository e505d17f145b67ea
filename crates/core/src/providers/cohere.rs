use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::providers::{check_status, endpoint, non_empty};
use crate::traits::ModelProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const NAME: &str = "cohere";

pub struct CohereProvider {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl CohereProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let url = endpoint(&config, "chat")?;
        Ok(Self {
            client: Client::new(),
            url,
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl ModelProvider for CohereProvider {
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
        .pointer("/message/content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.pointer("/type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.pointer("/text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .concat()
        });
    non_empty(NAME, text)
}
