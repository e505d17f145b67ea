use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::providers::{check_status, endpoint, non_empty};
use crate::traits::ModelProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const NAME: &str = "gemini";

pub struct GeminiProvider {
    client: Client,
    url: Url,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let url = endpoint(&config, &format!("models/{}:generateContent", config.model))?;
        Ok(Self {
            client: Client::new(),
            url,
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!(provider = NAME, model = %self.model, prompt_chars = prompt.len(), "generate");

        let response = self
            .client
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "text": prompt }],
                }],
                "generationConfig": { "temperature": temperature },
            }))
            .send()
            .await
            .map_err(|error| RagError::provider(NAME, format!("request failed: {error}")))?;

        let body = check_status(NAME, response).await?;
        parse_response(&body)
    }
}

fn parse_response(body: &Value) -> Result<String> {
    if let Some(reason) = body
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(RagError::provider(NAME, format!("prompt blocked: {reason}")));
    }

    let text = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.pointer("/text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .concat()
        });

    non_empty(NAME, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    #[test]
    fn url_targets_configured_model() {
        let config = ProviderConfig::new(ProviderKind::Gemini, "key")
            .expect("key present")
            .with_model("gemini-1.5-flash");
        let provider = GeminiProvider::new(config).expect("valid url");
        assert_eq!(
            provider.url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "The sky " }, { "text": "is blue." }] }
            }]
        });
        assert_eq!(parse_response(&body).ok().as_deref(), Some("The sky is blue."));
    }

    #[test]
    fn blocked_prompt_is_a_provider_error() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let error = parse_response(&body).expect_err("blocked");
        assert!(matches!(error, RagError::Provider { .. }));
        assert!(error.to_string().contains("SAFETY"));
    }

    #[test]
    fn missing_candidates_is_malformed() {
        assert!(parse_response(&json!({ "candidates": [] })).is_err());
    }
}
