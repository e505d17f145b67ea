use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_HISTORY_FILE: &str = "chat_history.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    #[default]
    Characters,
    /// Whitespace-delimited tokens, each carrying its trailing whitespace.
    Tokens,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    #[serde(default)]
    pub unit: ChunkUnit,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            unit: ChunkUnit::Characters,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            unit: ChunkUnit::Characters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerOptions {
    pub top_k: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl AnswerOptions {
    pub fn validate(&self) -> Result<()> {
        validate_top_k(self.top_k)?;
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::Configuration(format!(
                "temperature must be within 0.0..=1.0, got {}",
                self.temperature
            )));
        }
        validate_timeout(self.timeout)
    }
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::Configuration(
            "k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(RagError::Configuration(
            "timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Groq,
    Cohere,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Gemini, Self::Groq, Self::Cohere];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
            Self::Cohere => "cohere",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Cohere => "COHERE_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-pro",
            Self::Groq => "llama3-8b-8192",
            Self::Cohere => "command-r",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/",
            Self::Groq => "https://api.groq.com/openai/v1/",
            Self::Cohere => "https://api.cohere.com/v2/",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            "cohere" => Ok(Self::Cohere),
            other => Err(RagError::Configuration(format!(
                "unsupported provider: {other}"
            ))),
        }
    }
}

/// Credentials and endpoint for one model backend.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(RagError::Configuration(format!(
                "{} must not be empty",
                kind.api_key_var()
            )));
        }

        Ok(Self {
            kind,
            api_key,
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
        })
    }

    pub fn from_env(kind: ProviderKind) -> Result<Self> {
        let api_key = std::env::var(kind.api_key_var()).map_err(|_| {
            RagError::Configuration(format!(
                "{} not found in environment variables",
                kind.api_key_var()
            ))
        })?;
        Self::new(kind, api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub chunk: ChunkConfig,
    pub answer: AnswerOptions,
    pub provider: ProviderKind,
    pub history_path: PathBuf,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            answer: AnswerOptions::default(),
            provider: ProviderKind::default(),
            history_path: PathBuf::from(DEFAULT_HISTORY_FILE),
        }
    }
}

impl AssistantConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        self.answer.validate()
    }
}
