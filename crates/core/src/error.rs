use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document has no extractable text: {0}")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid parameters supplied by the caller. Never retryable.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("embedding failed in {provider}: {details}")]
    Embedding { provider: String, details: String },

    #[error("provider {provider} failed: {cause}")]
    Provider { provider: String, cause: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },
}

impl RagError {
    pub fn embedding(provider: impl Into<String>, details: impl ToString) -> Self {
        Self::Embedding {
            provider: provider.into(),
            details: details.to_string(),
        }
    }

    pub fn provider(provider: impl Into<String>, cause: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            cause: cause.to_string(),
        }
    }

    /// Backend failures a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Embedding { .. } | Self::Provider { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Bounds a backend call by `after`, mapping expiry to [`RagError::Timeout`].
pub(crate) async fn within<T, F>(operation: impl Into<String>, after: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout {
            operation: operation.into(),
            after,
        }),
    }
}
