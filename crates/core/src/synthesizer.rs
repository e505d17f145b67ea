use crate::config::AnswerOptions;
use crate::error::{within, Result};
use crate::models::Answer;
use crate::prompt::build_prompt;
use crate::retriever::{DocumentIndex, Retriever};
use crate::traits::ModelProvider;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Retrieves context for a query and asks a model to answer from it.
///
/// No retries happen here; a failed or timed-out generation is returned to
/// the caller as is.
pub struct AnswerSynthesizer {
    retriever: Arc<Retriever>,
}

impl AnswerSynthesizer {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub async fn synthesize<P>(
        &self,
        query: &str,
        index: &DocumentIndex,
        provider: &P,
        options: &AnswerOptions,
    ) -> Result<Answer>
    where
        P: ModelProvider + ?Sized,
    {
        options.validate()?;

        let context = self.retriever.retrieve(query, index, options.top_k).await?;
        if context.is_empty() {
            warn!(
                document = index.document_name(),
                "no segments retrieved, answering without context"
            );
        }

        let prompt = build_prompt(query, &context, options.top_k);
        self.generate(&prompt, provider, options).await.map(|text| Answer {
            text,
            provider_name: provider.name().to_string(),
            context,
        })
    }

    /// Sends an already assembled prompt, bounded by the configured timeout.
    pub async fn generate<P>(&self, prompt: &str, provider: &P, options: &AnswerOptions) -> Result<String>
    where
        P: ModelProvider + ?Sized,
    {
        let started = Instant::now();
        let operation = format!("generate({})", provider.name());
        let text = within(
            operation,
            options.timeout,
            provider.generate(prompt, options.temperature),
        )
        .await?;

        info!(
            provider = provider.name(),
            temperature = options.temperature,
            answer_chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated answer"
        );
        Ok(text)
    }
}
