use crate::config::AssistantConfig;
use crate::error::{RagError, Result};
use crate::models::{ChatTurn, RetrievalResult};
use crate::prompt::build_prompt;
use crate::retriever::{DocumentIndex, Retriever};
use crate::session::SessionStore;
use crate::synthesizer::AnswerSynthesizer;
use crate::traits::ModelProvider;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

const SOURCE_LIMIT: usize = 3;
const SOURCE_PREVIEW_CHARS: usize = 200;

/// Result of one question: the recorded turn and whether it reached disk.
#[derive(Debug)]
pub struct Exchange {
    pub turn: ChatTurn,
    pub context: RetrievalResult,
    pub persist_error: Option<RagError>,
}

impl Exchange {
    pub fn is_durable(&self) -> bool {
        self.persist_error.is_none()
    }
}

#[derive(Debug)]
pub struct ProviderOutcome {
    pub provider_name: String,
    pub answer: Result<String>,
}

pub struct QueryCoordinator<P>
where
    P: ModelProvider,
{
    synthesizer: AnswerSynthesizer,
    provider: P,
    session: SessionStore,
    config: AssistantConfig,
}

impl<P> QueryCoordinator<P>
where
    P: ModelProvider,
{
    pub fn new(
        retriever: Arc<Retriever>,
        provider: P,
        session: SessionStore,
        config: AssistantConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            synthesizer: AnswerSynthesizer::new(retriever),
            provider,
            session,
            config,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        self.synthesizer.retriever()
    }

    /// Replaces the current document. Queries in flight keep the index they started with.
    pub async fn load_document(&self, name: &str, text: &str) -> Result<Arc<DocumentIndex>> {
        self.retriever()
            .index_document(name, text, &self.config.chunk)
            .await
    }

    /// Answers `query` against the current document and records the turn.
    ///
    /// Generation failures are returned as errors and nothing is recorded.
    /// A failed write of the history is reported on the [`Exchange`].
    pub async fn ask(&self, query: &str) -> Result<Exchange> {
        let index = self.current_index().await?;
        let answer = self
            .synthesizer
            .synthesize(query, &index, &self.provider, &self.config.answer)
            .await?;

        let turn = ChatTurn::new(query, answer.text, answer.provider_name)
            .with_sources(answer.context.sources(SOURCE_LIMIT, SOURCE_PREVIEW_CHARS));

        let persist_error = self.session.append(turn.clone()).await.err();
        if let Some(error) = &persist_error {
            warn!(error = %error, "answer recorded in memory only");
        }

        info!(
            document = index.document_name(),
            provider = %turn.provider_name,
            sources = turn.sources.len(),
            "answered query"
        );

        Ok(Exchange {
            turn,
            context: answer.context,
            persist_error,
        })
    }

    /// Sends one grounded prompt to several providers concurrently.
    ///
    /// Each provider succeeds or fails on its own; nothing is written to the
    /// session.
    pub async fn compare(
        &self,
        query: &str,
        providers: &[&dyn ModelProvider],
    ) -> Result<(RetrievalResult, Vec<ProviderOutcome>)> {
        let index = self.current_index().await?;
        let options = &self.config.answer;
        options.validate()?;

        let context = self
            .retriever()
            .retrieve(query, &index, options.top_k)
            .await?;
        let prompt = build_prompt(query, &context, options.top_k);

        let outcomes = join_all(providers.iter().map(|provider| {
            let prompt = prompt.as_str();
            async move {
                ProviderOutcome {
                    provider_name: provider.name().to_string(),
                    answer: self.synthesizer.generate(prompt, *provider, options).await,
                }
            }
        }))
        .await;

        Ok((context, outcomes))
    }

    async fn current_index(&self) -> Result<Arc<DocumentIndex>> {
        self.retriever().current().await.ok_or_else(|| {
            RagError::Configuration("no document loaded; load a document before asking".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;
    use crate::embeddings::CharacterNgramEmbedder;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoProvider {
        name: &'static str,
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
            let context = prompt
                .split("Context:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nQuestion:").next())
                .unwrap_or_default();
            Ok(format!("[{}] {}", self.name, context))
        }
    }

    struct DownProvider;

    #[async_trait]
    impl ModelProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
            Err(RagError::provider("down", "backend unavailable (503)"))
        }
    }

    fn config() -> AssistantConfig {
        let mut config = AssistantConfig::default();
        config.chunk = ChunkConfig::new(20, 5);
        config.answer.top_k = 1;
        config
    }

    async fn coordinator(
        dir: &tempfile::TempDir,
    ) -> Result<QueryCoordinator<EchoProvider>, Box<dyn std::error::Error>> {
        let retriever = Arc::new(Retriever::new(Arc::new(CharacterNgramEmbedder::default())));
        let session = SessionStore::load(dir.path().join("chat_history.json")).await?;
        Ok(QueryCoordinator::new(
            retriever,
            EchoProvider { name: "echo" },
            session,
            config(),
        )?)
    }

    #[tokio::test]
    async fn asking_before_loading_is_a_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let coordinator = coordinator(&dir).await?;
        assert!(matches!(
            coordinator.ask("anything?").await,
            Err(RagError::Configuration(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn ask_records_turn_with_sources() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let coordinator = coordinator(&dir).await?;
        coordinator
            .load_document("sky.txt", "The sky is blue. Grass is green.")
            .await?;

        let exchange = coordinator.ask("What color is the sky?").await?;
        assert!(exchange.is_durable());
        assert_eq!(exchange.turn.provider_name, "echo");
        assert!(exchange.turn.answer.contains("blue"));
        assert_eq!(exchange.turn.sources.len(), 1);
        assert_eq!(exchange.turn.sources[0].segment_id, 0);

        let reloaded = SessionStore::load(dir.path().join("chat_history.json")).await?;
        assert_eq!(reloaded.turns().await, vec![exchange.turn]);
        Ok(())
    }

    #[tokio::test]
    async fn compare_reports_each_provider_independently() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let coordinator = coordinator(&dir).await?;
        coordinator
            .load_document("sky.txt", "The sky is blue. Grass is green.")
            .await?;

        let other = EchoProvider { name: "other" };
        let providers: [&dyn ModelProvider; 3] = [coordinator.provider(), &DownProvider, &other];
        let (context, outcomes) = coordinator.compare("What color is the sky?", &providers).await?;

        assert_eq!(context.len(), 1);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].answer.as_ref().is_ok_and(|text| text.starts_with("[echo]")));
        assert!(matches!(outcomes[1].answer, Err(RagError::Provider { .. })));
        assert_eq!(outcomes[2].provider_name, "other");
        assert!(coordinator.session().is_empty().await);
        Ok(())
    }
}
