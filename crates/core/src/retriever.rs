use crate::chunking::chunk;
use crate::config::{ChunkConfig, DEFAULT_TIMEOUT};
use crate::error::{within, RagError, Result};
use crate::index::VectorIndex;
use crate::models::{RetrievalResult, Vector};
use crate::traits::EmbeddingProvider;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Segments embedded per provider call while building an index.
pub const EMBED_BATCH_SIZE: usize = 64;

/// A built index bound to the embedding provider that produced its vectors.
pub struct DocumentIndex {
    id: Uuid,
    document_name: String,
    digest: String,
    chunk_config: ChunkConfig,
    built_at: DateTime<Utc>,
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("id", &self.id)
            .field("document_name", &self.document_name)
            .field("digest", &self.digest)
            .field("segments", &self.index.len())
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl DocumentIndex {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// SHA-256 of the indexed text.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn chunk_config(&self) -> ChunkConfig {
        self.chunk_config
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }
}

/// Build-once, query-many pipeline with one swappable current document.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    current: RwLock<Option<Arc<DocumentIndex>>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            timeout: DEFAULT_TIMEOUT,
            current: RwLock::new(None),
        }
    }

    /// Deadline applied to every embedding call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Chunks, embeds and indexes `text` without touching the current binding.
    pub async fn build_index(
        &self,
        document_name: &str,
        text: &str,
        config: &ChunkConfig,
    ) -> Result<DocumentIndex> {
        build_with(
            Arc::clone(&self.embedder),
            self.timeout,
            document_name,
            text,
            config,
        )
        .await
    }

    /// Builds an index and installs it as the current binding in one swap.
    ///
    /// Dropping the returned future before it resolves leaves the previous
    /// binding in place.
    pub async fn index_document(
        &self,
        document_name: &str,
        text: &str,
        config: &ChunkConfig,
    ) -> Result<Arc<DocumentIndex>> {
        self.index_document_with(Arc::clone(&self.embedder), document_name, text, config)
            .await
    }

    pub async fn index_document_with(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        document_name: &str,
        text: &str,
        config: &ChunkConfig,
    ) -> Result<Arc<DocumentIndex>> {
        let built = Arc::new(build_with(embedder, self.timeout, document_name, text, config).await?);

        let previous = self.current.write().await.replace(Arc::clone(&built));
        if let Some(previous) = previous {
            debug!(replaced = %previous.id, installed = %built.id, "swapped document index");
        }

        Ok(built)
    }

    pub async fn current(&self) -> Option<Arc<DocumentIndex>> {
        self.current.read().await.clone()
    }

    /// Embeds `query` with the provider bound to `index` and searches it.
    pub async fn retrieve(
        &self,
        query: &str,
        index: &DocumentIndex,
        k: usize,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(RagError::Configuration("query is empty".to_string()));
        }
        if k == 0 {
            return Err(RagError::Configuration(
                "k must be greater than zero".to_string(),
            ));
        }

        let embedder = index.embedder();
        let vector = embed_batch(embedder.as_ref(), self.timeout, &[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::embedding(embedder.name(), "no vector returned for query"))?;

        let result = index.index().search(&vector, k)?;
        debug!(
            document = %index.document_name,
            provider = embedder.name(),
            k,
            hits = result.len(),
            "retrieved segments"
        );
        Ok(result)
    }

    /// Retrieves against whatever binding is current when the call starts.
    pub async fn retrieve_current(
        &self,
        query: &str,
        k: usize,
    ) -> Result<(Arc<DocumentIndex>, RetrievalResult)> {
        let index = self.current().await.ok_or_else(|| {
            RagError::Configuration("no document has been indexed yet".to_string())
        })?;
        let result = self.retrieve(query, &index, k).await?;
        Ok((index, result))
    }
}

async fn build_with(
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    document_name: &str,
    text: &str,
    config: &ChunkConfig,
) -> Result<DocumentIndex> {
    let started = Instant::now();
    let segments = chunk(text, config)?;

    let mut vectors: Vec<Vector> = Vec::with_capacity(segments.len());
    for batch in segments.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|segment| segment.text.clone()).collect();
        vectors.extend(embed_batch(embedder.as_ref(), timeout, &texts).await?);
    }

    let entries = segments.into_iter().zip(vectors).collect();
    let index = VectorIndex::build(entries, embedder.dimensions())?;

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());

    let built = DocumentIndex {
        id: Uuid::new_v4(),
        document_name: document_name.to_string(),
        digest: format!("{:x}", hasher.finalize()),
        chunk_config: *config,
        built_at: Utc::now(),
        index,
        embedder,
    };

    info!(
        document = %built.document_name,
        index_id = %built.id,
        segments = built.index.len(),
        dimensions = built.index.dimensions(),
        provider = built.embedder.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built document index"
    );

    Ok(built)
}

/// One provider call with shape checks: one vector per text, declared dimension.
async fn embed_batch(
    embedder: &dyn EmbeddingProvider,
    timeout: Duration,
    texts: &[String],
) -> Result<Vec<Vector>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let operation = format!("embed({})", embedder.name());
    let vectors = within(operation, timeout, embedder.embed(texts)).await?;

    if vectors.len() != texts.len() {
        return Err(RagError::embedding(
            embedder.name(),
            format!("returned {} vectors for {} texts", vectors.len(), texts.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != embedder.dimensions()) {
        return Err(RagError::embedding(
            embedder.name(),
            format!(
                "vector dimension {} != declared {}",
                bad.len(),
                embedder.dimensions()
            ),
        ));
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use async_trait::async_trait;

    struct StalledEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StalledEmbedder {
        fn name(&self) -> &str {
            "stalled"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vector>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    struct LyingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LyingEmbedder {
        fn name(&self) -> &str {
            "lying"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn retriever() -> Retriever {
        Retriever::new(Arc::new(CharacterNgramEmbedder::default()))
    }

    #[tokio::test]
    async fn index_records_provider_and_digest() {
        let retriever = retriever();
        let index = retriever
            .build_index("notes.txt", "alpha beta gamma", &ChunkConfig::new(8, 2))
            .await
            .expect("index builds");

        assert_eq!(index.embedder().name(), "char-trigram-128");
        assert_eq!(index.index().dimensions(), 128);
        assert_eq!(index.digest().len(), 64);
        assert!(index.index().len() > 1);
        assert!(retriever.current().await.is_none());
    }

    #[tokio::test]
    async fn empty_document_builds_empty_index() {
        let retriever = retriever();
        let index = retriever
            .index_document("empty.txt", "", &ChunkConfig::default())
            .await
            .expect("empty document is legal");

        assert!(index.index().is_empty());
        let result = retriever
            .retrieve("anything at all", &index, 3)
            .await
            .expect("search on empty index");
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn retrieval_requires_current_document() {
        let retriever = retriever();
        let result = retriever.retrieve_current("where?", 2).await;
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn blank_query_and_zero_k_are_rejected() {
        let retriever = retriever();
        let index = retriever
            .build_index("doc", "some content here", &ChunkConfig::default())
            .await
            .expect("index builds");

        assert!(matches!(
            retriever.retrieve("   ", &index, 2).await,
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            retriever.retrieve("content", &index, 0).await,
            Err(RagError::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_embedding_times_out() {
        let retriever = Retriever::new(Arc::new(StalledEmbedder)).with_timeout(Duration::from_secs(1));
        let result = retriever
            .index_document("doc", "some text", &ChunkConfig::default())
            .await;

        assert!(matches!(result, Err(RagError::Timeout { .. })));
        assert!(retriever.current().await.is_none());
    }

    #[tokio::test]
    async fn provider_returning_wrong_dimension_is_rejected() {
        let retriever = Retriever::new(Arc::new(LyingEmbedder));
        let result = retriever
            .index_document("doc", "some text", &ChunkConfig::default())
            .await;

        assert!(matches!(result, Err(RagError::Embedding { .. })));
        assert!(retriever.current().await.is_none());
    }

    #[tokio::test]
    async fn reindexing_rebinds_index_and_provider_together() {
        let retriever = retriever();
        let first = retriever
            .index_document("first", "red apples and green pears", &ChunkConfig::new(10, 2))
            .await
            .expect("first index");

        let wider: Arc<dyn EmbeddingProvider> = Arc::new(CharacterNgramEmbedder::new(256));
        let second = retriever
            .index_document_with(wider, "second", "blue whales", &ChunkConfig::new(10, 2))
            .await
            .expect("second index");

        let (current, result) = retriever
            .retrieve_current("whales", 1)
            .await
            .expect("retrieve against new binding");
        assert_eq!(current.id(), second.id());
        assert_ne!(current.id(), first.id());
        assert_eq!(current.embedder().dimensions(), 256);
        assert_eq!(result.len(), 1);

        // the old handle still answers with its own provider
        let old = retriever.retrieve("apples", &first, 1).await.expect("old handle");
        assert_eq!(old.len(), 1);
    }
}
