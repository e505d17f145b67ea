pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod session;
pub mod synthesizer;
pub mod traits;

pub use chunking::{chunk, normalize_whitespace};
pub use config::{
    AnswerOptions, AssistantConfig, ChunkConfig, ChunkUnit, ProviderConfig, ProviderKind,
};
pub use embeddings::{
    CharacterNgramEmbedder, OpenAiCompatibleEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ExtractError, RagError, Result};
pub use extractor::{extract_document_text, LopdfExtractor, PageText, PlainTextExtractor};
pub use index::VectorIndex;
pub use models::{
    Answer, ChatTurn, IndexEntry, RetrievalResult, ScoredSegment, Segment, SourceRef, Vector,
};
pub use orchestrator::{Exchange, ProviderOutcome, QueryCoordinator};
pub use prompt::build_prompt;
pub use providers::{CohereProvider, GeminiProvider, GroqProvider, ModelBackend};
pub use retriever::{DocumentIndex, Retriever};
pub use session::SessionStore;
pub use synthesizer::AnswerSynthesizer;
pub use traits::{EmbeddingProvider, ModelProvider, TextExtractor};
