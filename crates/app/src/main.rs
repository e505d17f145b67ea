use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use doc_query_core::{
    extract_document_text, AnswerOptions, AssistantConfig, CharacterNgramEmbedder, ChunkConfig,
    ChunkUnit, EmbeddingProvider, Exchange, ModelBackend, ModelProvider, OpenAiCompatibleEmbedder,
    ProviderConfig, ProviderKind, QueryCoordinator, Retriever, SessionStore,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-query", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Chat history file
    #[arg(long, env = "DOC_QUERY_HISTORY", default_value = "chat_history.json", global = true)]
    history_file: PathBuf,
}

#[derive(Args)]
struct AnswerArgs {
    /// Document to load (.pdf, .txt or .md)
    #[arg(long)]
    document: PathBuf,

    /// LLM provider
    #[arg(long, env = "DOC_QUERY_PROVIDER", default_value = "gemini", value_parser = parse_provider)]
    provider: ProviderKind,

    /// Override the provider's default model
    #[arg(long, env = "DOC_QUERY_MODEL")]
    model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long, env = "DOC_QUERY_BASE_URL")]
    base_url: Option<String>,

    /// Generation temperature (0.0 - 1.0)
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Number of context chunks retrieved per question
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Chunk size in characters (or tokens with --chunk-unit tokens)
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Overlap between consecutive chunks
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    #[arg(long, value_enum, default_value_t = UnitArg::Characters)]
    chunk_unit: UnitArg,

    /// Deadline for each embedding or generation call, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// OpenAI-compatible embeddings endpoint; local trigram embeddings when unset
    #[arg(long, env = "DOC_QUERY_EMBEDDING_URL")]
    embedding_url: Option<String>,

    #[arg(long, env = "DOC_QUERY_EMBEDDING_MODEL", default_value = "all-MiniLM-L6-v2")]
    embedding_model: String,

    #[arg(long, env = "DOC_QUERY_EMBEDDING_DIMENSIONS", default_value_t = 384)]
    embedding_dimensions: usize,

    #[arg(long, env = "DOC_QUERY_EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Characters,
    Tokens,
}

#[derive(Subcommand)]
enum Command {
    /// Load a document and answer one question about it.
    Ask {
        #[command(flatten)]
        answer: AnswerArgs,
        /// Question to ask
        #[arg(long)]
        query: String,
    },
    /// Load a document and answer questions read from stdin, one per line.
    Chat {
        #[command(flatten)]
        answer: AnswerArgs,
    },
    /// Print stored chat turns.
    History {
        /// Only the most recent N turns (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
}

fn parse_provider(value: &str) -> Result<ProviderKind, String> {
    value.parse().map_err(|error: doc_query_core::RagError| error.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-query boot"
    );

    match cli.command {
        Command::Ask { answer, query } => {
            let coordinator = prepare(&answer, &cli.history_file).await?;
            let exchange = coordinator.ask(&query).await?;
            print_exchange(&exchange);
        }
        Command::Chat { answer } => {
            let coordinator = prepare(&answer, &cli.history_file).await?;
            println!(
                "Ask about {} ({}). Type :quit to leave.",
                answer.document.display(),
                coordinator.provider().name()
            );

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let query = line.trim();
                if query.is_empty() {
                    continue;
                }
                if query == ":quit" {
                    break;
                }
                match coordinator.ask(query).await {
                    Ok(exchange) => print_exchange(&exchange),
                    Err(error) if error.is_transient() => {
                        println!("error: {error} (you can retry)");
                    }
                    Err(error) => println!("error: {error}"),
                }
            }
        }
        Command::History { limit } => {
            let store = SessionStore::load(&cli.history_file).await?;
            let turns = store.recent(limit).await;
            if turns.is_empty() {
                println!("no chat history in {}", cli.history_file.display());
            }
            for turn in turns {
                println!(
                    "[{}] ({}) Q: {}",
                    turn.timestamp.to_rfc3339(),
                    turn.provider_name,
                    turn.query
                );
                println!("A: {}\n", turn.answer);
            }
        }
    }

    Ok(())
}

async fn prepare(
    args: &AnswerArgs,
    history_file: &Path,
) -> anyhow::Result<QueryCoordinator<ModelBackend>> {
    let config = AssistantConfig {
        chunk: ChunkConfig {
            chunk_size: args.chunk_size,
            overlap: args.chunk_overlap,
            unit: match args.chunk_unit {
                UnitArg::Characters => ChunkUnit::Characters,
                UnitArg::Tokens => ChunkUnit::Tokens,
            },
        },
        answer: AnswerOptions {
            top_k: args.top_k,
            temperature: args.temperature,
            timeout: Duration::from_secs(args.timeout_secs),
        },
        provider: args.provider,
        history_path: history_file.to_path_buf(),
    };
    config.validate()?;

    let mut provider_config = ProviderConfig::from_env(config.provider)?;
    if let Some(model) = &args.model {
        provider_config = provider_config.with_model(model);
    }
    if let Some(base_url) = &args.base_url {
        provider_config = provider_config.with_base_url(base_url);
    }
    let backend = ModelBackend::from_config(provider_config)?;

    let embedder: Arc<dyn EmbeddingProvider> = match &args.embedding_url {
        Some(url) => {
            let mut embedder =
                OpenAiCompatibleEmbedder::new(url, &args.embedding_model, args.embedding_dimensions)?;
            if let Some(key) = &args.embedding_api_key {
                embedder = embedder.with_api_key(key);
            }
            Arc::new(embedder)
        }
        None => Arc::new(CharacterNgramEmbedder::new(DEFAULT_EMBEDDING_DIMENSIONS)),
    };
    let retriever = Arc::new(Retriever::new(embedder).with_timeout(config.answer.timeout));

    let session = SessionStore::load_or_empty(&config.history_path).await?;
    if let Some(backup) = session.set_aside() {
        eprintln!(
            "warning: {} could not be read; moved it to {} and started a new history",
            config.history_path.display(),
            backup.display()
        );
    }
    let coordinator = QueryCoordinator::new(retriever, backend, session, config)?;

    let path = args.document.clone();
    let text = tokio::task::spawn_blocking(move || extract_document_text(&path)).await??;
    let name = args
        .document
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document")
        .to_string();

    tokio::select! {
        built = coordinator.load_document(&name, &text) => {
            let index = built?;
            println!(
                "Loaded {} ({} chunks, embeddings: {})",
                name,
                index.index().len(),
                index.embedder().name()
            );
        }
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("indexing of {name} cancelled");
        }
    }

    Ok(coordinator)
}

fn print_exchange(exchange: &Exchange) {
    println!("{}", exchange.turn.answer);
    for (position, source) in exchange.turn.sources.iter().enumerate() {
        println!(
            "  source {} (segment {}, score {:.4}): {}",
            position + 1,
            source.segment_id,
            source.score,
            source.preview
        );
    }
    if let Some(notice) = history_notice(exchange) {
        warn!(error = ?exchange.persist_error, "answer was not saved to chat history");
        eprintln!("{notice}");
    }
}

fn history_notice(exchange: &Exchange) -> Option<String> {
    exchange.persist_error.as_ref().map(|error| {
        format!("warning: answer kept in memory only, chat history not saved: {error}")
    })
}
