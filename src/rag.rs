use crate::chunking::{split_pages, TextChunk};
use crate::config::RagConfig;
use crate::document::{collect_pages, Page};
use crate::embeddings::Embedder;
use crate::error::{RagError, Result, ServiceError};
use crate::generation::Generator;
use crate::prompt::build_context;
use crate::retry::RetryPolicy;
use crate::store::{Metric, QueryResult, StoredPoint, VectorStore};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// Stages a question goes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Embedding,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Errored,
}

impl QueryState {
    /// The only state allowed to follow this one on success
    pub fn next(self) -> Option<QueryState> {
        match self {
            QueryState::Idle => Some(QueryState::Embedding),
            QueryState::Embedding => Some(QueryState::Retrieving),
            QueryState::Retrieving => Some(QueryState::Assembling),
            QueryState::Assembling => Some(QueryState::Generating),
            QueryState::Generating => Some(QueryState::Done),
            QueryState::Done | QueryState::Errored => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Done | QueryState::Errored)
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks one question through the state machine
struct QueryRun {
    state: QueryState,
}

impl QueryRun {
    fn new() -> Self {
        QueryRun {
            state: QueryState::Idle,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!("Query state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn fail(&mut self, err: RagError) -> RagError {
        warn!("Query failed while {}: {}", self.state, err);
        self.state = QueryState::Errored;
        err
    }
}

/// A generated answer and the retrieved chunks it was conditioned on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: QueryResult,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_loaded: usize,
    pub files_failed: usize,
    pub pages: usize,
    pub chunks: usize,
    pub estimated_tokens: usize,
    pub point_ids: Vec<String>,
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    config: RagConfig,
    retry: RetryPolicy,
}

impl RagEngine {
    /// Create a new RAG engine
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: RagConfig,
        retry: RetryPolicy,
    ) -> Self {
        RagEngine {
            store,
            embedder,
            generator,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        self.store.collection_exists(&self.config.collection).await
    }

    /// Drop the collection so the next ingestion starts empty
    pub async fn reset_collection(&self) -> Result<()> {
        self.store.delete_collection(&self.config.collection).await
    }

    /// Load every supported file in `dir`, chunk, embed and store it.
    /// Files that cannot be read are logged and counted, not fatal.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let loaded = collect_pages(dir, self.config.load_concurrency).await?;
        info!(
            "Loaded {} pages from {} files ({} failed)",
            loaded.pages.len(),
            loaded.files_loaded,
            loaded.failures.len()
        );

        let mut report = self.ingest_pages(&loaded.pages).await?;
        report.files_loaded = loaded.files_loaded;
        report.files_failed = loaded.failures.len();
        Ok(report)
    }

    /// Chunk, embed and store already loaded pages
    pub async fn ingest_pages(&self, pages: &[Page]) -> Result<IngestReport> {
        let chunks = split_pages(pages, &self.config.chunking);
        let estimated_tokens: usize = chunks.iter().map(|c| c.token_count).sum();
        info!(
            "Split {} pages into {} chunks (~{} tokens)",
            pages.len(),
            chunks.len(),
            estimated_tokens
        );

        let chunk_count = chunks.len();
        let point_ids = self.index_chunks(chunks).await?;

        Ok(IngestReport {
            pages: pages.len(),
            chunks: chunk_count,
            estimated_tokens,
            point_ids,
            ..Default::default()
        })
    }

    /// Generate embeddings for chunks in batches and store them in the collection
    pub async fn index_chunks(&self, chunks: Vec<TextChunk>) -> Result<Vec<String>> {
        let collection = &self.config.collection;
        self.store
            .ensure_collection(collection, self.embedder.dimensions(), Metric::Cosine)
            .await?;

        let mut point_ids = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self
                .retry
                .run("embedding", || self.embedder.embed_batch(&texts))
                .await
                .map_err(RagError::Embedding)?;

            if embeddings.len() != batch.len() {
                return Err(RagError::Embedding(ServiceError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))));
            }

            let points = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| StoredPoint::new(chunk, embedding))
                .collect();

            let ids = self.store.upsert(collection, points).await?;
            info!(
                "Stored {} chunks in {} ({}/{})",
                ids.len(),
                collection,
                point_ids.len() + ids.len(),
                chunks.len()
            );
            point_ids.extend(ids);
        }

        Ok(point_ids)
    }

    /// Answer a question from the stored chunks.
    ///
    /// Runs embedding, retrieval, prompt assembly and generation strictly in
    /// that order. Finding no chunks is not an error; the generator is then
    /// called with an empty context.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuestion("question is empty".to_string()));
        }

        let mut run = QueryRun::new();

        run.advance();
        let question_embedding = self
            .retry
            .run("embedding", || self.embedder.embed(question))
            .await
            .map_err(|e| run.fail(RagError::Embedding(e)))?;

        run.advance();
        let sources = self
            .store
            .query(&self.config.collection, &question_embedding, self.config.top_k)
            .await
            .map_err(|e| run.fail(e))?;
        if sources.is_empty() {
            info!("No relevant chunks found in {}", self.config.collection);
        }

        run.advance();
        let context = build_context(&sources, &self.config.context_separator);
        let prompt = self.config.template.render(&context, question);

        run.advance();
        let text = self
            .retry
            .run("generation", || self.generator.generate(&prompt))
            .await
            .map_err(|e| run.fail(RagError::Generation(e)))?;

        run.advance();
        info!("Answered question with {} sources", sources.len());

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
        })
    }

    /// Run an interactive question loop until `exit` or end of input
    pub async fn run_query_loop<R: BufRead, W: Write>(
        &self,
        mut input: R,
        mut output: W,
    ) -> anyhow::Result<()> {
        writeln!(
            output,
            "Ready to answer questions about {}. Type 'exit' to quit.",
            self.config.collection
        )?;

        let mut buffer = String::new();
        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                writeln!(output, "Goodbye!")?;
                break;
            }

            match self.ask(question).await {
                Ok(answer) => {
                    writeln!(output, "\n{}", answer.text)?;
                    for source in &answer.sources {
                        writeln!(
                            output,
                            "  [{:.3}] {} p.{}",
                            source.score, source.chunk.source_id, source.chunk.page_number
                        )?;
                    }
                }
                // A missing collection will not appear between questions
                Err(err @ RagError::CollectionNotFound(_)) => return Err(err.into()),
                Err(err) => writeln!(output, "\nError: {}", err)?,
            }
        }

        Ok(())
    }
}
