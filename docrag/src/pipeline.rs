//! Retrieval pipeline orchestrator.
//!
//! The [`RetrievalPipeline`] ties the pieces together. Ingestion runs
//! normalize → chunk → embed → store. Queries run embed → rank → select →
//! snippet, and in RAG mode hand the selected segments to an
//! [`AnswerComposer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docrag::{InMemoryDocumentStore, RagConfig, RetrievalPipeline, SearchRequest, SourceDocument};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_service(Arc::new(my_embedder))
//!     .document_store(Arc::new(InMemoryDocumentStore::new()))
//!     .generation_service(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.ingest(SourceDocument::single_page("faq.md", text)).await?;
//! let outcome = pipeline.ask(&SearchRequest::new("how do refunds work?")).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, chunker_for};
use crate::compose::{AnswerComposer, ContextItem, GenerationService, citations};
use crate::config::{IngestFailurePolicy, RagConfig};
use crate::document::{
    Citation, Document, DocumentId, DocumentMeta, SearchHit, Segment, SourceDocument,
    citation_label, round_score,
};
use crate::embedding::{EmbeddingClient, EmbeddingService};
use crate::error::{RagError, Result};
use crate::select::select_top_k;
use crate::similarity::{Ranking, rank};
use crate::snippet::{best_snippet_with_margin, highlight};
use crate::store::{DocumentStore, SegmentFilter};
use crate::text::{normalize_text, title_from_filename};

/// Shown to users when a question is asked before anything was ingested.
pub const NOTHING_INDEXED_MESSAGE: &str = "No content indexed yet. Please ingest a document.";

/// Characters of segment text kept in a [`SegmentPreview`].
pub const PREVIEW_CHARS: usize = 200;

/// Segments returned by [`RetrievalPipeline::document_segments`] when no limit is given.
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

/// Summary of one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    /// The stored document record.
    pub document: Document,
    /// Number of segments stored for the document.
    pub segment_count: usize,
    /// Sequence indices of segments dropped because they could not be embedded.
    pub skipped: Vec<usize>,
}

/// A query against the indexed corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict the search to one document.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    /// Number of results; the configured `top_k` when absent.
    #[serde(default)]
    pub k: Option<usize>,
}

impl SearchRequest {
    /// A corpus-wide request using the configured `top_k`.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), document_id: None, k: None }
    }

    /// Restrict the request to `id`.
    pub fn in_document(mut self, id: DocumentId) -> Self {
        self.document_id = Some(id);
        self
    }

    /// Override the number of results.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// Selected results of a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Retrieval {
    /// Highlighted hits in ranking order.
    pub hits: Vec<SearchHit>,
    /// Candidates skipped because their vector length differs from the query's.
    pub rejected: usize,
    /// True when the searched scope holds no segments at all.
    pub nothing_indexed: bool,
}

impl Retrieval {
    fn nothing_indexed() -> Self {
        Self { nothing_indexed: true, ..Self::default() }
    }
}

/// One page of a plain semantic-search listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPage {
    /// Hits on this page, best first.
    pub hits: Vec<SearchHit>,
    /// Zero-based page number.
    pub page: usize,
    /// Requested page size.
    pub size: usize,
    /// Number of candidates ranked across all pages.
    pub total: usize,
}

/// Result of [`RetrievalPipeline::ask`].
#[derive(Debug)]
pub enum AskOutcome {
    /// The searched scope holds no segments.
    NothingIndexed,
    /// The generation service produced an answer.
    Answered {
        /// Trimmed answer text.
        answer: String,
        /// Citations matching the `[#n]` markers in the answer.
        citations: Vec<Citation>,
        /// Retrieved hits used as context.
        hits: Vec<SearchHit>,
    },
    /// Retrieval succeeded but generation failed.
    GenerationFailed {
        /// The generation error.
        error: RagError,
        /// Citations of the context that was sent.
        citations: Vec<Citation>,
        /// Retrieved hits, still usable for display.
        hits: Vec<SearchHit>,
    },
}

impl AskOutcome {
    /// Text to show the user: the answer, or the nothing-indexed notice.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::NothingIndexed => Some(NOTHING_INDEXED_MESSAGE),
            Self::Answered { answer, .. } => Some(answer.as_str()),
            Self::GenerationFailed { .. } => None,
        }
    }

    /// Retrieved hits, empty when nothing is indexed.
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::NothingIndexed => &[],
            Self::Answered { hits, .. } | Self::GenerationFailed { hits, .. } => hits,
        }
    }
}

/// Truncated view of a stored segment for debugging ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentPreview {
    /// 1-based page of the segment.
    pub page: usize,
    /// Sequence index within the document.
    pub sequence: usize,
    /// First [`PREVIEW_CHARS`] characters, followed by `…` if cut.
    pub text: String,
}

impl SegmentPreview {
    fn of(segment: &Segment) -> Self {
        let mut text: String = segment.text.chars().take(PREVIEW_CHARS).collect();
        if segment.text.chars().count() > PREVIEW_CHARS {
            text.push('…');
        }
        Self { page: segment.page, sequence: segment.sequence, text }
    }
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RetrievalPipeline::builder()`].
pub struct RetrievalPipeline {
    config: RagConfig,
    embedder: EmbeddingClient,
    store: Arc<dyn DocumentStore>,
    chunker: Arc<dyn Chunker>,
    composer: Option<AnswerComposer>,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the document store.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Ingest a document: normalize → chunk → embed → store.
    ///
    /// Each page is normalized and chunked on its own, so no segment spans
    /// two pages. Sequence indices run across the whole document. What
    /// happens to a segment that fails to embed is decided by the configured
    /// [`IngestFailurePolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ingestion`] if embedding fails under
    /// [`IngestFailurePolicy::Abort`], if no segment could be embedded, or if
    /// the stored segment count cannot be read or does not match. The partly
    /// created document is removed in every case.
    pub async fn ingest(&self, source: SourceDocument) -> Result<IngestReport> {
        let mut drafts: Vec<(usize, String)> = Vec::new();
        for (page_index, page) in source.pages.iter().enumerate() {
            let text = normalize_text(page, &source.filename);
            let page = page_index + 1;
            drafts.extend(self.chunker.chunk(&text).into_iter().map(|chunk| (page, chunk)));
        }

        let document = self
            .store
            .create_document(DocumentMeta {
                title: title_from_filename(&source.filename),
                filename: source.filename.clone(),
                page_count: source.pages.len(),
                size_bytes: source.size_bytes,
            })
            .await?;

        if drafts.is_empty() {
            info!(document.id = %document.id, segment_count = 0, "ingested document (empty)");
            return Ok(IngestReport { document, segment_count: 0, skipped: Vec::new() });
        }

        let texts: Vec<&str> = drafts.iter().map(|(_, text)| text.as_str()).collect();
        let mut skipped = Vec::new();
        let vectors: Vec<Option<Vec<f32>>> = match self.config.ingest_failure_policy {
            IngestFailurePolicy::Abort => match self.embedder.embed_many(&texts).await {
                Ok(vectors) => vectors.into_iter().map(Some).collect(),
                Err(e) => {
                    self.discard(document.id).await;
                    return Err(ingestion_error(document.id, format!("embedding failed: {e}")));
                }
            },
            IngestFailurePolicy::SkipSegment => {
                let outcomes = self.embedder.embed_many_outcomes(&texts).await;
                outcomes
                    .into_iter()
                    .enumerate()
                    .map(|(sequence, outcome)| match outcome {
                        Ok(vector) => Some(vector),
                        Err(e) => {
                            warn!(
                                document.id = %document.id,
                                sequence,
                                error = %e,
                                "skipping segment"
                            );
                            skipped.push(sequence);
                            None
                        }
                    })
                    .collect()
            }
        };

        let segments: Vec<Segment> = drafts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .filter_map(|(sequence, ((page, text), vector))| {
                vector.map(|embedding| Segment {
                    document_id: document.id,
                    page,
                    sequence,
                    text,
                    embedding,
                })
            })
            .collect();

        if segments.is_empty() {
            self.discard(document.id).await;
            return Err(ingestion_error(document.id, "no segment could be embedded".to_string()));
        }

        let expected = segments.len();
        if let Err(e) = self.store.insert_segments(document.id, segments).await {
            self.discard(document.id).await;
            return Err(ingestion_error(document.id, format!("storing segments failed: {e}")));
        }

        let stored = match self.store.segment_count(document.id).await {
            Ok(stored) => stored,
            Err(e) => {
                self.discard(document.id).await;
                return Err(ingestion_error(
                    document.id,
                    format!("counting stored segments failed: {e}"),
                ));
            }
        };
        if stored != expected {
            error!(document.id = %document.id, expected, stored, "segment count mismatch");
            self.discard(document.id).await;
            return Err(ingestion_error(
                document.id,
                format!("expected {expected} stored segments, found {stored}"),
            ));
        }

        info!(
            document.id = %document.id,
            filename = %document.meta.filename,
            segment_count = stored,
            skipped = skipped.len(),
            "ingested document"
        );

        Ok(IngestReport { document, segment_count: stored, skipped })
    }

    /// Retrieve the best `k` segments for a query, spread across sources.
    ///
    /// Candidates are ranked by cosine similarity and passed through
    /// diversity-aware top-k selection. Each hit carries a highlighted
    /// snippet, its citation label and a score rounded to four decimals.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for a blank query or `k == 0`,
    /// propagates embedding and store failures, and returns
    /// [`RagError::DimensionMismatch`] if no candidate could be ranked.
    pub async fn retrieve(&self, request: &SearchRequest) -> Result<Retrieval> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".into()));
        }
        let k = request.k.unwrap_or(self.config.top_k);
        if k == 0 {
            return Err(RagError::InvalidRequest("k must be greater than zero".into()));
        }

        let filter = SegmentFilter { document_id: request.document_id, limit: None }
            .with_limit(self.config.candidate_cap);
        let candidates = self.store.find_segments(filter).await?;
        if candidates.is_empty() {
            info!(document.id = ?request.document_id, "nothing indexed");
            return Ok(Retrieval::nothing_indexed());
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let ranking = rank_segments(&query_vector, &candidates)?;

        let diversity = self.config.diversity;
        let selected = select_top_k(&ranking.entries, k, |entry| {
            diversity.key_of(&candidates[entry.id])
        });

        let documents = self.documents_for(selected.iter().map(|e| &candidates[e.id])).await?;
        let hits: Vec<SearchHit> = selected
            .iter()
            .map(|entry| self.hit(&candidates[entry.id], entry.score, query, &documents))
            .collect();

        info!(
            candidates = candidates.len(),
            rejected = ranking.rejected.len(),
            result_count = hits.len(),
            "retrieval completed"
        );

        Ok(Retrieval { hits, rejected: ranking.rejected.len(), nothing_indexed: false })
    }

    /// Rank the whole corpus for `query` and return one page of hits.
    ///
    /// Unlike [`retrieve`](Self::retrieve) no diversity constraint applies.
    /// `page` is zero-based; a page past the end is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] for a blank query or `size == 0`
    /// and propagates embedding and store failures.
    pub async fn search_page(&self, query: &str, page: usize, size: usize) -> Result<SearchPage> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".into()));
        }
        if size == 0 {
            return Err(RagError::InvalidRequest("page size must be greater than zero".into()));
        }

        let filter = SegmentFilter::all().with_limit(self.config.candidate_cap);
        let candidates = self.store.find_segments(filter).await?;
        if candidates.is_empty() {
            return Ok(SearchPage { hits: Vec::new(), page, size, total: 0 });
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let ranking = rank_segments(&query_vector, &candidates)?;

        let window: Vec<_> =
            ranking.entries.iter().skip(page.saturating_mul(size)).take(size).collect();
        let documents = self.documents_for(window.iter().map(|e| &candidates[e.id])).await?;
        let hits = window
            .iter()
            .map(|entry| self.hit(&candidates[entry.id], entry.score, query, &documents))
            .collect();

        debug!(page, size, total = ranking.len(), "search page completed");

        Ok(SearchPage { hits, page, size, total: ranking.len() })
    }

    /// Answer a question from retrieved context.
    ///
    /// A generation failure does not discard the retrieval: the hits and the
    /// citations that were sent come back in [`AskOutcome::GenerationFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if no generation service was
    /// configured, and any error of [`retrieve`](Self::retrieve).
    pub async fn ask(&self, request: &SearchRequest) -> Result<AskOutcome> {
        let composer = self.composer.as_ref().ok_or_else(|| {
            RagError::InvalidConfig("a generation service is required to answer questions".into())
        })?;

        let retrieval = self.retrieve(request).await?;
        if retrieval.nothing_indexed {
            return Ok(AskOutcome::NothingIndexed);
        }

        let contexts: Vec<ContextItem> = retrieval
            .hits
            .iter()
            .map(|hit| ContextItem { text: hit.text.clone(), source: hit.citation.clone() })
            .collect();
        let citations = citations(&contexts);

        match composer.answer(request.query.trim(), &contexts).await {
            Ok(answer) => Ok(AskOutcome::Answered { answer, citations, hits: retrieval.hits }),
            Err(error) => {
                warn!(
                    error = %error,
                    hits = retrieval.hits.len(),
                    "returning retrieval without answer"
                );
                Ok(AskOutcome::GenerationFailed { error, citations, hits: retrieval.hits })
            }
        }
    }

    /// List stored documents, newest first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await
    }

    /// Delete a document and its segments. Returns whether it existed.
    pub async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let existed = self.store.delete_document(id).await?;
        info!(document.id = %id, existed, "deleted document");
        Ok(existed)
    }

    /// Preview the first segments of a document in sequence order.
    ///
    /// `limit` defaults to [`DEFAULT_PREVIEW_LIMIT`]. An unknown document has
    /// no segments.
    pub async fn document_segments(
        &self,
        id: DocumentId,
        limit: Option<usize>,
    ) -> Result<Vec<SegmentPreview>> {
        let filter = SegmentFilter::document(id).with_limit(limit.unwrap_or(DEFAULT_PREVIEW_LIMIT));
        let segments = self.store.find_segments(filter).await?;
        Ok(segments.iter().map(SegmentPreview::of).collect())
    }

    async fn discard(&self, id: DocumentId) {
        if let Err(e) = self.store.delete_document(id).await {
            error!(document.id = %id, error = %e, "failed to remove partly ingested document");
        }
    }

    async fn documents_for<'a>(
        &self,
        segments: impl Iterator<Item = &'a Segment>,
    ) -> Result<HashMap<DocumentId, Document>> {
        let mut documents = HashMap::new();
        for segment in segments {
            if documents.contains_key(&segment.document_id) {
                continue;
            }
            if let Some(document) = self.store.get_document(segment.document_id).await? {
                documents.insert(document.id, document);
            }
        }
        Ok(documents)
    }

    fn hit(
        &self,
        segment: &Segment,
        score: f32,
        query: &str,
        documents: &HashMap<DocumentId, Document>,
    ) -> SearchHit {
        let snippet = best_snippet_with_margin(
            &segment.text,
            query,
            self.config.snippet_window,
            self.config.snippet_margin,
        );
        SearchHit {
            document_id: segment.document_id,
            page: segment.page,
            sequence: segment.sequence,
            snippet_html: highlight(&snippet, query),
            citation: citation_label(
                documents.get(&segment.document_id),
                segment.document_id,
                segment.page,
            ),
            score: round_score(score),
            text: segment.text.clone(),
        }
    }
}

/// Rank `candidates` by position, failing only if every candidate was rejected.
fn rank_segments(query: &[f32], candidates: &[Segment]) -> Result<Ranking<usize>> {
    let ranking = rank(query, candidates.iter().enumerate().map(|(i, s)| (i, &s.embedding)));
    if ranking.is_empty() {
        if let Some(&first) = ranking.rejected.first() {
            error!(rejected = ranking.rejected.len(), "no candidate matches the query dimension");
            return Err(RagError::DimensionMismatch {
                expected: query.len(),
                actual: candidates[first].embedding.len(),
            });
        }
    }
    Ok(ranking)
}

fn ingestion_error(id: DocumentId, message: String) -> RagError {
    error!(document.id = %id, reason = %message, "ingestion failed");
    RagError::Ingestion { document_id: id.to_string(), message }
}

/// Builder for constructing a [`RetrievalPipeline`].
///
/// The embedding service and document store are required. The chunker is
/// derived from the config unless one is set explicitly, and the generation
/// service is only needed for [`RetrievalPipeline::ask`].
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RagConfig>,
    embedding_service: Option<Arc<dyn EmbeddingService>>,
    document_store: Option<Arc<dyn DocumentStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    generation_service: Option<Arc<dyn GenerationService>>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration. Defaults to [`RagConfig::default`].
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding service.
    pub fn embedding_service(mut self, service: Arc<dyn EmbeddingService>) -> Self {
        self.embedding_service = Some(service);
        self
    }

    /// Set the document store.
    pub fn document_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document_store = Some(store);
        self
    }

    /// Override the chunker derived from the config.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the generation service used by [`RetrievalPipeline::ask`].
    pub fn generation_service(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.generation_service = Some(service);
        self
    }

    /// Build the [`RetrievalPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a required field is missing or
    /// the config fails validation.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_service = self.embedding_service.ok_or_else(|| {
            RagError::InvalidConfig("embedding_service is required".to_string())
        })?;
        let store = self
            .document_store
            .ok_or_else(|| RagError::InvalidConfig("document_store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => {
                Arc::from(chunker_for(config.chunk_mode, config.chunk_size, config.chunk_overlap)?)
            }
        };

        Ok(RetrievalPipeline {
            embedder: EmbeddingClient::new(embedding_service, config.embed_concurrency)?,
            config,
            store,
            chunker,
            composer: self.generation_service.map(AnswerComposer::new),
        })
    }
}
