//! # docrag
//!
//! Embedding-based document retrieval with cited answers.
//!
//! Documents are split into segments, each segment is embedded through an
//! [`EmbeddingService`], and queries are answered by ranking stored segments
//! by cosine similarity, picking a diverse top-k, and extracting highlighted
//! snippets. In RAG mode the selected segments become numbered context for a
//! [`GenerationService`] that composes a cited answer.
//!
//! ## Components
//!
//! - [`Chunker`]: splits page text into bounded segments ([`FixedWindowChunker`],
//!   [`ParagraphChunker`])
//! - [`EmbeddingClient`]: embeds many texts with bounded concurrency
//! - [`rank`]: cosine similarity ranking that survives bad vectors
//! - [`select_top_k`]: diversity-aware top-k selection
//! - [`best_snippet`] / [`highlight`]: query-time excerpts with HTML-safe marks
//! - [`AnswerComposer`]: prompt assembly and answer generation
//! - [`DocumentStore`]: persistence for documents and segments
//! - [`RetrievalPipeline`]: orchestrates ingestion and queries
//!
//! ## Features
//!
//! - `gemini`: Google Gemini embedding and generation services
//! - `openai`: OpenAI embedding and generation services
//! - `full`: both providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag::*;
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_service(Arc::new(my_embedder))
//!     .document_store(Arc::new(InMemoryDocumentStore::new()))
//!     .build()?;
//!
//! pipeline.ingest(SourceDocument::single_page("notes.md", text)).await?;
//! let retrieval = pipeline.retrieve(&SearchRequest::new("refund policy")).await?;
//! ```

pub mod chunking;
pub mod compose;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod pipeline;
pub mod select;
pub mod similarity;
pub mod snippet;
pub mod store;
pub mod text;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{ChunkMode, Chunker, FixedWindowChunker, ParagraphChunker, chunk_text};
pub use compose::{
    AnswerComposer, ContextItem, DECLINE_MESSAGE, GenerationService, PromptPayload, compose,
};
pub use config::{IngestFailurePolicy, RagConfig, RagConfigBuilder};
pub use document::{
    Citation, Document, DocumentId, DocumentMeta, SearchHit, Segment, SourceDocument,
};
pub use embedding::{EmbeddingClient, EmbeddingService, parse_embedding};
pub use error::{RagError, Result};
pub use eval::{Relevance, mean_reciprocal_rank, precision_at_k, reciprocal_rank};
pub use pipeline::{
    AskOutcome, IngestReport, NOTHING_INDEXED_MESSAGE, Retrieval, RetrievalPipeline,
    RetrievalPipelineBuilder, SearchPage, SearchRequest, SegmentPreview,
};
pub use select::{DiversityKey, select_top_k};
pub use similarity::{Ranking, Scored, cosine_similarity, rank};
pub use snippet::{best_snippet, escape_html, highlight};
pub use store::{DocumentStore, InMemoryDocumentStore, SegmentFilter};
