//! Configuration for the retrieval pipeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkMode;
use crate::error::{RagError, Result};
use crate::select::DiversityKey;

/// What ingestion does when a single segment cannot be embedded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IngestFailurePolicy {
    /// Remove the partly ingested document and fail the whole ingestion.
    #[default]
    Abort,
    /// Store every segment that embedded cleanly and report the rest.
    SkipSegment,
}

impl FromStr for IngestFailurePolicy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip-segment" | "skip" => Ok(Self::SkipSegment),
            other => Err(RagError::InvalidConfig(format!("unknown ingest failure policy '{other}'"))),
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive fixed windows.
    pub chunk_overlap: usize,
    /// Which chunking policy splits page text.
    pub chunk_mode: ChunkMode,
    /// Number of results selected per query.
    pub top_k: usize,
    /// Maximum number of embedding calls in flight per batch.
    pub embed_concurrency: usize,
    /// Snippet window size in characters.
    pub snippet_window: usize,
    /// Characters of context kept on each side of the best snippet window.
    pub snippet_margin: usize,
    /// Identity used to keep selected results from the same source apart.
    pub diversity: DiversityKey,
    /// Maximum number of stored segments scanned per query.
    pub candidate_cap: usize,
    /// Behaviour when a segment fails to embed during ingestion.
    pub ingest_failure_policy: IngestFailurePolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 150,
            chunk_mode: ChunkMode::FixedWindow,
            top_k: 6,
            embed_concurrency: 16,
            snippet_window: 360,
            snippet_margin: 40,
            diversity: DiversityKey::DocumentPage,
            candidate_cap: 20_000,
            ingest_failure_policy: IngestFailurePolicy::Abort,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from the process environment, falling back to
    /// defaults for unset variables.
    ///
    /// Recognised variables: `CHUNK_CHARS`, `CHUNK_OVERLAP`, `CHUNK_MODE`,
    /// `RAG_TOP_K`, `EMBED_CONCURRENCY`, `SNIPPET_WINDOW`, `RAG_CANDIDATE_CAP`,
    /// `RAG_DIVERSITY`, `INGEST_FAILURE_POLICY`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if a variable cannot be parsed or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                    RagError::InvalidConfig(format!("{name} has an invalid value '{raw}'"))
                }),
            }
        }

        let mut builder = Self::builder();
        if let Some(v) = parse(&lookup, "CHUNK_CHARS")? {
            builder = builder.chunk_size(v);
        }
        if let Some(v) = parse(&lookup, "CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(v);
        }
        if let Some(v) = parse(&lookup, "CHUNK_MODE")? {
            builder = builder.chunk_mode(v);
        }
        if let Some(v) = parse(&lookup, "RAG_TOP_K")? {
            builder = builder.top_k(v);
        }
        if let Some(v) = parse(&lookup, "EMBED_CONCURRENCY")? {
            builder = builder.embed_concurrency(v);
        }
        if let Some(v) = parse(&lookup, "SNIPPET_WINDOW")? {
            builder = builder.snippet_window(v);
        }
        if let Some(v) = parse(&lookup, "RAG_CANDIDATE_CAP")? {
            builder = builder.candidate_cap(v);
        }
        if let Some(v) = parse(&lookup, "RAG_DIVERSITY")? {
            builder = builder.diversity(v);
        }
        if let Some(v) = parse(&lookup, "INGEST_FAILURE_POLICY")? {
            builder = builder.ingest_failure_policy(v);
        }
        builder.build()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `embed_concurrency`, `snippet_window` or `candidate_cap` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be greater than zero".into()));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::InvalidConfig(
                "embed_concurrency must be greater than zero".into(),
            ));
        }
        if self.snippet_window == 0 {
            return Err(RagError::InvalidConfig("snippet_window must be greater than zero".into()));
        }
        if self.candidate_cap == 0 {
            return Err(RagError::InvalidConfig("candidate_cap must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive fixed windows in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the chunking policy.
    pub fn chunk_mode(mut self, mode: ChunkMode) -> Self {
        self.config.chunk_mode = mode;
        self
    }

    /// Set the number of results selected per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of concurrent embedding calls per batch.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Set the snippet window size in characters.
    pub fn snippet_window(mut self, window: usize) -> Self {
        self.config.snippet_window = window;
        self
    }

    /// Set the context margin kept around the best snippet window.
    pub fn snippet_margin(mut self, margin: usize) -> Self {
        self.config.snippet_margin = margin;
        self
    }

    /// Set the diversity key used by top-k selection.
    pub fn diversity(mut self, key: DiversityKey) -> Self {
        self.config.diversity = key;
        self
    }

    /// Set the maximum number of stored segments scanned per query.
    pub fn candidate_cap(mut self, cap: usize) -> Self {
        self.config.candidate_cap = cap;
        self
    }

    /// Set the per-segment embedding failure policy.
    pub fn ingest_failure_policy(mut self, policy: IngestFailurePolicy) -> Self {
        self.config.ingest_failure_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
