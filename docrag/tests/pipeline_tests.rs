//! End-to-end tests of ingestion and querying with stub services.

use std::sync::Arc;

use async_trait::async_trait;
use docrag::{
    AskOutcome, ChunkMode, Document, DocumentId, DocumentMeta, DocumentStore, EmbeddingService,
    GenerationService, InMemoryDocumentStore, IngestFailurePolicy, PromptPayload, RagConfig,
    RagError, Result, RetrievalPipeline, SearchRequest, Segment, SegmentFilter, SourceDocument,
};

/// Embeds text as keyword counts: money words, exchange words, and a bias.
///
/// Text containing `corrupt` gets a two-element vector and text containing
/// `poison` fails outright.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingService for KeywordEmbedder {
    fn name(&self) -> &str {
        "Keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        if text.contains("poison") {
            return Err(RagError::EmbeddingService {
                provider: "Keyword".into(),
                message: "upstream rejected input".into(),
            });
        }

        let count = |words: &[&str]| words.iter().filter(|w| text.contains(*w)).count() as f32;
        let money = count(&["refund", "money", "back"]);
        let exchange = count(&["exchange", "receipt", "swap"]);

        if text.contains("corrupt") {
            return Ok(vec![money, exchange]);
        }
        Ok(vec![money, exchange, 0.1])
    }
}

/// Reports the number of context items it was given.
struct CountingGenerator;

#[async_trait]
impl GenerationService for CountingGenerator {
    fn name(&self) -> &str {
        "Counting"
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String> {
        let items = prompt.user.matches("[#").count();
        Ok(format!("  Based on {items} sources [#1].\n"))
    }
}

struct UnavailableGenerator;

#[async_trait]
impl GenerationService for UnavailableGenerator {
    fn name(&self) -> &str {
        "Unavailable"
    }

    async fn generate(&self, _prompt: &PromptPayload) -> Result<String> {
        Err(RagError::GenerationService {
            provider: "Unavailable".into(),
            message: "503 Service Unavailable".into(),
        })
    }
}

/// Delegates to an in-memory store but cannot count segments.
struct UncountableStore {
    inner: Arc<InMemoryDocumentStore>,
}

#[async_trait]
impl DocumentStore for UncountableStore {
    async fn create_document(&self, meta: DocumentMeta) -> Result<Document> {
        self.inner.create_document(meta).await
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        self.inner.get_document(id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        self.inner.list_documents().await
    }

    async fn insert_segments(&self, id: DocumentId, segments: Vec<Segment>) -> Result<()> {
        self.inner.insert_segments(id, segments).await
    }

    async fn find_segments(&self, filter: SegmentFilter) -> Result<Vec<Segment>> {
        self.inner.find_segments(filter).await
    }

    async fn segment_count(&self, _id: DocumentId) -> Result<usize> {
        Err(RagError::DocumentStore { backend: "Uncountable".into(), message: "timeout".into() })
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        self.inner.delete_document(id).await
    }
}

fn policy_document() -> SourceDocument {
    SourceDocument {
        filename: "policy.pdf".into(),
        size_bytes: 2048,
        pages: vec!["Refunds happen within 5 days.".into(), "Exchanges require a receipt.".into()],
    }
}

fn pipeline_with(
    config: RagConfig,
    generator: Option<Arc<dyn GenerationService>>,
) -> (RetrievalPipeline, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let mut builder = RetrievalPipeline::builder()
        .config(config)
        .embedding_service(Arc::new(KeywordEmbedder))
        .document_store(store.clone());
    if let Some(generator) = generator {
        builder = builder.generation_service(generator);
    }
    (builder.build().unwrap(), store)
}

fn pipeline() -> RetrievalPipeline {
    pipeline_with(RagConfig::default(), Some(Arc::new(CountingGenerator))).0
}

#[tokio::test]
async fn refund_query_ranks_refund_page_first() {
    let pipeline = pipeline();
    let report = pipeline.ingest(policy_document()).await.unwrap();
    assert_eq!(report.segment_count, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(report.document.meta.title, "policy");
    assert_eq!(report.document.meta.page_count, 2);

    let retrieval = pipeline.retrieve(&SearchRequest::new("get money back")).await.unwrap();
    assert_eq!(retrieval.hits.len(), 2);
    assert_eq!(retrieval.hits[0].citation, "policy.pdf • p.1");
    assert!(retrieval.hits[0].score > retrieval.hits[1].score);

    let top = pipeline.retrieve(&SearchRequest::new("get money back").with_k(1)).await.unwrap();
    assert_eq!(top.hits.len(), 1);
    assert_eq!(top.hits[0].citation, "policy.pdf • p.1");
    assert_eq!(top.hits[0].page, 1);
}

#[tokio::test]
async fn one_wrong_length_vector_leaves_nine_results() {
    let pipeline = pipeline();
    let mut pages: Vec<String> = (0..10).map(|i| format!("Refund rule number {i}.")).collect();
    pages[4] = "Refund rule with a corrupt vector.".into();
    pipeline
        .ingest(SourceDocument { filename: "rules.pdf".into(), size_bytes: 10, pages })
        .await
        .unwrap();

    let retrieval =
        pipeline.retrieve(&SearchRequest::new("refund rule").with_k(10)).await.unwrap();
    assert_eq!(retrieval.hits.len(), 9);
    assert_eq!(retrieval.rejected, 1);
    assert!(retrieval.hits.iter().all(|hit| hit.page != 5));

    let page = pipeline.search_page("refund rule", 0, 20).await.unwrap();
    assert_eq!(page.total, 9);
    assert_eq!(page.hits.len(), 9);
}

#[tokio::test]
async fn every_candidate_rejected_is_a_dimension_mismatch() {
    let pipeline = pipeline();
    pipeline.ingest(SourceDocument::single_page("bad.txt", "corrupt refund")).await.unwrap();

    let err = pipeline.retrieve(&SearchRequest::new("refund")).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn hits_carry_highlighted_snippets_and_rounded_scores() {
    let pipeline = pipeline();
    pipeline
        .ingest(SourceDocument::single_page("faq.txt", "Ask for a <b>refund</b> & get money back."))
        .await
        .unwrap();

    let retrieval = pipeline.retrieve(&SearchRequest::new("Refund")).await.unwrap();
    let hit = &retrieval.hits[0];
    assert_eq!(
        hit.snippet_html,
        "Ask for a &lt;b&gt;<mark>refund</mark>&lt;/b&gt; &amp; get money back."
    );
    assert_eq!(hit.citation, "faq.txt • p.1");
    assert_eq!(hit.score, (hit.score * 10_000.0).round() / 10_000.0);
}

#[tokio::test]
async fn empty_corpus_is_not_an_error() {
    let pipeline = pipeline();

    let retrieval = pipeline.retrieve(&SearchRequest::new("anything")).await.unwrap();
    assert!(retrieval.nothing_indexed);
    assert!(retrieval.hits.is_empty());

    let outcome = pipeline.ask(&SearchRequest::new("anything")).await.unwrap();
    assert!(matches!(outcome, AskOutcome::NothingIndexed));
    assert_eq!(outcome.message(), Some(docrag::NOTHING_INDEXED_MESSAGE));

    let page = pipeline.search_page("anything", 0, 10).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn ask_returns_answer_with_numbered_citations() {
    let pipeline = pipeline();
    pipeline.ingest(policy_document()).await.unwrap();

    let outcome = pipeline.ask(&SearchRequest::new("get money back")).await.unwrap();
    match outcome {
        AskOutcome::Answered { answer, citations, hits } => {
            assert_eq!(answer, "Based on 2 sources [#1].");
            assert_eq!(citations.len(), 2);
            assert_eq!(citations[0].id, 1);
            assert_eq!(citations[0].source, "policy.pdf • p.1");
            assert_eq!(hits.len(), 2);
        }
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_generation_keeps_retrieval() {
    let (pipeline, _) =
        pipeline_with(RagConfig::default(), Some(Arc::new(UnavailableGenerator)));
    pipeline.ingest(policy_document()).await.unwrap();

    let outcome = pipeline.ask(&SearchRequest::new("get money back")).await.unwrap();
    assert!(outcome.message().is_none());
    match outcome {
        AskOutcome::GenerationFailed { error, citations, hits } => {
            assert!(matches!(error, RagError::GenerationService { .. }));
            assert_eq!(citations.len(), 2);
            assert_eq!(hits[0].citation, "policy.pdf • p.1");
        }
        other => panic!("expected a generation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn ask_without_generator_is_a_config_error() {
    let (pipeline, _) = pipeline_with(RagConfig::default(), None);
    pipeline.ingest(policy_document()).await.unwrap();

    let err = pipeline.ask(&SearchRequest::new("refund")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)));
}

#[tokio::test]
async fn blank_queries_and_zero_k_are_rejected() {
    let pipeline = pipeline();
    pipeline.ingest(policy_document()).await.unwrap();

    let blank = pipeline.retrieve(&SearchRequest::new("   ")).await.unwrap_err();
    assert!(matches!(blank, RagError::InvalidRequest(_)));
    let zero = pipeline.retrieve(&SearchRequest::new("refund").with_k(0)).await.unwrap_err();
    assert!(matches!(zero, RagError::InvalidRequest(_)));
    assert!(pipeline.search_page("refund", 0, 0).await.is_err());
}

#[tokio::test]
async fn abort_policy_removes_partial_document() {
    let (pipeline, store) = pipeline_with(RagConfig::default(), None);
    let source = SourceDocument {
        filename: "mixed.pdf".into(),
        size_bytes: 3,
        pages: vec!["refund".into(), "poison pill".into(), "exchange".into()],
    };

    let err = pipeline.ingest(source).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion { .. }));
    assert!(store.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn skip_policy_stores_the_rest() {
    let config = RagConfig::builder()
        .ingest_failure_policy(IngestFailurePolicy::SkipSegment)
        .build()
        .unwrap();
    let (pipeline, _) = pipeline_with(config, None);
    let source = SourceDocument {
        filename: "mixed.pdf".into(),
        size_bytes: 3,
        pages: vec!["refund".into(), "poison pill".into(), "exchange".into()],
    };

    let report = pipeline.ingest(source).await.unwrap();
    assert_eq!(report.segment_count, 2);
    assert_eq!(report.skipped, vec![1]);

    let previews = pipeline.document_segments(report.document.id, None).await.unwrap();
    let sequences: Vec<usize> = previews.iter().map(|p| p.sequence).collect();
    assert_eq!(sequences, vec![0, 2]);
}

#[tokio::test]
async fn skip_policy_still_fails_when_nothing_embeds() {
    let config = RagConfig::builder()
        .ingest_failure_policy(IngestFailurePolicy::SkipSegment)
        .build()
        .unwrap();
    let (pipeline, store) = pipeline_with(config, None);

    let err =
        pipeline.ingest(SourceDocument::single_page("p.txt", "poison")).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion { .. }));
    assert!(store.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn diversity_spreads_results_across_pages() {
    let config = RagConfig::builder().chunk_size(40).chunk_overlap(0).build().unwrap();
    let (pipeline, _) = pipeline_with(config, None);
    let long_refund_page = "refund money back. ".repeat(6);
    pipeline
        .ingest(SourceDocument {
            filename: "guide.pdf".into(),
            size_bytes: 1,
            pages: vec![long_refund_page, "refund only.".into()],
        })
        .await
        .unwrap();

    let retrieval = pipeline.retrieve(&SearchRequest::new("money back").with_k(2)).await.unwrap();
    let pages: Vec<usize> = retrieval.hits.iter().map(|hit| hit.page).collect();
    assert_eq!(pages, vec![1, 2]);
}

#[tokio::test]
async fn scoped_search_and_delete() {
    let pipeline = pipeline();
    let policy = pipeline.ingest(policy_document()).await.unwrap();
    let other = pipeline
        .ingest(SourceDocument::single_page("other.md", "# Money\nGet your money back."))
        .await
        .unwrap();

    let listed = pipeline.list_documents().await.unwrap();
    assert_eq!(listed[0].id, other.document.id);
    assert_eq!(listed[1].id, policy.document.id);

    let scoped = pipeline
        .retrieve(&SearchRequest::new("money back").in_document(policy.document.id))
        .await
        .unwrap();
    assert!(scoped.hits.iter().all(|hit| hit.document_id == policy.document.id));

    assert!(pipeline.delete_document(policy.document.id).await.unwrap());
    let after = pipeline
        .retrieve(&SearchRequest::new("money back").in_document(policy.document.id))
        .await
        .unwrap();
    assert!(after.nothing_indexed);
}

#[tokio::test]
async fn segment_previews_are_truncated() {
    let config = RagConfig::builder().chunk_size(300).chunk_overlap(0).build().unwrap();
    let (pipeline, _) = pipeline_with(config, None);
    let report = pipeline
        .ingest(SourceDocument::single_page("long.txt", "r".repeat(450)))
        .await
        .unwrap();

    let previews = pipeline.document_segments(report.document.id, Some(1)).await.unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].text.chars().count(), 201);
    assert!(previews[0].text.ends_with('…'));

    let all = pipeline.document_segments(report.document.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all[1].text.ends_with('…'));
}

#[tokio::test]
async fn failed_segment_count_removes_partial_document() {
    let inner = Arc::new(InMemoryDocumentStore::new());
    let pipeline = RetrievalPipeline::builder()
        .embedding_service(Arc::new(KeywordEmbedder))
        .document_store(Arc::new(UncountableStore { inner: inner.clone() }))
        .build()
        .unwrap();

    let err =
        pipeline.ingest(SourceDocument::single_page("r.txt", "refund text")).await.unwrap_err();
    assert!(matches!(err, RagError::Ingestion { .. }));
    assert!(inner.list_documents().await.unwrap().is_empty());
    assert!(inner.find_segments(SegmentFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn paragraph_mode_splits_markdown_at_headings() {
    let config = RagConfig::builder()
        .chunk_mode(ChunkMode::ParagraphAware)
        .chunk_size(60)
        .chunk_overlap(0)
        .build()
        .unwrap();
    let (pipeline, _) = pipeline_with(config, None);
    let notes =
        "## Refunds\nRefunds take 5 days.\n\n\n\n## Exchanges\nExchanges need a **receipt**.";
    let report = pipeline.ingest(SourceDocument::single_page("notes.md", notes)).await.unwrap();
    assert_eq!(report.segment_count, 2);

    let previews = pipeline.document_segments(report.document.id, None).await.unwrap();
    let texts: Vec<&str> = previews.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["# Refunds\nRefunds take 5 days.", "# Exchanges\nExchanges need a receipt."]
    );
    assert!(previews.iter().all(|p| p.page == 1));

    let retrieval =
        pipeline.retrieve(&SearchRequest::new("receipt exchange").with_k(1)).await.unwrap();
    assert_eq!(retrieval.hits[0].sequence, 1);
    assert_eq!(retrieval.hits[0].citation, "notes.md • p.1");
}
