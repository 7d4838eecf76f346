//! # PDF Question Answering Example
//!
//! Ingests page texts extracted from a PDF, then asks questions whose answers
//! cite the pages they came from.
//!
//! Without the `gemini` feature the example uses a keyword embedder and an
//! extractive answerer, so it runs with **zero API keys**. With the feature
//! enabled and `GOOGLE_API_KEY` set, Gemini embeds and answers instead.
//!
//! Run: `cargo run --example pdf_qa`
//! Or:  `GOOGLE_API_KEY=... cargo run --example pdf_qa --features gemini`

use std::sync::Arc;

use docrag::{
    AskOutcome, EmbeddingService, GenerationService, InMemoryDocumentStore, PromptPayload,
    RagConfig, RetrievalPipeline, SearchRequest, SourceDocument,
};
use tracing::info;

// ---------------------------------------------------------------------------
// Offline services
// ---------------------------------------------------------------------------

/// One dimension per vocabulary word, plus a constant bias.
struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

#[async_trait::async_trait]
impl EmbeddingService for KeywordEmbedder {
    fn name(&self) -> &str {
        "Keyword"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        let text = text.to_lowercase();
        let mut emb: Vec<f32> =
            self.vocabulary.iter().map(|w| text.matches(w).count() as f32).collect();
        emb.push(0.05);
        Ok(emb)
    }
}

/// Answers with the first context line, cited as `[#1]`.
struct ExtractiveAnswerer;

#[async_trait::async_trait]
impl GenerationService for ExtractiveAnswerer {
    fn name(&self) -> &str {
        "Extractive"
    }

    async fn generate(&self, prompt: &PromptPayload) -> docrag::Result<String> {
        // Context items look like "[#1] (source)\ntext".
        let first = prompt
            .user
            .split("[#1] (")
            .nth(1)
            .and_then(|rest| rest.lines().nth(1))
            .unwrap_or(docrag::DECLINE_MESSAGE);
        Ok(format!("{first} [#1]"))
    }
}

type Services = (Arc<dyn EmbeddingService>, Arc<dyn GenerationService>);

fn offline_services() -> Services {
    let vocabulary = vec!["refund", "days", "exchange", "receipt", "warranty", "battery", "year"];
    (Arc::new(KeywordEmbedder { vocabulary }), Arc::new(ExtractiveAnswerer))
}

#[cfg(feature = "gemini")]
fn services() -> Services {
    use docrag::gemini::{GeminiEmbeddingService, GeminiGenerationService};

    match (GeminiEmbeddingService::from_env(), GeminiGenerationService::from_env()) {
        (Ok(embedder), Ok(generator)) => {
            info!("using Gemini services");
            (Arc::new(embedder), Arc::new(generator))
        }
        _ => {
            info!("GOOGLE_API_KEY not set, using offline services");
            offline_services()
        }
    }
}

#[cfg(not(feature = "gemini"))]
fn services() -> Services {
    info!("using offline services");
    offline_services()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let (embedder, generator) = services();
    let pipeline = RetrievalPipeline::builder()
        .config(RagConfig::from_env()?)
        .embedding_service(embedder)
        .document_store(Arc::new(InMemoryDocumentStore::new()))
        .generation_service(generator)
        .build()?;

    // Asking before ingesting yields the nothing-indexed notice, not an error.
    let early = pipeline.ask(&SearchRequest::new("How long do refunds take?")).await?;
    println!("Before ingest: {}", early.message().unwrap_or_default());

    // Page texts as a PDF extractor would return them.
    let report = pipeline
        .ingest(SourceDocument {
            filename: "customer-policy.pdf".into(),
            size_bytes: 120_448,
            pages: vec![
                "Refund policy\n\nRefunds are processed within 5 days after we receive \
                 the returned item."
                    .into(),
                "Exchange policy\n\nExchanges require a receipt and must happen within \
                 30 days of purchase."
                    .into(),
                "Warranty\n\nAll devices carry a one year warranty. Battery wear is not \
                 covered."
                    .into(),
            ],
        })
        .await?;
    println!(
        "Ingested {} ({} pages, {} segments)\n",
        report.document.meta.filename, report.document.meta.page_count, report.segment_count
    );

    let questions = ["How many days until I get a refund?", "Is the battery under warranty?"];
    for question in questions {
        println!("Q: {question}");
        match pipeline.ask(&SearchRequest::new(question).with_k(2)).await? {
            AskOutcome::Answered { answer, citations, .. } => {
                println!("A: {answer}");
                for citation in citations {
                    println!("   [#{}] {}", citation.id, citation.source);
                }
            }
            AskOutcome::GenerationFailed { error, hits, .. } => {
                println!("Answer unavailable ({error}); closest passages:");
                for hit in hits {
                    println!("   {} | {}", hit.citation, hit.snippet_html);
                }
            }
            AskOutcome::NothingIndexed => println!("A: {}", docrag::NOTHING_INDEXED_MESSAGE),
        }
        println!();
    }

    Ok(())
}
