//! # Semantic Search Example
//!
//! Ingests a markdown note and a two-page "PDF", then runs paginated semantic
//! search and diversity-aware retrieval over them.
//!
//! Uses `InMemoryDocumentStore` and a deterministic `HashingEmbedder`, so it
//! runs with **zero API keys**.
//!
//! Run: `cargo run --example semantic_search`

use std::sync::Arc;

use docrag::{
    ChunkMode, EmbeddingService, InMemoryDocumentStore, RagConfig, Relevance, RetrievalPipeline,
    SearchRequest, SourceDocument, mean_reciprocal_rank, precision_at_k,
};

// ---------------------------------------------------------------------------
// HashingEmbedder: bag-of-words feature hashing for demos
// ---------------------------------------------------------------------------

struct HashingEmbedder {
    dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingService for HashingEmbedder {
    fn name(&self) -> &str {
        "Hashing"
    }

    async fn embed(&self, text: &str) -> docrag::Result<Vec<f32>> {
        // Every lowercase word bumps one bucket, so texts sharing words point
        // in similar directions.
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        // Keep empty texts off the zero vector.
        emb[0] += 0.01;
        Ok(emb)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // -- 1. Configure the pipeline ----------------------------------------
    // Paragraph-aware chunking keeps markdown sections together; 400 chars
    // is small enough that the demo produces several segments.
    let config = RagConfig::builder()
        .chunk_mode(ChunkMode::ParagraphAware)
        .chunk_size(400)
        .chunk_overlap(0)
        .top_k(3)
        .build()?;

    let pipeline = RetrievalPipeline::builder()
        .config(config)
        .embedding_service(Arc::new(HashingEmbedder { dimensions: 256 }))
        .document_store(Arc::new(InMemoryDocumentStore::new()))
        .build()?;

    // -- 2. Ingest ---------------------------------------------------------
    let notes = "# Shipping\n\
                 Orders ship within **two business days**. Tracking numbers are \
                 emailed once the parcel leaves the warehouse.\n\n\
                 # Returns\n\
                 Unused items can be returned within 30 days. See [the returns page](https://example.com) \
                 to print a label.\n\n\
                 # Warranty\n\
                 Electronics carry a one year warranty covering manufacturing defects.";
    let manual = SourceDocument {
        filename: "store-handbook.pdf".into(),
        size_bytes: 48_213,
        pages: vec![
            "Refunds are issued to the original payment method within five days of \
             receiving the returned item."
                .into(),
            "Exchanges for a different size are free. Bring the receipt to any store."
                .into(),
        ],
    };

    for source in [SourceDocument::single_page("faq.md", notes), manual] {
        let report = pipeline.ingest(source).await?;
        println!(
            "Ingested {} → {} segment(s) across {} page(s)",
            report.document.meta.filename, report.segment_count, report.document.meta.page_count
        );
    }

    // -- 3. Paginated semantic search -------------------------------------
    let query = "returned item refund";
    let page = pipeline.search_page(query, 0, 5).await?;
    println!("\nSearch \"{query}\" ({} ranked):", page.total);
    for hit in &page.hits {
        println!("  [score={:.4}] {} | {}", hit.score, hit.citation, hit.snippet_html);
    }

    // -- 4. Diverse top-k retrieval ---------------------------------------
    let retrieval = pipeline.retrieve(&SearchRequest::new("warranty on electronics")).await?;
    println!("\nRetrieve \"warranty on electronics\":");
    for (i, hit) in retrieval.hits.iter().enumerate() {
        println!("  {}. [score={:.4}] {}", i + 1, hit.score, hit.citation);
    }

    // -- 5. Score the search with manual labels ---------------------------
    // Pretend a reviewer marked each hit of the first search.
    let labels: Vec<Relevance> = page
        .hits
        .iter()
        .map(|hit| {
            if hit.citation.starts_with("store-handbook.pdf • p.1") {
                Relevance::Relevant
            } else {
                Relevance::Irrelevant
            }
        })
        .collect();
    println!(
        "\nPrecision@{}: {:.2}  MRR: {:.2}",
        page.size,
        precision_at_k(&labels, page.size),
        mean_reciprocal_rank(&[labels.as_slice()])
    );

    // -- 6. Inspect stored segments ----------------------------------------
    for document in pipeline.list_documents().await? {
        println!("\n{} ({}):", document.meta.title, document.id);
        for preview in pipeline.document_segments(document.id, Some(3)).await? {
            println!("  p.{} #{}: {}", preview.page, preview.sequence, preview.text);
        }
    }

    Ok(())
}
