//! Data types for documents, segments, and retrieval results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to a document by the [`DocumentStore`](crate::store::DocumentStore).
pub type DocumentId = Uuid;

/// Descriptive metadata recorded when a document is ingested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Display title, usually the filename without its extension.
    pub title: String,
    /// The uploaded filename.
    pub filename: String,
    /// Number of pages (or sections) in the source.
    pub page_count: usize,
    /// Size of the uploaded file in bytes.
    pub size_bytes: u64,
}

/// A stored document. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: DocumentId,
    /// Metadata captured at ingestion.
    #[serde(flatten)]
    pub meta: DocumentMeta,
    /// When the document record was created.
    pub created_at: DateTime<Utc>,
}

/// Raw input to ingestion: one text per page, in page order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    /// The uploaded filename.
    pub filename: String,
    /// Size of the uploaded file in bytes.
    pub size_bytes: u64,
    /// Extracted text of each page. Plain-text sources have a single page.
    pub pages: Vec<String>,
}

impl SourceDocument {
    /// A single-page source, as produced for plain text and markdown uploads.
    pub fn single_page(filename: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self { filename: filename.into(), size_bytes: text.len() as u64, pages: vec![text] }
    }
}

/// A bounded slice of a document's text together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    /// The owning document.
    pub document_id: DocumentId,
    /// 1-based page (or section) the text came from.
    pub page: usize,
    /// Position within the document, monotonic in original text order.
    pub sequence: usize,
    /// The segment text.
    pub text: String,
    /// The vector embedding of `text`.
    pub embedding: Vec<f32>,
}

/// A numbered source reference used in composed answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    /// 1-based position, matching the `[#n]` markers in the answer.
    pub id: usize,
    /// Human readable source, e.g. `manual.pdf • p.3`.
    pub source: String,
}

/// One retrieved segment prepared for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// The owning document.
    pub document_id: DocumentId,
    /// 1-based page of the segment.
    pub page: usize,
    /// Sequence index of the segment within its document.
    pub sequence: usize,
    /// Best matching excerpt, HTML escaped with `<mark>` highlights.
    pub snippet_html: String,
    /// Citation label of the segment's source.
    pub citation: String,
    /// Cosine similarity rounded to four decimals.
    pub score: f32,
    /// Full segment text, used as answer context.
    #[serde(skip)]
    pub text: String,
}

/// Build the citation label for a segment on `page` of `document`.
///
/// Falls back to the raw document id when the document record is unavailable.
pub fn citation_label(document: Option<&Document>, document_id: DocumentId, page: usize) -> String {
    match document {
        Some(doc) => format!("{} • p.{page}", doc.meta.filename),
        None => format!("doc:{document_id} • p.{page}"),
    }
}

/// Round a similarity score to four decimal places for presentation.
pub fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_uses_filename_when_known() {
        let doc = Document {
            id: Uuid::new_v4(),
            meta: DocumentMeta {
                title: "handbook".into(),
                filename: "handbook.pdf".into(),
                page_count: 4,
                size_bytes: 1024,
            },
            created_at: Utc::now(),
        };
        assert_eq!(citation_label(Some(&doc), doc.id, 3), "handbook.pdf • p.3");

        let id = Uuid::nil();
        assert_eq!(
            citation_label(None, id, 1),
            "doc:00000000-0000-0000-0000-000000000000 • p.1"
        );
    }

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(0.123_456), 0.1235);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn document_serializes_flat() {
        let doc = Document {
            id: Uuid::nil(),
            meta: DocumentMeta {
                title: "t".into(),
                filename: "t.md".into(),
                page_count: 1,
                size_bytes: 2,
            },
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["filename"], "t.md");
        assert_eq!(json["page_count"], 1);
    }
}
