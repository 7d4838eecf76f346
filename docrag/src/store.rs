//! Document store trait and an in-memory implementation.
//!
//! The store owns document records and their segments. Deleting a document
//! removes every segment it owns.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{Document, DocumentId, DocumentMeta, Segment};
use crate::error::{RagError, Result};

/// Restricts which segments [`DocumentStore::find_segments`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentFilter {
    /// Only segments of this document.
    pub document_id: Option<DocumentId>,
    /// At most this many segments.
    pub limit: Option<usize>,
}

impl SegmentFilter {
    /// Every segment in the store.
    pub fn all() -> Self {
        Self::default()
    }

    /// Segments of a single document.
    pub fn document(id: DocumentId) -> Self {
        Self { document_id: Some(id), limit: None }
    }

    /// Cap the number of returned segments.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence for documents and their embedded segments.
///
/// Writes are expected to be atomic per call. No cross-document transaction
/// is required; callers detect partial ingestion through
/// [`segment_count`](DocumentStore::segment_count).
///
/// # Example
///
/// ```rust,ignore
/// use docrag::{DocumentStore, InMemoryDocumentStore, SegmentFilter};
///
/// let store = InMemoryDocumentStore::new();
/// let doc = store.create_document(meta).await?;
/// store.insert_segments(doc.id, segments).await?;
/// let found = store.find_segments(SegmentFilter::document(doc.id)).await?;
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document record and return it with its assigned id.
    async fn create_document(&self, meta: DocumentMeta) -> Result<Document>;

    /// Fetch a document record.
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;

    /// List documents, newest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Append segments to an existing document.
    async fn insert_segments(&self, id: DocumentId, segments: Vec<Segment>) -> Result<()>;

    /// Return segments matching `filter`, ordered by document then sequence.
    async fn find_segments(&self, filter: SegmentFilter) -> Result<Vec<Segment>>;

    /// Number of segments stored for a document.
    async fn segment_count(&self, id: DocumentId) -> Result<usize>;

    /// Delete a document and all of its segments. Returns whether it existed.
    async fn delete_document(&self, id: DocumentId) -> Result<bool>;
}

#[derive(Debug)]
struct StoredDocument {
    document: Document,
    /// Insertion counter, used to order documents created in the same instant.
    order: u64,
    segments: Vec<Segment>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DocumentId, StoredDocument>,
    next_order: u64,
}

/// An in-memory [`DocumentStore`] for development, tests, and small corpora.
///
/// All operations are async-safe via `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: DocumentId) -> RagError {
    RagError::DocumentStore {
        backend: "InMemory".to_string(),
        message: format!("document '{id}' does not exist"),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_document(&self, meta: DocumentMeta) -> Result<Document> {
        let mut inner = self.inner.write().await;
        let document = Document { id: Uuid::new_v4(), meta, created_at: Utc::now() };
        let order = inner.next_order;
        inner.next_order += 1;
        inner.documents.insert(
            document.id,
            StoredDocument { document: document.clone(), order, segments: Vec::new() },
        );
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.documents.get(&id).map(|stored| stored.document.clone()))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut stored: Vec<&StoredDocument> = inner.documents.values().collect();
        stored.sort_by(|a, b| b.order.cmp(&a.order));
        Ok(stored.into_iter().map(|s| s.document.clone()).collect())
    }

    async fn insert_segments(&self, id: DocumentId, segments: Vec<Segment>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner.documents.get_mut(&id).ok_or_else(|| missing(id))?;
        if let Some(stray) = segments.iter().find(|s| s.document_id != id) {
            return Err(RagError::DocumentStore {
                backend: "InMemory".to_string(),
                message: format!(
                    "segment {} belongs to '{}', not '{id}'",
                    stray.sequence, stray.document_id
                ),
            });
        }
        stored.segments.extend(segments);
        stored.segments.sort_by_key(|s| s.sequence);
        Ok(())
    }

    async fn find_segments(&self, filter: SegmentFilter) -> Result<Vec<Segment>> {
        let inner = self.inner.read().await;
        let mut stored: Vec<&StoredDocument> = match filter.document_id {
            Some(id) => inner.documents.get(&id).into_iter().collect(),
            None => inner.documents.values().collect(),
        };
        stored.sort_by_key(|s| s.order);

        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(stored.into_iter().flat_map(|s| s.segments.iter()).take(limit).cloned().collect())
    }

    async fn segment_count(&self, id: DocumentId) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.documents.get(&id).map(|s| s.segments.len()).ok_or_else(|| missing(id))
    }

    async fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.documents.remove(&id).is_some())
    }
}
