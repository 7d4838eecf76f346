//! Embedding service trait and the batching client built on it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{RagError, Result};

/// An external service that turns text into a vector embedding.
///
/// Implementations wrap specific backends (Gemini, OpenAI, test stubs)
/// behind a unified async interface. They must report upstream failures as
/// [`RagError::EmbeddingService`] and never substitute a placeholder vector.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::EmbeddingService;
///
/// let service = MyEmbeddingService::new();
/// let embedding = service.embed("hello world").await?;
/// ```
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reject vectors that are empty or contain non-finite elements.
///
/// `index` is the position of the input within the caller's request.
pub fn validate_embedding(index: usize, vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(RagError::MalformedEmbedding { index, reason: "vector is empty".into() });
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(RagError::MalformedEmbedding {
            index,
            reason: format!("element {pos} is not a finite number"),
        });
    }
    Ok(vector)
}

/// Convert a JSON value returned by an embedding API into a vector.
///
/// A missing or null value, a non-array value, and any non-numeric element
/// are all [`RagError::MalformedEmbedding`].
pub fn parse_embedding(index: usize, value: Option<&Value>) -> Result<Vec<f32>> {
    let items = match value {
        None | Some(Value::Null) => {
            return Err(RagError::MalformedEmbedding {
                index,
                reason: "vector is missing".into(),
            });
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(RagError::MalformedEmbedding {
                index,
                reason: format!("expected an array, got {other}"),
            });
        }
    };

    let mut vector = Vec::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        let x = item.as_f64().ok_or_else(|| RagError::MalformedEmbedding {
            index,
            reason: format!("element {pos} is not numeric"),
        })?;
        vector.push(x as f32);
    }
    validate_embedding(index, vector)
}

/// Embeds texts through an [`EmbeddingService`] with bounded concurrency.
///
/// Inputs are split into batches of at most `concurrency` texts. The calls of
/// one batch run concurrently; the next batch starts only after the current
/// one has completed. Output order always matches input order.
#[derive(Clone)]
pub struct EmbeddingClient {
    service: Arc<dyn EmbeddingService>,
    concurrency: usize,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("service", &self.service.name())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl EmbeddingClient {
    /// Create a client dispatching at most `concurrency` calls at a time.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `concurrency == 0`.
    pub fn new(service: Arc<dyn EmbeddingService>, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(RagError::InvalidConfig(
                "embedding concurrency must be greater than zero".into(),
            ));
        }
        Ok(Self { service, concurrency })
    }

    /// Return the underlying service.
    pub fn service(&self) -> &Arc<dyn EmbeddingService> {
        &self.service
    }

    async fn embed_at(&self, index: usize, text: &str) -> Result<Vec<f32>> {
        let vector = self.service.embed(text).await?;
        validate_embedding(index, vector)
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::EmbeddingService`] and returns
    /// [`RagError::MalformedEmbedding`] for unusable vectors.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_at(0, text).await.inspect_err(|e| {
            error!(provider = self.service.name(), error = %e, "embedding failed");
        })
    }

    /// Embed every text, failing as a whole on the first failed item.
    ///
    /// Batches after the one containing the failure are not dispatched.
    ///
    /// # Errors
    ///
    /// Returns the error of the lowest-indexed failed item.
    pub async fn embed_many<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(self.concurrency).enumerate() {
            let offset = batch_no * self.concurrency;
            debug!(
                provider = self.service.name(),
                batch = batch_no,
                batch_size = batch.len(),
                "embedding batch"
            );

            let outcomes = join_all(
                batch.iter().enumerate().map(|(i, text)| self.embed_at(offset + i, text.as_ref())),
            )
            .await;

            for (i, outcome) in outcomes.into_iter().enumerate() {
                match outcome {
                    Ok(vector) => vectors.push(vector),
                    Err(e) => {
                        error!(
                            provider = self.service.name(),
                            index = offset + i,
                            error = %e,
                            "embedding failed, aborting batch"
                        );
                        return Err(e);
                    }
                }
            }
        }
        Ok(vectors)
    }

    /// Embed every text and report each item's outcome separately.
    ///
    /// A failed item never disturbs the position of the others: entry `i`
    /// of the result always belongs to `texts[i]`.
    pub async fn embed_many_outcomes<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Result<Vec<f32>>> {
        let mut outcomes = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(self.concurrency).enumerate() {
            let offset = batch_no * self.concurrency;
            debug!(
                provider = self.service.name(),
                batch = batch_no,
                batch_size = batch.len(),
                "embedding batch"
            );

            let results = join_all(
                batch.iter().enumerate().map(|(i, text)| self.embed_at(offset + i, text.as_ref())),
            )
            .await;

            for (i, result) in results.iter().enumerate() {
                if let Err(e) = result {
                    warn!(
                        provider = self.service.name(),
                        index = offset + i,
                        error = %e,
                        "embedding failed"
                    );
                }
            }
            outcomes.extend(results);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    /// Echoes the text length, sleeping longer for shorter texts so that
    /// completions arrive out of order.
    struct SlowEcho {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl SlowEcho {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self { in_flight: AtomicUsize::new(0), max_in_flight: AtomicUsize::new(0), fail_on }
        }
    }

    #[async_trait]
    impl EmbeddingService for SlowEcho {
        fn name(&self) -> &str {
            "SlowEcho"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100 - text.len() as u64)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Some(text) == self.fail_on {
                return Err(RagError::EmbeddingService {
                    provider: "SlowEcho".into(),
                    message: "upstream unavailable".into(),
                });
            }
            if text == "empty" {
                return Ok(Vec::new());
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn texts() -> Vec<String> {
        (1..=7).map(|n| "x".repeat(n)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn preserves_order_and_caps_concurrency() {
        let service = Arc::new(SlowEcho::new(None));
        let client = EmbeddingClient::new(service.clone(), 3).unwrap();

        let vectors = client.embed_many(&texts()).await.unwrap();
        let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn embed_many_fails_whole_batch() {
        let client = EmbeddingClient::new(Arc::new(SlowEcho::new(Some("xxxx"))), 2).unwrap();
        let err = client.embed_many(&texts()).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingService { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_isolate_failures() {
        let client = EmbeddingClient::new(Arc::new(SlowEcho::new(Some("xxxx"))), 2).unwrap();
        let outcomes = client.embed_many_outcomes(&texts()).await;
        assert_eq!(outcomes.len(), 7);
        for (i, outcome) in outcomes.iter().enumerate() {
            if i == 3 {
                assert!(outcome.is_err());
            } else {
                assert_eq!(outcome.as_ref().unwrap()[0], (i + 1) as f32);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_vector_is_malformed() {
        let client = EmbeddingClient::new(Arc::new(SlowEcho::new(None)), 4).unwrap();
        let outcomes = client.embed_many_outcomes(&["a", "empty"]).await;
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(RagError::MalformedEmbedding { index: 1, .. })));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = EmbeddingClient::new(Arc::new(SlowEcho::new(None)), 0).unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[test]
    fn parses_json_vectors() {
        assert_eq!(parse_embedding(0, Some(&json!([0.5, -1, 2.0]))).unwrap(), vec![0.5, -1.0, 2.0]);
        assert!(parse_embedding(0, None).is_err());
        assert!(parse_embedding(0, Some(&Value::Null)).is_err());
        assert!(parse_embedding(0, Some(&json!([]))).is_err());
        assert!(parse_embedding(0, Some(&json!({"values": [1.0]}))).is_err());
        let err = parse_embedding(4, Some(&json!([1.0, "two"]))).unwrap_err();
        assert!(matches!(err, RagError::MalformedEmbedding { index: 4, .. }));
    }

    #[test]
    fn rejects_non_finite() {
        assert!(validate_embedding(0, vec![1.0, f32::NAN]).is_err());
        assert!(validate_embedding(0, vec![f32::INFINITY]).is_err());
    }
}
