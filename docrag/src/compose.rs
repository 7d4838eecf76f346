//! Cited answer composition over retrieved context.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::Citation;
use crate::error::Result;

/// The reply the model is told to give when the context lacks the answer.
pub const DECLINE_MESSAGE: &str = "I couldn't find that in the provided documents.";

/// An external service that turns a prompt into generated text.
///
/// Implementations must report upstream failures as
/// [`RagError::GenerationService`](crate::RagError::GenerationService).
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &PromptPayload) -> Result<String>;
}

/// One piece of retrieved text and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextItem {
    /// Retrieved segment text.
    pub text: String,
    /// Citation label of the segment, e.g. `manual.pdf • p.2`.
    pub source: String,
}

/// The instruction and user blocks sent to a [`GenerationService`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptPayload {
    /// Instructions constraining the model to the supplied context.
    pub system: String,
    /// Numbered context items followed by the question.
    pub user: String,
}

impl PromptPayload {
    /// Both blocks as a single prompt, for services without a system role.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Build the prompt for answering `question` from `contexts`.
///
/// Context items are numbered from 1 in the given order and the model is told
/// to cite them as `[#n]`.
pub fn compose(question: &str, contexts: &[ContextItem]) -> PromptPayload {
    let system = format!(
        "You answer strictly from the provided context.\n\
         If the answer is not present, say \"{DECLINE_MESSAGE}\"\n\
         Cite sources like [#1] [#2] in your answer."
    );

    let mut context_text = String::new();
    for (i, item) in contexts.iter().enumerate() {
        if i > 0 {
            context_text.push_str("\n\n");
        }
        let _ = write!(context_text, "[#{}] ({})\n{}", i + 1, item.source, item.text);
    }

    let user = format!("Question: {question}\n\nContext:\n{context_text}\n\nAnswer with citations:");

    PromptPayload { system, user }
}

/// The numbered citation list matching the `[#n]` markers of [`compose`].
pub fn citations(contexts: &[ContextItem]) -> Vec<Citation> {
    contexts
        .iter()
        .enumerate()
        .map(|(i, item)| Citation { id: i + 1, source: item.source.clone() })
        .collect()
}

/// Composes prompts and delegates them to a [`GenerationService`].
///
/// The returned answer is trimmed but not otherwise checked; in particular,
/// citation markers are not verified against the supplied contexts.
#[derive(Clone)]
pub struct AnswerComposer {
    service: Arc<dyn GenerationService>,
}

impl AnswerComposer {
    /// Create a composer backed by `service`.
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    /// Answer `question` from `contexts`.
    ///
    /// # Errors
    ///
    /// Propagates the service's [`RagError::GenerationService`](crate::RagError::GenerationService).
    pub async fn answer(&self, question: &str, contexts: &[ContextItem]) -> Result<String> {
        let prompt = compose(question, contexts);
        debug!(provider = self.service.name(), context_count = contexts.len(), "generating answer");

        let answer = self.service.generate(&prompt).await.inspect_err(|e| {
            error!(provider = self.service.name(), error = %e, "answer generation failed");
        })?;
        Ok(answer.trim().to_string())
    }
}
