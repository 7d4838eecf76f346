//! Top-k selection with a diversity constraint.

use std::collections::HashSet;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{DocumentId, Segment};
use crate::error::{RagError, Result};

/// The identity two results must not share while diversity can be honoured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DiversityKey {
    /// At most one result per page of each document.
    #[default]
    DocumentPage,
    /// At most one result per document.
    Document,
    /// Every segment is distinct; diversity only removes exact repeats.
    Segment,
}

impl DiversityKey {
    /// Compute the key of `segment` under this policy.
    pub fn key_of(self, segment: &Segment) -> (DocumentId, usize, usize) {
        match self {
            Self::DocumentPage => (segment.document_id, segment.page, 0),
            Self::Document => (segment.document_id, 0, 0),
            Self::Segment => (segment.document_id, segment.page, segment.sequence),
        }
    }
}

impl FromStr for DiversityKey {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document-page" | "page" => Ok(Self::DocumentPage),
            "document" => Ok(Self::Document),
            "segment" => Ok(Self::Segment),
            other => Err(RagError::InvalidConfig(format!("unknown diversity key '{other}'"))),
        }
    }
}

/// Select at most `k` items from `ranking`, preferring distinct keys.
///
/// The first `2 * k` ranked items (or all of them, if fewer) are walked in
/// order and an item is accepted only if its key has not been accepted yet.
/// If that yields fewer than `k` items, the ranking is walked again from the
/// top and the best remaining items are admitted regardless of key until `k`
/// is reached or the ranking is exhausted. The result is returned in ranking
/// order and is fully deterministic.
///
/// # Example
///
/// ```rust,ignore
/// use docrag::select_top_k;
///
/// let picked = select_top_k(&ranked, 6, |hit| (hit.document_id, hit.page));
/// ```
pub fn select_top_k<T, K, F>(ranking: &[T], k: usize, key: F) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    if k == 0 || ranking.is_empty() {
        return Vec::new();
    }

    let mut accepted = vec![false; ranking.len()];
    let mut count = 0;
    let mut seen = HashSet::new();

    let window = ranking.len().min(k.saturating_mul(2));
    for (i, item) in ranking[..window].iter().enumerate() {
        if seen.insert(key(item)) {
            accepted[i] = true;
            count += 1;
            if count == k {
                break;
            }
        }
    }

    if count < k {
        for flag in accepted.iter_mut().filter(|flag| !**flag) {
            *flag = true;
            count += 1;
            if count == k {
                break;
            }
        }
    }

    ranking.iter().zip(accepted).filter_map(|(item, keep)| keep.then_some(item)).collect()
}
