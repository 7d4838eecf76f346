//! Retrieval quality metrics over manually labelled results.

use serde::{Deserialize, Serialize};

/// A reviewer's judgement of one ranked result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    /// The result answers the query.
    Relevant,
    /// The result does not answer the query.
    Irrelevant,
}

/// Fraction of relevant results among the first `k` labels.
///
/// Returns 0 when there are no labels or `k == 0`.
pub fn precision_at_k(labels: &[Relevance], k: usize) -> f64 {
    let considered = &labels[..k.min(labels.len())];
    if considered.is_empty() {
        return 0.0;
    }
    let relevant = considered.iter().filter(|l| **l == Relevance::Relevant).count();
    relevant as f64 / considered.len() as f64
}

/// Reciprocal rank of the first relevant result, 0 if none is relevant.
pub fn reciprocal_rank(labels: &[Relevance]) -> f64 {
    labels
        .iter()
        .position(|l| *l == Relevance::Relevant)
        .map_or(0.0, |pos| 1.0 / (pos + 1) as f64)
}

/// Mean of [`reciprocal_rank`] over several labelled queries.
pub fn mean_reciprocal_rank<L: AsRef<[Relevance]>>(queries: &[L]) -> f64 {
    if queries.is_empty() {
        return 0.0;
    }
    queries.iter().map(|labels| reciprocal_rank(labels.as_ref())).sum::<f64>() / queries.len() as f64
}

#[cfg(test)]
mod tests {
    use super::Relevance::{Irrelevant, Relevant};
    use super::*;

    #[test]
    fn precision_counts_first_k() {
        let labels = [Relevant, Irrelevant, Relevant, Relevant];
        assert_eq!(precision_at_k(&labels, 2), 0.5);
        assert_eq!(precision_at_k(&labels, 10), 0.75);
        assert_eq!(precision_at_k(&[], 3), 0.0);
        assert_eq!(precision_at_k(&labels, 0), 0.0);
    }

    #[test]
    fn reciprocal_rank_of_first_hit() {
        assert_eq!(reciprocal_rank(&[Irrelevant, Irrelevant, Relevant]), 1.0 / 3.0);
        assert_eq!(reciprocal_rank(&[Relevant]), 1.0);
        assert_eq!(reciprocal_rank(&[Irrelevant]), 0.0);
    }

    #[test]
    fn mrr_averages_queries() {
        let queries = vec![vec![Relevant], vec![Irrelevant, Relevant], vec![Irrelevant]];
        assert_eq!(mean_reciprocal_rank(&queries), 0.5);
        assert_eq!(mean_reciprocal_rank::<Vec<Relevance>>(&[]), 0.0);
    }
}
