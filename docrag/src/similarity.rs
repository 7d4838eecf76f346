//! Cosine similarity scoring and ranking by brute-force linear scan.

use tracing::warn;

use crate::error::{RagError, Result};

/// Added to the norm product so all-zero vectors score 0 instead of NaN.
pub const EPSILON: f64 = 1e-10;

/// Compute the cosine similarity `dot(a, b) / (‖a‖·‖b‖ + ε)`.
///
/// Accumulates in `f64`. The result lies in `[-1, 1]` and is `0.0` when
/// either vector is all zeros.
///
/// # Errors
///
/// Returns [`RagError::DimensionMismatch`] if the vectors differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt() + EPSILON);
    // + 0.0 folds -0.0 into 0.0 so equal scores compare equal under total_cmp
    Ok(score as f32 + 0.0)
}

/// A candidate identifier paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<K> {
    /// Caller supplied identifier of the candidate.
    pub id: K,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Result of [`rank`]: scored candidates plus those that could not be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking<K> {
    /// Candidates in descending score order, ties in input order.
    pub entries: Vec<Scored<K>>,
    /// Candidates skipped because their vector length differs from the query.
    pub rejected: Vec<K>,
}

impl<K> Default for Ranking<K> {
    fn default() -> Self {
        Self { entries: Vec::new(), rejected: Vec::new() }
    }
}

impl<K> Ranking<K> {
    /// Number of ranked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was ranked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Score every candidate against `query` and order them by descending score.
///
/// The sort is stable, so equal scores keep their input order and identical
/// inputs always produce identical rankings. A candidate whose vector length
/// differs from the query's is logged and moved to [`Ranking::rejected`]; it
/// never fails the whole ranking. Zero candidates yield an empty ranking.
pub fn rank<K, V>(query: &[f32], candidates: impl IntoIterator<Item = (K, V)>) -> Ranking<K>
where
    V: AsRef<[f32]>,
{
    let mut ranking = Ranking::default();

    for (position, (id, vector)) in candidates.into_iter().enumerate() {
        match cosine_similarity(query, vector.as_ref()) {
            Ok(score) => ranking.entries.push(Scored { id, score }),
            Err(e) => {
                warn!(position, error = %e, "skipping candidate that cannot be ranked");
                ranking.rejected.push(id);
            }
        }
    }

    ranking.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn identical_and_opposite_vectors() {
        let a = [0.3f32, -1.2, 4.0];
        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!(approx(cosine_similarity(&a, &a).unwrap(), 1.0));
        assert!(approx(cosine_similarity(&a, &neg).unwrap(), -1.0));
    }

    #[test]
    fn orthogonal_and_zero_vectors() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0));
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_are_errors() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn ranks_descending() {
        let candidates =
            vec![("low", vec![0.0f32, 1.0]), ("high", vec![1.0, 0.0]), ("mid", vec![1.0, 1.0])];
        let ranking = rank(&[1.0, 0.0], candidates);
        let ids: Vec<_> = ranking.entries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let candidates = (0..5).map(|i| (i, vec![2.0f32, 2.0]));
        let ranking = rank(&[1.0, 1.0], candidates);
        let ids: Vec<_> = ranking.entries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn mismatches_are_skipped_not_fatal() {
        let candidates = vec![(1, vec![1.0f32, 0.0]), (2, vec![1.0]), (3, vec![0.5, 0.5])];
        let ranking = rank(&[1.0, 0.0], candidates);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking.rejected, vec![2]);
    }

    #[test]
    fn empty_candidates_rank_empty() {
        let ranking = rank(&[1.0], Vec::<(usize, Vec<f32>)>::new());
        assert!(ranking.is_empty());
        assert!(ranking.rejected.is_empty());
    }
}
