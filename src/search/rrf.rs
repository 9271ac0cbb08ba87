//! Reciprocal Rank Fusion for hybrid retrieval.
//!
//! Combines the FTS and vector rankings without score calibration:
//!
//! ```text
//! RRF_score(d) = sum over lists containing d of 1 / (k + rank(d))
//! ```
//!
//! with the standard `k = 60` dampening constant and ranks 1-indexed.
//! Ties break by recency, newer first.

use crate::vector::DocType;
use std::collections::HashMap;

/// Standard RRF dampening constant.
pub const RRF_K: f64 = 60.0;

/// One candidate entering fusion.
#[derive(Debug, Clone)]
pub struct RankedDoc {
    /// Document kind.
    pub doc_type: DocType,
    /// SQL row id.
    pub id: i64,
    /// Normalized per-list score in `[0, 1]`; informational only, fusion
    /// ranks by position.
    pub score: f64,
    /// Creation timestamp (epoch ms), used for tie-breaks.
    pub created_at: i64,
}

/// One fused result.
#[derive(Debug, Clone)]
pub struct FusedDoc {
    /// Document kind.
    pub doc_type: DocType,
    /// SQL row id.
    pub id: i64,
    /// Summed RRF score.
    pub rrf_score: f64,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
}

/// Normalizes a positive raw BM25-style score into `[0, 1)`.
///
/// Monotone in the raw score; no per-query state.
#[must_use]
pub fn bm25_normalize(raw: f64) -> f64 {
    let raw = raw.max(0.0);
    raw / (raw + 1.0)
}

/// Fuses two ranked lists, best first, keeping the top `limit`.
#[must_use]
pub fn fuse(lexical: &[RankedDoc], dense: &[RankedDoc], k: f64, limit: usize) -> Vec<FusedDoc> {
    let capacity = lexical.len() + dense.len();
    let mut scores: HashMap<(DocType, i64), FusedDoc> = HashMap::with_capacity(capacity);

    for list in [lexical, dense] {
        for (rank, doc) in list.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            scores
                .entry((doc.doc_type, doc.id))
                .and_modify(|fused| fused.rrf_score += contribution)
                .or_insert(FusedDoc {
                    doc_type: doc.doc_type,
                    id: doc.id,
                    rrf_score: contribution,
                    created_at: doc.created_at,
                });
        }
    }

    let mut fused: Vec<FusedDoc> = scores.into_values().collect();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i64, created_at: i64) -> RankedDoc {
        RankedDoc {
            doc_type: DocType::Observation,
            id,
            score: 0.5,
            created_at,
        }
    }

    #[test]
    fn test_doc_in_both_lists_beats_single_list() {
        // Lexical: [1, 2], dense: [2, 3]. Doc 2 appears in both.
        let fused = fuse(&[doc(1, 10), doc(2, 10)], &[doc(2, 10), doc(3, 10)], RRF_K, 10);
        assert_eq!(fused[0].id, 2);
    }

    #[test]
    fn test_strict_dominance_is_preserved() {
        // Doc 1 above doc 3 in both lists: it must fuse strictly higher.
        let lexical = vec![doc(1, 10), doc(3, 10)];
        let dense = vec![doc(1, 10), doc(3, 10)];
        let fused = fuse(&lexical, &dense, RRF_K, 10);
        assert_eq!(fused[0].id, 1);
        assert!(fused[0].rrf_score > fused[1].rrf_score);
    }

    #[test]
    fn test_dual_list_membership_outweighs_single_rank_one() {
        // Doc 1 only lexical at rank 1, doc 2 only dense at rank 1, doc 3
        // at rank 2 in both. Summed contributions: 2/(k+2) ≈ 0.0323 for
        // doc 3 versus 1/(k+1) ≈ 0.0164 for each singleton, so agreement
        // between retrievers beats a single first place.
        let lexical = vec![doc(1, 100), doc(3, 50)];
        let dense = vec![doc(2, 90), doc(3, 50)];
        let fused = fuse(&lexical, &dense, RRF_K, 10);
        let ids: Vec<i64> = fused.iter().map(|d| d.id).collect();
        assert_eq!(ids[0], 3);
        // The singletons tie on score; recency breaks the tie, newer first.
        assert_eq!(ids[1], 1);
        assert_eq!(ids[2], 2);
    }

    #[test]
    fn test_tie_breaks_by_recency() {
        let fused = fuse(&[doc(1, 5)], &[doc(2, 9)], RRF_K, 10);
        assert_eq!(fused[0].id, 2);
        assert_eq!(fused[1].id, 1);
    }

    #[test]
    fn test_limit_truncates() {
        let lexical: Vec<RankedDoc> = (0..10).map(|i| doc(i, i)).collect();
        let fused = fuse(&lexical, &[], RRF_K, 3);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_bm25_normalize_monotone_and_bounded() {
        assert!(bm25_normalize(0.0).abs() < f64::EPSILON);
        assert!(bm25_normalize(1.0) < bm25_normalize(10.0));
        assert!(bm25_normalize(1e9) < 1.0);
        // Negative raw scores clamp to zero.
        assert!(bm25_normalize(-5.0).abs() < f64::EPSILON);
    }
}
