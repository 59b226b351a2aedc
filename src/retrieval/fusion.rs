//! Score fusion for hybrid retrieval
//!
//! All functions here are pure. Backend scores are min-max normalized per
//! source before blending so that dense similarities and BM25 scores share the
//! [0, 1] range.

use crate::backends::RawHit;
use crate::retrieval::{deduplicate_hits, Hit};
use ahash::{HashMap, HashMapExt};

/// Min-max normalize backend scores to [0, 1]
///
/// A degenerate list (one hit, or all scores equal) maps every hit to 1.0.
/// Non-finite scores are treated as the list minimum.
pub fn min_max_normalize(hits: &[RawHit]) -> Vec<f32> {
    let finite = hits.iter().map(|h| h.score).filter(|s| s.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s), hi.max(s))
    });

    if !min.is_finite() || !max.is_finite() {
        // No finite scores at all
        return vec![1.0; hits.len()];
    }

    let range = max - min;
    hits.iter()
        .map(|h| {
            if range <= f32::EPSILON {
                1.0
            } else if h.score.is_finite() {
                (h.score - min) / range
            } else {
                0.0
            }
        })
        .collect()
}

/// Blend dense and lexical results: `alpha * d + (1 - alpha) * l`
///
/// A side missing for a candidate contributes 0. Each source is deduplicated
/// by chunk_id first, so a candidate present in both is blended exactly once.
/// The returned hits are in retrieval rank order (dense order, then
/// lexical-only candidates in lexical order) and are not yet sorted by score.
pub fn hybrid_blend(dense: Vec<RawHit>, lexical: Vec<RawHit>, alpha: f32) -> Vec<Hit> {
    let dense = deduplicate_hits(dense);
    let lexical = deduplicate_hits(lexical);
    let dense_norm = min_max_normalize(&dense);
    let lexical_norm = min_max_normalize(&lexical);

    let mut index: HashMap<String, usize> = HashMap::with_capacity(dense.len() + lexical.len());
    let mut hits: Vec<Hit> = Vec::with_capacity(dense.len() + lexical.len());

    for (raw, d) in dense.into_iter().zip(dense_norm) {
        index.insert(raw.chunk_id.clone(), hits.len());
        hits.push(into_hit(raw, alpha * d));
    }

    for (raw, l) in lexical.into_iter().zip(lexical_norm) {
        let contribution = (1.0 - alpha) * l;
        match index.get(&raw.chunk_id) {
            Some(&i) => {
                let hit = &mut hits[i];
                hit.score += contribution;
                merge_missing_fields(hit, raw);
            }
            None => {
                index.insert(raw.chunk_id.clone(), hits.len());
                hits.push(into_hit(raw, contribution));
            }
        }
    }

    hits
}

/// Multiply each candidate's score by `1 + weight * g` for its normalized graph score `g`
///
/// Graph hits for chunk ids that are not already candidates are ignored.
pub fn apply_graph_boost(hits: &mut [Hit], graph: Vec<RawHit>, weight: f32) {
    if weight <= 0.0 || graph.is_empty() {
        return;
    }

    let graph = deduplicate_hits(graph);
    let norm = min_max_normalize(&graph);
    let boosts: HashMap<String, f32> = graph
        .into_iter()
        .zip(norm)
        .map(|(raw, g)| (raw.chunk_id, g))
        .collect();

    for hit in hits.iter_mut() {
        if let Some(g) = boosts.get(&hit.chunk_id) {
            hit.score *= 1.0 + weight * g;
        }
    }
}

/// Combine a prior fused score with a reranker relevance score
///
/// `r` is clamped to [0, 1], so the result always lies in `[0.5 * s, s]`.
pub fn rerank_fusion(prior: f32, rerank: f32) -> f32 {
    let r = if rerank.is_finite() {
        rerank.clamp(0.0, 1.0)
    } else {
        0.0
    };
    prior * (0.5 + 0.5 * r)
}

/// Apply rerank fusion pairwise; `hits` and `scores` must be the same length
pub fn apply_rerank(hits: &mut [Hit], scores: &[f32]) {
    for (hit, &r) in hits.iter_mut().zip(scores) {
        hit.score = rerank_fusion(hit.score, r);
        hit.rerank_score = Some(r);
    }
}

/// Stable sort by score descending; equal scores keep their current order
pub fn sort_by_score(hits: &mut [Hit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

fn into_hit(raw: RawHit, score: f32) -> Hit {
    Hit {
        chunk_id: raw.chunk_id,
        doc_id: raw.doc_id,
        section_id: raw.section_id,
        text: raw.text.unwrap_or_default(),
        score,
        rerank_score: None,
        payload: raw.payload,
    }
}

fn merge_missing_fields(hit: &mut Hit, raw: RawHit) {
    if hit.doc_id.is_none() {
        hit.doc_id = raw.doc_id;
    }
    if hit.section_id.is_none() {
        hit.section_id = raw.section_id;
    }
    if hit.text.is_empty() {
        if let Some(text) = raw.text {
            hit.text = text;
        }
    }
    for (key, value) in raw.payload {
        hit.payload.entry(key).or_insert(value);
    }
}
