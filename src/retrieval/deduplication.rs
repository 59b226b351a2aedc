//! Backend result deduplication by chunk ID

use crate::backends::RawHit;
use std::collections::HashSet;

/// Deduplicate hits by chunk_id, keeping the first (best-ranked) instance
///
/// # Arguments
/// * `hits` - Hits from one backend, in backend rank order
///
/// # Returns
/// Deduplicated hits, maintaining rank order
pub fn deduplicate_hits(hits: Vec<RawHit>) -> Vec<RawHit> {
    let mut seen: HashSet<String> = HashSet::new();

    hits.into_iter()
        .filter(|hit| seen.insert(hit.chunk_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplication() {
        let hits = vec![
            RawHit::new("a", 0.9).with_text("text1"),
            RawHit::new("b", 0.8).with_text("text2"),
            RawHit::new("a", 0.7).with_text("text1 again"), // Duplicate
        ];

        let deduped = deduplicate_hits(hits);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].chunk_id, "a");
        assert_eq!(deduped[0].score, 0.9); // Keeps first (highest rank)
        assert_eq!(deduped[1].chunk_id, "b");
    }
}
