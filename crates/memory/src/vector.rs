//! Vector similarity and episode ranking.

use tasksmith_core::memory::{Episode, EpisodeFilter, ScoredEpisode};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank episodes by cosine similarity to a query embedding.
///
/// Episodes without an embedding or failing `filter` are left out. At most
/// `k` results are returned, most similar first; ties keep insertion order.
pub fn rank_episodes<'a>(
    episodes: impl IntoIterator<Item = &'a Episode>,
    query: &[f32],
    filter: &EpisodeFilter,
    k: usize,
) -> Vec<ScoredEpisode> {
    let mut scored: Vec<ScoredEpisode> = episodes
        .into_iter()
        .filter(|e| !e.embedding.is_empty() && filter.matches(e))
        .map(|e| ScoredEpisode {
            similarity: cosine_similarity(&e.embedding, query),
            episode: e.clone(),
        })
        .filter(|s| s.similarity.is_finite())
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
