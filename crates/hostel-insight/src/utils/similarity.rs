//! Scoring used by the knowledge index and session memory.

use super::text_utils::TextUtils;

/// Cosine similarity in `[-1, 1]`. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Keyword overlap score in `[0, 1]`, used when no embeddings are available.
/// Each query keyword contributes its occurrence count weighted by its share of
/// the content length, plus a flat bonus for being present at all.
pub fn keyword_relevance(content: &str, query: &str) -> f32 {
    let keywords = TextUtils::keywords(query);
    if keywords.is_empty() || content.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let mut score = 0.0;
    let mut present = 0usize;

    for keyword in &keywords {
        let matches = content_lower.matches(keyword.as_str()).count();
        if matches > 0 {
            present += 1;
            score += matches as f32 * (keyword.len() as f32 / content.len().max(1) as f32);
        }
    }

    let coverage = present as f32 / keywords.len() as f32;
    (0.5 * coverage + score).min(1.0)
}
