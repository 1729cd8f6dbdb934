//! Vector-space comparison of document embeddings.
//!
//! All scores are cosine similarities clamped to `[0, 1]`. Zero-magnitude or
//! mismatched vectors score 0 rather than NaN.

use crate::cluster::single_linkage;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

pub fn similarity_matrix(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0_f32; n]; n];
    for i in 0..n {
        matrix[i][i] = cosine_similarity(&vectors[i], &vectors[i]);
        for j in (i + 1)..n {
            let score = cosine_similarity(&vectors[i], &vectors[j]);
            matrix[i][j] = score;
            matrix[j][i] = score;
        }
    }
    matrix
}

/// Candidates scoring at least `threshold` against `query`, best first.
pub fn find_similar(query: &[f32], candidates: &[Vec<f32>], threshold: f32) -> Vec<(usize, f32)> {
    let mut hits = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| (index, cosine_similarity(query, candidate)))
        .filter(|&(_, score)| score >= threshold)
        .collect::<Vec<_>>();
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    hits
}

/// Connected components of the `similarity >= threshold` graph with at least
/// two members. Linkage is transitive.
pub fn find_duplicate_groups(vectors: &[Vec<f32>], threshold: f32) -> Vec<Vec<usize>> {
    single_linkage(vectors.len(), 2, |i, j| {
        cosine_similarity(&vectors[i], &vectors[j]) >= threshold
    })
}

/// Mean pairwise similarity inside `group`; 1 for fewer than two members.
pub fn average_similarity(vectors: &[Vec<f32>], group: &[usize]) -> f32 {
    let mut total = 0.0_f32;
    let mut pairs = 0_u32;
    for (position, &i) in group.iter().enumerate() {
        for &j in &group[position + 1..] {
            total += cosine_similarity(&vectors[i], &vectors[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        1.0
    } else {
        total / pairs as f32
    }
}
