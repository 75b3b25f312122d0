//! Distance to similarity conversion.

/// Convert an index distance into a relevance score.
///
/// Distances up to 1 map linearly (`1 - d`, floored at 0); larger distances
/// decay as `1 / (1 + d)`. The two branches do not meet at `d = 1`: a distance
/// of exactly 1 scores 0 while anything slightly above scores about 0.5.
///
/// Non-negative distances score in `[0, 1]`. Negative distances are not
/// clamped and score above 1 (`-0.5` gives `1.5`).
pub fn similarity_from_distance(distance: f32) -> f32 {
    if distance <= 1.0 {
        (1.0 - distance).max(0.0)
    } else {
        1.0 / (1.0 + distance)
    }
}

/// Cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Zero vectors and mismatched lengths are treated as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 1.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot_product / (norm_a * norm_b)
}
