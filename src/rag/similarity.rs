//! Cosine similarity and brute-force top-k ranking

/// Dot product over the product of norms; 0.0 when either vector is all-zero
///
/// Vectors of different length are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Indices and scores of the `top_k` best matches, best first
///
/// Ties keep their original order.
pub fn rank_by_similarity<'a, I>(query: &[f32], candidates: I, top_k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| (i, cosine_similarity(query, embedding)))
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_self_similarity_is_one() {
        let v = [0.3, -1.2, 4.5, 0.0, 2.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_symmetric() {
        let a = [1.0, 2.0, 3.0];
        let b = [-0.5, 4.0, 0.25];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_zero_vector() {
        let zero = [0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_length_mismatch_uses_common_prefix() {
        let short = [1.0, 0.0];
        let long = [1.0, 0.0, 5.0];
        assert!((cosine_similarity(&short, &long) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < EPSILON);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let query = [1.0, 0.0];
        let candidates: Vec<Vec<f32>> = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.1],
            vec![-1.0, 0.0],
            vec![1.0, 1.0],
        ];

        let ranked = rank_by_similarity(&query, candidates.iter().map(Vec::as_slice), 2);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 3]);
        assert!(ranked[0].1 >= ranked[1].1);
    }

    #[test]
    fn test_rank_with_fewer_candidates_than_k() {
        let ranked = rank_by_similarity(&[1.0], [[1.0f32].as_slice()], 5);
        assert_eq!(ranked.len(), 1);
    }
}
