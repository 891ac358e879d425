/// Compute the cosine distance between two embeddings.
///
/// Returns a value in `[0, 2]` where 0 means identical direction.
/// Accumulates in f64. Zero vectors, dimension mismatches and non-finite
/// components are maximally distant (2.0) so they can never win a
/// nearest-match scan.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 2.0;
    }
    (1.0 - similarity.clamp(-1.0, 1.0)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_is_zero() {
        let d = cosine_distance(&[0.3, 0.4, 0.5], &[0.3, 0.4, 0.5]);
        assert!(d.abs() < 1e-6, "got {d}");
    }

    #[test]
    fn scale_invariant() {
        let d = cosine_distance(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
        assert!(d.abs() < 1e-6, "got {d}");
    }

    #[test]
    fn orthogonal_is_one() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 1.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn opposite_is_two() {
        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn degenerate_inputs_are_maximal() {
        assert_eq!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[], &[]), 2.0);
    }

    #[test]
    fn non_finite_components_are_maximal() {
        assert_eq!(cosine_distance(&[f32::NAN, 0.0], &[1.0, 0.0]), 2.0);
        assert_eq!(cosine_distance(&[1.0, 0.0], &[f32::INFINITY, 1.0]), 2.0);
    }
}
