//! Distance helpers shared by both index variants.

/// Squared Euclidean distance. On unit vectors this is `2 - 2 * cosine`.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_l2() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_distance_on_unit_vectors_tracks_cosine() {
        let mut a = vec![1.0, 0.0];
        let mut b = vec![1.0, 1.0];
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        let cosine: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((squared_l2(&a, &b) - (2.0 - 2.0 * cosine)).abs() < 1e-6);
    }
}
