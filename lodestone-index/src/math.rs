//! Vector math helpers.
//!
//! All numeric work is in f32. Stored vectors are unit-norm, so cosine
//! similarity reduces to a dot product everywhere downstream.

use lodestone_core::{Error, Result};

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity of two unit vectors (a plain dot product).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    dot(a, b)
}

/// Squared Euclidean distance; used during k-means training where
/// intermediate centroids are not unit-norm.
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Normalize a vector to unit length.
///
/// Zero-norm and non-finite inputs are rejected: an embedding like that
/// is garbage and must never enter an index.
pub fn normalize(v: &mut [f32]) -> Result<()> {
    if v.is_empty() {
        return Err(Error::invalid_vector("empty vector"));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(Error::invalid_vector("non-finite component"));
    }
    let norm = l2_norm(v);
    if norm == 0.0 {
        return Err(Error::invalid_vector("zero-norm vector"));
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Ok(())
}

/// Normalized copy of a vector.
pub fn normalized(v: &[f32]) -> Result<Vec<f32>> {
    let mut out = v.to_vec();
    normalize(&mut out)?;
    Ok(out)
}

/// L2-normalized arithmetic mean of a set of vectors.
pub fn mean_centroid<'a, I>(vectors: I, dimension: usize) -> Result<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for v in vectors {
        debug_assert_eq!(v.len(), dimension);
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
        count += 1;
    }
    if count == 0 {
        return Err(Error::invalid_vector("centroid of empty set"));
    }
    for x in sum.iter_mut() {
        *x /= count as f32;
    }
    normalize(&mut sum)?;
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert_relative_eq!(dot(&a, &b), 32.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0, 0.0];
        normalize(&mut v).unwrap();
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(v[1], 0.8, epsilon = 1e-6);
        assert_relative_eq!(l2_norm(&v), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_rejects_zero_and_nan() {
        let mut zero = vec![0.0, 0.0];
        assert!(normalize(&mut zero).is_err());
        let mut nan = vec![1.0, f32::NAN];
        assert!(normalize(&mut nan).is_err());
        let mut empty: Vec<f32> = vec![];
        assert!(normalize(&mut empty).is_err());
    }

    #[test]
    fn test_cosine_of_unit_vectors() {
        let a = normalized(&[1.0, 1.0, 0.0]).unwrap();
        let b = normalized(&[1.0, 1.0, 0.0]).unwrap();
        assert_relative_eq!(cosine_similarity(&a, &b), 1.0, epsilon = 1e-6);

        let c = normalized(&[0.0, 0.0, 1.0]).unwrap();
        assert_relative_eq!(cosine_similarity(&a, &c), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_mean_centroid() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        let c = mean_centroid([a.as_slice(), b.as_slice()], 2).unwrap();
        assert_relative_eq!(c[0], c[1], epsilon = 1e-6);
        assert_relative_eq!(l2_norm(&c), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_centroid_of_empty_set_errors() {
        assert!(mean_centroid(std::iter::empty(), 4).is_err());
    }
}
