//! Vector math on embedding slices.

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Inner product of two equal-length vectors. On unit-normalized inputs
/// this equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Zero-pad a vector on the high end up to `dim`. Inputs already at `dim`
/// are returned unchanged; longer inputs are a caller bug guarded upstream.
pub fn pad_to(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
    if v.len() < dim {
        v.resize(dim, 0.0);
    }
    v
}
