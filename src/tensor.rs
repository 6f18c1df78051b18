//! Small dense tensor helpers for use inside energy functionals.
//!
//! Matrices are stored as row-major flat arrays, matching the row-major layout of rank-2
//! variables in the sample buffer (see [`crate::layout`]), so that `SampleView::slice` can be
//! converted directly with `try_into`.
//!
//! Singular matrices are not detected: the inverses divide by the determinant, so a vanishing
//! determinant propagates as non-finite values.
use adform_traits::Number;

#[inline]
pub fn det2<N: Number>(m: &[N; 4]) -> N {
    m[0] * m[3] - m[1] * m[2]
}

#[inline]
pub fn det3<N: Number>(m: &[N; 9]) -> N {
    let [a, b, c, d, e, f, g, h, i] = *m;
    a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g)
}

pub fn inverse2<N: Number>(m: &[N; 4]) -> [N; 4] {
    let [a, b, c, d] = *m;
    let det = det2(m);
    [d / det, -b / det, -c / det, a / det]
}

pub fn inverse3<N: Number>(m: &[N; 9]) -> [N; 9] {
    let [a, b, c, d, e, f, g, h, i] = *m;
    let det = det3(m);
    [
        (e * i - f * h) / det,
        -(b * i - c * h) / det,
        (b * f - c * e) / det,
        -(d * i - f * g) / det,
        (a * i - c * g) / det,
        -(a * f - c * d) / det,
        (d * h - e * g) / det,
        -(a * h - b * g) / det,
        (a * e - b * d) / det,
    ]
}

/// Trace of a square row-major matrix of dimension `dim`.
pub fn trace<N: Number>(m: &[N], dim: usize) -> N {
    assert_eq!(m.len(), dim * dim, "Matrix must be square");
    (0..dim).map(|i| m[dim * i + i]).sum()
}

/// Computes $A : B = \sum_{ij} A_{ij} B_{ij}$.
pub fn double_contraction<N: Number>(a: &[N], b: &[N]) -> N {
    assert_eq!(a.len(), b.len(), "Tensors must have the same number of entries");
    a.iter().zip(b).map(|(a_ij, b_ij)| *a_ij * *b_ij).sum()
}

/// Computes $A^T A$ for a square row-major matrix of dimension `dim`, storing the result in
/// `output`.
pub fn transpose_product_into<N: Number>(output: &mut [N], a: &[N], dim: usize) {
    assert_eq!(a.len(), dim * dim);
    assert_eq!(output.len(), dim * dim);
    for i in 0..dim {
        for j in 0..dim {
            output[dim * i + j] = (0..dim).map(|k| a[dim * k + i] * a[dim * k + j]).sum();
        }
    }
}
