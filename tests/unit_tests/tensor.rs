use adform::dual::{derivative, Dual};
use adform::tensor::{det2, det3, double_contraction, inverse2, inverse3, trace, transpose_product_into};
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, Matrix2, Matrix3};
use proptest::prelude::*;

#[test]
fn determinants_of_small_matrices() {
    assert_eq!(det2(&[1.0, 2.0, 3.0, 4.0]), -2.0);
    assert_eq!(det3(&[2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0]), 24.0);
    assert_eq!(det3(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]), 0.0);
}

#[test]
fn inverses_match_nalgebra() {
    let a = [2.0, -1.0, 0.5, 3.0];
    let expected = Matrix2::from_row_slice(&a).try_inverse().unwrap();
    let inverse = inverse2(&a);
    for (actual, expected) in inverse.iter().zip(expected.transpose().iter()) {
        assert_scalar_eq!(*actual, *expected, comp = abs, tol = 1e-14);
    }

    let b = [2.0, -1.0, 0.5, 3.0, 1.0, -2.0, 0.0, 4.0, 1.5];
    let expected = Matrix3::from_row_slice(&b).try_inverse().unwrap();
    let inverse = inverse3(&b);
    // nalgebra iterates in column-major order, so compare against the transpose
    for (actual, expected) in inverse.iter().zip(expected.transpose().iter()) {
        assert_scalar_eq!(*actual, *expected, comp = abs, tol = 1e-13);
    }
}

#[test]
fn singular_inverse_is_not_finite() {
    let inverse = inverse2(&[1.0, 2.0, 2.0, 4.0]);
    assert!(inverse.iter().all(|x: &f64| !x.is_finite()));
}

#[test]
fn trace_and_double_contraction() {
    let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
    assert_eq!(trace(&m, 3), 15.0);
    assert_eq!(double_contraction(&m, &m), 285.0);
}

#[test]
fn transpose_product_matches_nalgebra() {
    let a = [1.0, 2.0, -1.0, 0.5, 3.0, 1.0, 2.0, -2.0, 0.0];
    let mut c = [0.0; 9];
    transpose_product_into(&mut c, &a, 3);
    let a_matrix = DMatrix::from_row_slice(3, 3, &a);
    let expected = a_matrix.transpose() * &a_matrix;
    assert_eq!(DMatrix::from_row_slice(3, 3, &c), expected);
}

#[test]
fn derivative_of_determinant_is_cofactor() {
    // d/dt det(A + t E_01) = cofactor_01 = -(a_10 a_22 - a_12 a_20)
    let a = [2.0, -1.0, 0.5, 3.0, 1.0, -2.0, 0.0, 4.0, 1.5];
    let (_, d_det) = derivative(
        |t: Dual<f64>| {
            let mut m = a.map(Dual::constant);
            m[1] += t;
            det3(&m)
        },
        0.0,
    );
    assert_scalar_eq!(d_det, -(3.0 * 1.5 - (-2.0) * 0.0), comp = abs, tol = 1e-14);
}

proptest! {
    #[test]
    fn inverse2_is_inverse(a in proptest::array::uniform4(-5.0..5.0f64)) {
        prop_assume!(det2(&a).abs() > 1e-2);
        let product = Matrix2::from_row_slice(&a) * Matrix2::from_row_slice(&inverse2(&a));
        prop_assert!((product - Matrix2::identity()).abs().max() <= 1e-9);
    }
}
