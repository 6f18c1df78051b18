use adform_optimize::calculus::*;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use std::error::Error;

struct SimpleTwoDimensionalPolynomial;

impl VectorFunction<f64> for SimpleTwoDimensionalPolynomial {
    fn dimension(&self) -> usize {
        2
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        assert_eq!(x.len(), 2);
        assert_eq!(f.len(), x.len());
        let x1 = x[0];
        let x2 = x[1];
        f[0] = x1 * x2 + 3.0;
        f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
        Ok(())
    }
}

#[test]
fn approximate_jacobian_simple_function() {
    let h = 1e-6;
    let x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian(SimpleTwoDimensionalPolynomial, &x, h).unwrap();

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
}

#[test]
fn approximate_jacobian_propagates_evaluation_errors() {
    struct Failing;

    impl VectorFunction<f64> for Failing {
        fn dimension(&self) -> usize {
            1
        }

        fn eval_into(&mut self, _f: &mut DVectorViewMut<f64>, _x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
            Err(Box::from("evaluation failed"))
        }
    }

    let x = DVector::from_column_slice(&[1.0]);
    let err = approximate_jacobian(Failing, &x, 1e-6).unwrap_err();
    assert_eq!(err.to_string(), "evaluation failed");
}

#[test]
fn approximate_derivative_fd_matches_analytic_derivative() {
    let f = |x: f64| x.sin() * x * x;
    let df = |x: f64| x.cos() * x * x + 2.0 * x * x.sin();
    for x in [-std::f64::consts::PI, 0.0, 1.3, std::f64::consts::PI] {
        let approx = approximate_derivative_fd(f, x, 1e-6);
        assert!((approx - df(x)).abs() < 1e-6, "x = {}: {} vs {}", x, approx, df(x));
    }
}

#[test]
fn test_approximate_gradient_fd() {
    // Define some function f and its gradient
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let f_grad = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        DVector::from_column_slice(&[9.0 * x * x + 3.0 * y, 3.0 * x, -10.0 * z])
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let f_grad_fd = approximate_gradient_fd(f, &mut x, 1e-6);

    assert_matrix_eq!(f_grad_fd, f_grad(DVectorView::from(&x)), comp = abs, tol = 1e-5);
    // The evaluation point is restored
    assert_eq!(x.as_slice(), &[3.0, 4.0, 5.0]);
}

#[test]
fn test_approximate_jacobian_fd() {
    let f = |x: DVectorView<f64>, mut out: DVectorViewMut<f64>| {
        out[0] = x[0] * x[1];
        out[1] = x[0] + 2.0 * x[1];
        out[2] = x[1] * x[1];
    };

    let mut x = DVector::from_column_slice(&[2.0, -1.0]);
    let j = approximate_jacobian_fd(3, f, &mut x, 1e-6);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 2, &[
        -1.0, 2.0,
         1.0, 2.0,
         0.0, -2.0,
    ]);
    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
}
