use adform_traits::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;

/// A function $F: \mathbb{R}^n \rightarrow \mathbb{R}^n$ whose evaluation may fail.
pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Scalar,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), Box<dyn Error>> {
        X::eval_into(self, f, x)
    }
}

pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    /// Solves $J(x) \, \mathrm{sol} = \mathrm{rhs}$, where $J$ is the Jacobian of the function.
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>>;
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

/// Approximates the derivative of the scalar function `f` at `x` with central differences.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_derivative_fd<T>(mut f: impl FnMut(T) -> T, x: T, h: T) -> T
where
    T: Real,
{
    (f(x + h) - f(x - h)) / (2.0 * h)
}

/// Approximates the Jacobian of a [`VectorFunction`] at `x`, using central finite differences
/// with resolution `h`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_jacobian<T>(
    mut function: impl VectorFunction<T>,
    x: &DVector<T>,
    h: T,
) -> Result<DMatrix<T>, Box<dyn Error>>
where
    T: Real,
{
    let m = function.dimension();
    let mut x = x.clone();
    let mut jacobian = DMatrix::zeros(m, x.len());
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for j in 0..x.len() {
        let x_j = x[j];
        x[j] = x_j + h;
        function.eval_into(&mut DVectorViewMut::from(&mut f_plus), &DVectorView::from(&x))?;
        x[j] = x_j - h;
        function.eval_into(&mut DVectorViewMut::from(&mut f_minus), &DVectorView::from(&x))?;
        x[j] = x_j;

        jacobian.set_column(j, &((&f_plus - &f_minus) / (2.0 * h)));
    }

    Ok(jacobian)
}

/// Approximates the gradient of the function `f: R^n -> R` with central finite differences.
///
/// The parameter `h` determines the step size of the finite difference approximation.
///
/// The vector `x` is mutable in order to hold intermediate evaluation points, but upon
/// returning, its content remains unchanged.
pub fn approximate_gradient_fd<'a, T>(
    f: impl FnMut(DVectorView<T>) -> T,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DVector<T>
where
    T: Real,
{
    let x = x.into();
    let mut df = DVector::zeros(x.len());
    approximate_gradient_fd_into(DVectorViewMut::from(&mut df), f, x, h);
    df
}

/// Same as [`approximate_gradient_fd`], but stores the result in the provided output vector.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_gradient_fd_into<'a, T>(
    mut df: DVectorViewMut<T>,
    mut f: impl FnMut(DVectorView<T>) -> T,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) where
    T: Real,
{
    let mut x = x.into();
    assert_eq!(df.len(), x.len(), "Gradient and point must have the same dimension");
    for i in 0..x.len() {
        let x_i = x[i];
        x[i] = x_i + h;
        let f_plus = f(DVectorView::from(&x));
        x[i] = x_i - h;
        let f_minus = f(DVectorView::from(&x));
        x[i] = x_i;
        df[i] = (f_plus - f_minus) / (2.0 * h);
    }
}

/// Approximates the Jacobian of the function $f: \mathbb{R}^n \rightarrow \mathbb{R}^m$
/// with central finite differences.
///
/// The Jacobian matrix is the $m \times n$ matrix whose entries are given by
/// $$ J_{ij} := \pd{f_i}{x_j}.$$
///
/// The function is called as `f(x, output)`.
pub fn approximate_jacobian_fd<'a, T>(
    m: usize,
    f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let mut jacobian = DMatrix::zeros(m, x.len());
    approximate_jacobian_fd_into(DMatrixViewMut::from(&mut jacobian), f, x, h);
    jacobian
}

/// Same as [`approximate_jacobian_fd`], but stores the result in the provided output matrix.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn approximate_jacobian_fd_into<'a, T>(
    mut jacobian: DMatrixViewMut<T>,
    mut f: impl FnMut(DVectorView<T>, DVectorViewMut<T>),
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) where
    T: Real,
{
    let mut x = x.into();
    let m = jacobian.nrows();
    assert_eq!(jacobian.ncols(), x.len(), "Jacobian must have one column per input dimension");

    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for j in 0..x.len() {
        let x_j = x[j];
        x[j] = x_j + h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        x[j] = x_j - h;
        f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
        x[j] = x_j;

        let mut column = jacobian.column_mut(j);
        column.copy_from(&f_plus);
        column -= &f_minus;
        column /= 2.0 * h;
    }
}
