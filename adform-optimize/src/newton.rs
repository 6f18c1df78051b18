use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use adform_traits::Real;
use itertools::iterate;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    pub tolerance: T,
}

#[derive(Debug)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// The residual contained non-finite entries at the start of the given iteration.
    NonFiniteResidual(usize),
    /// Evaluating the function failed.
    FunctionError(Box<dyn Error>),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(Box<dyn Error>),
    /// The line search failed to produce a valid step.
    LineSearchError(Box<dyn Error>),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            NewtonError::NonFiniteResidual(iter) => {
                write!(f, "Residual is not finite at iteration {}.", iter)
            }
            NewtonError::FunctionError(err) => {
                write!(f, "Failed to evaluate function. Error: {}", err)
            }
            NewtonError::JacobianError(err) => {
                write!(f, "Failed to solve Jacobian system. Error: {}", err)
            }
            NewtonError::LineSearchError(err) => {
                write!(f, "Line search failed to produce valid step. Error: {}", err)
            }
        }
    }
}

impl Error for NewtonError {}

fn is_finite<T: Real>(v: &DVectorViewMut<T>) -> bool {
    v.iter().all(|v_i| v_i.is_finite())
}

/// Attempts to solve the non-linear equation F(u) = 0.
///
/// No heap allocation is performed by the iteration itself. The solution is said to have
/// converged if ```|F(u)|_2 <= tolerance```.
///
/// If successful, returns the number of iterations performed.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch)
}

/// Same as `newton`, but allows specifying a line search.
///
/// A non-finite residual at the start of an iteration aborts the procedure with
/// [`NewtonError::NonFiniteResidual`]. Line searches may avoid this by rejecting trial steps
/// with non-finite residuals, see [`BacktrackingLineSearch`].
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    function
        .eval_into(&mut f, &DVectorView::from(&x))
        .map_err(NewtonError::FunctionError)?;

    let mut iter = 0;

    loop {
        if !is_finite(&f) {
            return Err(NewtonError::NonFiniteResidual(iter));
        }
        if f.norm() <= settings.tolerance {
            break;
        }
        if settings
            .max_iterations
            .map(|max_iter| iter == max_iter)
            .unwrap_or(false)
        {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        function
            .solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;
        let dx = &minus_dx;

        let step_length = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(dx),
            )
            .map_err(NewtonError::LineSearchError)?;
        debug!("Newton step length at iter {}: {}", iter, step_length);
        iter += 1;
    }

    Ok(iter)
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    /// Moves `x` along `direction`, leaves `f` evaluated at the new point and returns the
    /// step length.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(T::one())
    }
}

/// Standard backtracking line search using the Armijo condition.
///
/// Trial steps whose residual is not finite (e.g. because an element was inverted) count as
/// insufficient decrease, so the step is shortened further.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch<T> {
    /// The sufficient decrease parameter $c \in (0, 1)$.
    pub sufficient_decrease: T,
    /// The line search fails once the step length drops below this value.
    pub min_step_length: T,
}

impl<T: Real> Default for BacktrackingLineSearch<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step_length: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        // We seek to solve
        //  F(x) = 0
        // by minimizing
        //  g(x) = (1/2) || F(x) ||^2
        // With p_k the Newton direction we have grad F^T p_k ~= - F(x_k), so the sufficient
        // decrease condition
        //  g(x_k + alpha * p_k) <= g(x_k) + c * alpha * (grad g)^T * p_k
        // becomes
        //  g(x_k + alpha * p_k) <= (1 - c * alpha) * g(x_k).
        let c = self.sufficient_decrease;
        let alpha_min = self.min_step_length;

        let p = direction;
        let g_initial = 0.5 * f.magnitude_squared();

        // Start out with some alphas that don't decrease too quickly, then
        // decrease them much faster if the first few trials don't let us take a step.
        let initial_alphas = [0.0, 1.0, 0.75, 0.5];
        let mut alpha_iter = initial_alphas
            .iter()
            .copied()
            .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

        let mut alpha_prev = alpha_iter.next().unwrap();
        let mut alpha = alpha_iter.next().unwrap();

        loop {
            // x^{k + 1} = x^0 + alpha^k * p = x^k + (alpha^k - alpha^{k - 1}) * p
            x.axpy(alpha - alpha_prev, &p, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x))?;

            let g = 0.5 * f.magnitude_squared();
            if g.is_finite() && g <= (1.0 - c * alpha) * g_initial {
                break;
            } else if alpha < alpha_min {
                return Err(Box::from(format!(
                    "Failed to produce valid step. \
                    Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, alpha_min
                )));
            } else {
                debug!("Rejected step length {} (merit {}, initial merit {})", alpha, g, g_initial);
                alpha_prev = alpha;
                alpha = alpha_iter.next().unwrap();
            }
        }

        Ok(alpha)
    }
}
