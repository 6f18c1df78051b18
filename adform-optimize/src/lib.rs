//! Nonlinear solvers for systems whose residual and Jacobian are provided by the caller.
//!
//! The main entry points are [`newton::newton`] and [`newton::newton_line_search`], which
//! operate on anything implementing [`calculus::DifferentiableVectorFunction`].

/// Function traits and finite difference approximations
pub mod calculus;
/// Implementations of the Newton method with different line search strategies
pub mod newton;
