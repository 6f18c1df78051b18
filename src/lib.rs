//! Residuals and Jacobians of finite element energy functionals by forward-mode automatic
//! differentiation.
//!
//! An energy functional is written once, generically over [`Number`], and evaluated on nested
//! [`dual::Dual`] numbers to obtain its gradient (the residual) and Hessian (the Jacobian) with
//! respect to the element degrees of freedom. See [`assembly`] for the entry points.

pub mod assembly;
pub mod dual;
pub mod functional;
pub mod interpolate;
pub mod kernels;
pub mod layout;
pub mod nonlinear;
pub mod tensor;

pub mod optimize {
    pub use adform_optimize::*;
}

pub mod expr {
    pub use adform_expr::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub use adform_traits::{Number, Real, RealNumber};

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
