use nalgebra::RealField;
use num::{One, Zero};
use std::fmt::{Debug, Display};
use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub use nalgebra;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// A number that can flow through an energy functional.
///
/// This is implemented for the primitive floating-point types and, in `adform`, recursively
/// for dual numbers over any `Number`. Every elementary function is therefore available at any
/// nesting depth, and a dual implementation only needs to apply the chain rule on top of the
/// implementation of its components.
///
/// The *primal* value of a number is its innermost real component. Functionals must only
/// branch on primal values, so that the control flow is the same for every seed.
pub trait Number:
    Copy
    + Debug
    + Display
    + Default
    + Send
    + Sync
    + 'static
    + Zero
    + One
    + Neg<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Product
{
    /// The innermost real type.
    type Primal: Real;

    /// Lifts a primal real into a number with vanishing derivative components.
    fn from_primal(x: Self::Primal) -> Self;

    /// Lifts an `f64` literal into a number with vanishing derivative components.
    fn from_f64(x: f64) -> Self;

    /// The innermost real component.
    fn primal(&self) -> Self::Primal;

    /// Multiplies every component by a primal real.
    fn scale(self, factor: Self::Primal) -> Self;

    /// Returns `true` if every component (including derivatives) is finite.
    fn is_finite(&self) -> bool;

    fn exp(self) -> Self;
    fn exp2(self) -> Self;
    fn exp_m1(self) -> Self;
    fn ln(self) -> Self;
    fn log2(self) -> Self;
    fn log10(self) -> Self;
    fn ln_1p(self) -> Self;
    fn sqrt(self) -> Self;
    fn cbrt(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn powf(self, n: Self) -> Self;
    /// Raises to a primal (constant) power.
    fn powr(self, n: Self::Primal) -> Self;
    fn recip(self) -> Self;
    fn abs(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn asin(self) -> Self;
    fn acos(self) -> Self;
    fn atan(self) -> Self;
    fn atan2(self, other: Self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn asinh(self) -> Self;
    fn acosh(self) -> Self;
    fn atanh(self) -> Self;
    fn hypot(self, other: Self) -> Self;

    /// Computes `self * a + b`.
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }

    /// Returns whichever of the two numbers has the larger primal value.
    fn max_by_primal(self, other: Self) -> Self {
        if self.primal() >= other.primal() {
            self
        } else {
            other
        }
    }

    /// Returns whichever of the two numbers has the smaller primal value.
    fn min_by_primal(self, other: Self) -> Self {
        if self.primal() <= other.primal() {
            self
        } else {
            other
        }
    }
}

/// A real scalar that is its own primal type, i.e. `f32` or `f64`.
///
/// Used as the bound for the primal type of the assembly routines.
pub trait RealNumber: Real + Number<Primal = Self> {}

impl<T: Real + Number<Primal = T>> RealNumber for T {}

macro_rules! impl_number_for_float {
    ($($float:ident),*) => {$(
        impl Number for $float {
            type Primal = $float;

            #[inline]
            fn from_primal(x: $float) -> Self {
                x
            }

            #[inline]
            fn from_f64(x: f64) -> Self {
                x as $float
            }

            #[inline]
            fn primal(&self) -> $float {
                *self
            }

            #[inline]
            fn scale(self, factor: $float) -> Self {
                self * factor
            }

            #[inline]
            fn is_finite(&self) -> bool {
                $float::is_finite(*self)
            }

            #[inline]
            fn exp(self) -> Self { $float::exp(self) }
            #[inline]
            fn exp2(self) -> Self { $float::exp2(self) }
            #[inline]
            fn exp_m1(self) -> Self { $float::exp_m1(self) }
            #[inline]
            fn ln(self) -> Self { $float::ln(self) }
            #[inline]
            fn log2(self) -> Self { $float::log2(self) }
            #[inline]
            fn log10(self) -> Self { $float::log10(self) }
            #[inline]
            fn ln_1p(self) -> Self { $float::ln_1p(self) }
            #[inline]
            fn sqrt(self) -> Self { $float::sqrt(self) }
            #[inline]
            fn cbrt(self) -> Self { $float::cbrt(self) }
            #[inline]
            fn powi(self, n: i32) -> Self { $float::powi(self, n) }
            #[inline]
            fn powf(self, n: Self) -> Self { $float::powf(self, n) }
            #[inline]
            fn powr(self, n: $float) -> Self { $float::powf(self, n) }
            #[inline]
            fn recip(self) -> Self { $float::recip(self) }
            #[inline]
            fn abs(self) -> Self { $float::abs(self) }
            #[inline]
            fn sin(self) -> Self { $float::sin(self) }
            #[inline]
            fn cos(self) -> Self { $float::cos(self) }
            #[inline]
            fn tan(self) -> Self { $float::tan(self) }
            #[inline]
            fn asin(self) -> Self { $float::asin(self) }
            #[inline]
            fn acos(self) -> Self { $float::acos(self) }
            #[inline]
            fn atan(self) -> Self { $float::atan(self) }
            #[inline]
            fn atan2(self, other: Self) -> Self { $float::atan2(self, other) }
            #[inline]
            fn sinh(self) -> Self { $float::sinh(self) }
            #[inline]
            fn cosh(self) -> Self { $float::cosh(self) }
            #[inline]
            fn tanh(self) -> Self { $float::tanh(self) }
            #[inline]
            fn asinh(self) -> Self { $float::asinh(self) }
            #[inline]
            fn acosh(self) -> Self { $float::acosh(self) }
            #[inline]
            fn atanh(self) -> Self { $float::atanh(self) }
            #[inline]
            fn hypot(self, other: Self) -> Self { $float::hypot(self, other) }
            #[inline]
            fn mul_add(self, a: Self, b: Self) -> Self { $float::mul_add(self, a, b) }
        }
    )*};
}

impl_number_for_float!(f32, f64);
