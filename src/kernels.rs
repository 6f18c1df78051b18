//! Approximate transcendental kernels built purely from arithmetic.
//!
//! The kernels are generic over [`Number`] and use nothing but the arithmetic operators
//! (and `sqrt` for the inverse hyperbolic functions), so evaluating them on dual numbers
//! differentiates *through* the approximation. The derivative is then exact for the
//! approximation, and accurate for the approximated function to the precision of the kernel.
//!
//! The kernels are intended for targets where intrinsics are unavailable or must be avoided.
//! On moderate arguments (say $|x| \leq 4$ for the exponential, $x \in [10^{-3}, 10^{3}]$ for the
//! logarithm) the relative error compared to the `f64` intrinsics is below $10^{-6}$.
use adform_traits::Number;
use numeric_literals::replace_float_literals;

/// Number of squarings performed by [`exp_by_squaring`].
pub const EXP_SQUARINGS: u32 = 25;

/// Number of Halley iterations performed by [`ln_halley`].
pub const LN_HALLEY_ITERATIONS: usize = 10;

/// Approximates $e^x$ as $(1 + x / 2^{25})^{2^{25}}$ by repeated squaring.
#[replace_float_literals(N::from_f64(literal))]
pub fn exp_by_squaring<N: Number>(x: N) -> N {
    let scale = N::from_f64(f64::from(2u32.pow(EXP_SQUARINGS)));
    let mut result = 1.0 + x / scale;
    for _ in 0..EXP_SQUARINGS {
        result = result * result;
    }
    result
}

/// Approximates $\ln x$ by Halley's method on $e^B - x = 0$, starting from $B = 0$.
///
/// The update is $B \leftarrow B - 2 (e^B - x) / (e^B + x)$ with the exponential computed by
/// [`exp_by_squaring`]. Non-positive `x` yields non-finite or meaningless results, like the
/// intrinsic.
#[replace_float_literals(N::from_f64(literal))]
pub fn ln_halley<N: Number>(x: N) -> N {
    let mut b = 0.0;
    for _ in 0..LN_HALLEY_ITERATIONS {
        let exp_b = exp_by_squaring(b);
        b = b - 2.0 * (exp_b - x) / (exp_b + x);
    }
    b
}

pub fn log10_halley<N: Number>(x: N) -> N {
    ln_halley(x) / ln_halley(N::from_f64(10.0))
}

pub fn log2_halley<N: Number>(x: N) -> N {
    ln_halley(x) / ln_halley(N::from_f64(2.0))
}

pub fn exp2_by_squaring<N: Number>(x: N) -> N {
    exp_by_squaring(x * ln_halley(N::from_f64(2.0)))
}

pub fn expm1_by_squaring<N: Number>(x: N) -> N {
    exp_by_squaring(x) - N::one()
}

#[replace_float_literals(N::from_f64(literal))]
pub fn cosh_from_exp<N: Number>(x: N) -> N {
    0.5 * (exp_by_squaring(x) + exp_by_squaring(-x))
}

#[replace_float_literals(N::from_f64(literal))]
pub fn sinh_from_exp<N: Number>(x: N) -> N {
    0.5 * (exp_by_squaring(x) - exp_by_squaring(-x))
}

pub fn tanh_from_exp<N: Number>(x: N) -> N {
    let exp_plus = exp_by_squaring(x);
    let exp_minus = exp_by_squaring(-x);
    (exp_plus - exp_minus) / (exp_plus + exp_minus)
}

pub fn acosh_from_ln<N: Number>(x: N) -> N {
    ln_halley(x + (x * x - N::one()).sqrt())
}

pub fn asinh_from_ln<N: Number>(x: N) -> N {
    ln_halley(x + (x * x + N::one()).sqrt())
}

#[replace_float_literals(N::from_f64(literal))]
pub fn atanh_from_ln<N: Number>(x: N) -> N {
    0.5 * ln_halley((1.0 + x) / (1.0 - x))
}
