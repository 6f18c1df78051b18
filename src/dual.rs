//! Forward-mode automatic differentiation with (nestable) dual numbers.
//!
//! A dual number $a = a_v + a_d \varepsilon$ with $\varepsilon^2 = 0$ carries a value together
//! with a directional derivative. Since [`Dual`] is generic over any [`Number`], and is itself a
//! [`Number`], dual numbers nest: in a second-order dual `Dual<Dual<T>>` the four real components
//! are
//!
//! | component                  | meaning                                  |
//! |----------------------------|------------------------------------------|
//! | `value.value`              | function value                           |
//! | `value.derivative`         | first partial along the inner seed       |
//! | `derivative.value`         | first partial along the outer seed       |
//! | `derivative.derivative`    | mixed second partial                     |
//!
//! Every rule below is written once in terms of the component type, so nesting composes the
//! product, quotient and chain rules recursively without any special-casing.
use adform_traits::Number;
use num::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// A dual number `value + derivative * ε`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dual<V> {
    pub value: V,
    pub derivative: V,
}

/// A first-order dual number over the real type `T`.
pub type Dual1<T> = Dual<T>;

/// A second-order (nested) dual number over the real type `T`.
pub type Dual2<T> = Dual<Dual<T>>;

impl<V> Dual<V> {
    #[inline]
    pub fn new(value: V, derivative: V) -> Self {
        Self { value, derivative }
    }
}

impl<V: Number> Dual<V> {
    /// A dual with vanishing derivative.
    #[inline]
    pub fn constant(value: V) -> Self {
        Self::new(value, V::zero())
    }

    /// A dual seeded with unit derivative.
    #[inline]
    pub fn variable(value: V) -> Self {
        Self::new(value, V::one())
    }

    /// Applies the chain rule, given $f(a_v)$ and $f'(a_v)$.
    #[inline]
    fn chain(self, f: V, df: V) -> Self {
        Self::new(f, self.derivative * df)
    }
}

impl<V: Number> Display for Dual<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) + ({})ε", self.value, self.derivative)
    }
}

impl<V: Number> Neg for Dual<V> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.value, -self.derivative)
    }
}

impl<V: Number> Add for Dual<V> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.value + rhs.value, self.derivative + rhs.derivative)
    }
}

impl<V: Number> Sub for Dual<V> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.value - rhs.value, self.derivative - rhs.derivative)
    }
}

impl<V: Number> Mul for Dual<V> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.value * rhs.value,
            self.value * rhs.derivative + self.derivative * rhs.value,
        )
    }
}

impl<V: Number> Div for Dual<V> {
    type Output = Self;

    /// Division by a dual with vanishing value produces non-finite components.
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.value / rhs.value,
            (self.derivative * rhs.value - self.value * rhs.derivative) / (rhs.value * rhs.value),
        )
    }
}

macro_rules! impl_assign_ops {
    ($($trait:ident, $method:ident, $op:tt);*) => {$(
        impl<V: Number> $trait for Dual<V> {
            #[inline]
            fn $method(&mut self, rhs: Self) {
                *self = *self $op rhs;
            }
        }
    )*};
}

impl_assign_ops!(AddAssign, add_assign, +; SubAssign, sub_assign, -; MulAssign, mul_assign, *; DivAssign, div_assign, /);

// Mixed arithmetic with a plain real. The real is treated as a dual with zero derivative.
macro_rules! impl_primal_ops {
    ($($primal:ty),*) => {$(
        impl<V: Number<Primal = $primal>> Add<$primal> for Dual<V> {
            type Output = Self;

            #[inline]
            fn add(self, rhs: $primal) -> Self {
                Self::new(self.value + V::from_primal(rhs), self.derivative)
            }
        }

        impl<V: Number<Primal = $primal>> Add<Dual<V>> for $primal {
            type Output = Dual<V>;

            #[inline]
            fn add(self, rhs: Dual<V>) -> Dual<V> {
                rhs + self
            }
        }

        impl<V: Number<Primal = $primal>> Sub<$primal> for Dual<V> {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: $primal) -> Self {
                Self::new(self.value - V::from_primal(rhs), self.derivative)
            }
        }

        impl<V: Number<Primal = $primal>> Sub<Dual<V>> for $primal {
            type Output = Dual<V>;

            #[inline]
            fn sub(self, rhs: Dual<V>) -> Dual<V> {
                Dual::new(V::from_primal(self) - rhs.value, -rhs.derivative)
            }
        }

        impl<V: Number<Primal = $primal>> Mul<$primal> for Dual<V> {
            type Output = Self;

            #[inline]
            fn mul(self, rhs: $primal) -> Self {
                self.scale(rhs)
            }
        }

        impl<V: Number<Primal = $primal>> Mul<Dual<V>> for $primal {
            type Output = Dual<V>;

            #[inline]
            fn mul(self, rhs: Dual<V>) -> Dual<V> {
                rhs.scale(self)
            }
        }

        impl<V: Number<Primal = $primal>> Div<$primal> for Dual<V> {
            type Output = Self;

            #[inline]
            fn div(self, rhs: $primal) -> Self {
                let rhs = V::from_primal(rhs);
                Self::new(self.value / rhs, self.derivative / rhs)
            }
        }

        impl<V: Number<Primal = $primal>> Div<Dual<V>> for $primal {
            type Output = Dual<V>;

            #[inline]
            fn div(self, rhs: Dual<V>) -> Dual<V> {
                Dual::from_primal(self) / rhs
            }
        }

        impl<V: Number<Primal = $primal>> AddAssign<$primal> for Dual<V> {
            #[inline]
            fn add_assign(&mut self, rhs: $primal) {
                *self = *self + rhs;
            }
        }

        impl<V: Number<Primal = $primal>> SubAssign<$primal> for Dual<V> {
            #[inline]
            fn sub_assign(&mut self, rhs: $primal) {
                *self = *self - rhs;
            }
        }

        impl<V: Number<Primal = $primal>> MulAssign<$primal> for Dual<V> {
            #[inline]
            fn mul_assign(&mut self, rhs: $primal) {
                *self = *self * rhs;
            }
        }

        impl<V: Number<Primal = $primal>> DivAssign<$primal> for Dual<V> {
            #[inline]
            fn div_assign(&mut self, rhs: $primal) {
                *self = *self / rhs;
            }
        }
    )*};
}

impl_primal_ops!(f32, f64);

impl<V: Number> Zero for Dual<V> {
    #[inline]
    fn zero() -> Self {
        Self::new(V::zero(), V::zero())
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.value.is_zero() && self.derivative.is_zero()
    }
}

impl<V: Number> One for Dual<V> {
    #[inline]
    fn one() -> Self {
        Self::constant(V::one())
    }
}

impl<V: Number> Sum for Dual<V> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, x| acc + x)
    }
}

impl<'a, V: Number> Sum<&'a Dual<V>> for Dual<V> {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl<V: Number> Product for Dual<V> {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::one(), |acc, x| acc * x)
    }
}

impl<V: Number> Number for Dual<V> {
    type Primal = V::Primal;

    #[inline]
    fn from_primal(x: Self::Primal) -> Self {
        Self::constant(V::from_primal(x))
    }

    #[inline]
    fn from_f64(x: f64) -> Self {
        Self::constant(V::from_f64(x))
    }

    #[inline]
    fn primal(&self) -> Self::Primal {
        self.value.primal()
    }

    #[inline]
    fn scale(self, factor: Self::Primal) -> Self {
        Self::new(self.value.scale(factor), self.derivative.scale(factor))
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.value.is_finite() && self.derivative.is_finite()
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.value.exp();
        self.chain(e, e)
    }

    #[inline]
    fn exp2(self) -> Self {
        let e = self.value.exp2();
        self.chain(e, e * V::from_f64(std::f64::consts::LN_2))
    }

    #[inline]
    fn exp_m1(self) -> Self {
        self.chain(self.value.exp_m1(), self.value.exp())
    }

    #[inline]
    fn ln(self) -> Self {
        self.chain(self.value.ln(), self.value.recip())
    }

    #[inline]
    fn log2(self) -> Self {
        let ln_2 = V::from_f64(std::f64::consts::LN_2);
        self.chain(self.value.log2(), (self.value * ln_2).recip())
    }

    #[inline]
    fn log10(self) -> Self {
        let ln_10 = V::from_f64(std::f64::consts::LN_10);
        self.chain(self.value.log10(), (self.value * ln_10).recip())
    }

    #[inline]
    fn ln_1p(self) -> Self {
        self.chain(self.value.ln_1p(), (V::one() + self.value).recip())
    }

    #[inline]
    fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.chain(s, (s + s).recip())
    }

    #[inline]
    fn cbrt(self) -> Self {
        let c = self.value.cbrt();
        self.chain(c, (V::from_f64(3.0) * c * c).recip())
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            Self::one()
        } else {
            let df = V::from_f64(f64::from(n)) * self.value.powi(n - 1);
            self.chain(self.value.powi(n), df)
        }
    }

    #[inline]
    fn powf(self, n: Self) -> Self {
        // d(a^b) = b a^(b - 1) a' + a^b ln(a) b'
        let f = self.value.powf(n.value);
        let base_term = n.value * self.value.powf(n.value - V::one()) * self.derivative;
        // ln(a) is only needed for a varying exponent, and is undefined for a <= 0
        let derivative = if n.derivative.is_zero() {
            base_term
        } else {
            base_term + f * self.value.ln() * n.derivative
        };
        Self::new(f, derivative)
    }

    #[inline]
    fn powr(self, n: Self::Primal) -> Self {
        let df = self.value.powr(n - <Self::Primal as One>::one()).scale(n);
        self.chain(self.value.powr(n), df)
    }

    #[inline]
    fn recip(self) -> Self {
        let r = self.value.recip();
        self.chain(r, -(r * r))
    }

    #[inline]
    fn abs(self) -> Self {
        if self.primal() >= <Self::Primal as Zero>::zero() {
            self
        } else {
            -self
        }
    }

    #[inline]
    fn sin(self) -> Self {
        self.chain(self.value.sin(), self.value.cos())
    }

    #[inline]
    fn cos(self) -> Self {
        self.chain(self.value.cos(), -self.value.sin())
    }

    #[inline]
    fn tan(self) -> Self {
        let t = self.value.tan();
        self.chain(t, V::one() + t * t)
    }

    #[inline]
    fn asin(self) -> Self {
        let df = (V::one() - self.value * self.value).sqrt().recip();
        self.chain(self.value.asin(), df)
    }

    #[inline]
    fn acos(self) -> Self {
        let df = -(V::one() - self.value * self.value).sqrt().recip();
        self.chain(self.value.acos(), df)
    }

    #[inline]
    fn atan(self) -> Self {
        let df = (V::one() + self.value * self.value).recip();
        self.chain(self.value.atan(), df)
    }

    #[inline]
    fn atan2(self, other: Self) -> Self {
        // self = y, other = x
        let (y, x) = (self.value, other.value);
        let denominator = x * x + y * y;
        Self::new(
            y.atan2(x),
            (x * self.derivative - y * other.derivative) / denominator,
        )
    }

    #[inline]
    fn sinh(self) -> Self {
        self.chain(self.value.sinh(), self.value.cosh())
    }

    #[inline]
    fn cosh(self) -> Self {
        self.chain(self.value.cosh(), self.value.sinh())
    }

    #[inline]
    fn tanh(self) -> Self {
        let t = self.value.tanh();
        self.chain(t, V::one() - t * t)
    }

    #[inline]
    fn asinh(self) -> Self {
        let df = (self.value * self.value + V::one()).sqrt().recip();
        self.chain(self.value.asinh(), df)
    }

    #[inline]
    fn acosh(self) -> Self {
        let df = (self.value * self.value - V::one()).sqrt().recip();
        self.chain(self.value.acosh(), df)
    }

    #[inline]
    fn atanh(self) -> Self {
        let df = (V::one() - self.value * self.value).recip();
        self.chain(self.value.atanh(), df)
    }

    #[inline]
    fn hypot(self, other: Self) -> Self {
        let h = self.value.hypot(other.value);
        Self::new(h, (self.value * self.derivative + other.value * other.derivative) / h)
    }
}

/// Evaluates the derivative of a scalar function at `x` with a first-order dual.
pub fn derivative<T, F>(f: F, x: T) -> (T, T)
where
    T: Number,
    F: FnOnce(Dual<T>) -> Dual<T>,
{
    let y = f(Dual::variable(x));
    (y.value, y.derivative)
}

/// Evaluates the first and second derivative of a scalar function at `x` with a second-order
/// dual.
///
/// Returns `(f(x), f'(x), f''(x))`.
pub fn second_derivative<T, F>(f: F, x: T) -> (T, T, T)
where
    T: Number,
    F: FnOnce(Dual2<T>) -> Dual2<T>,
{
    let seeded = Dual::new(Dual::variable(x), Dual::constant(T::one()));
    let y = f(seeded);
    (y.value.value, y.value.derivative, y.derivative.derivative)
}
