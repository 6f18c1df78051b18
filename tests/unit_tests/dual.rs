use adform::dual::{derivative, second_derivative, Dual, Dual2};
use adform::optimize::calculus::approximate_derivative_fd;
use adform::Number;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;
use std::f64::consts::PI;

fn check_against_fd<F, G>(name: &str, f_dual: F, f: G, x: f64)
where
    F: Fn(Dual<f64>) -> Dual<f64>,
    G: Fn(f64) -> f64,
{
    let (value, df) = derivative(&f_dual, x);
    let df_fd = approximate_derivative_fd(&f, x, 1e-6);
    let tol = 1e-6 * f64::max(1.0, df_fd.abs());
    assert!(
        (value - f(x)).abs() <= 1e-12 * f64::max(1.0, f(x).abs()),
        "value of {} at {}",
        name,
        x
    );
    assert!(
        (df - df_fd).abs() <= tol,
        "derivative of {} at {}: dual {}, finite difference {}",
        name,
        x,
        df,
        df_fd
    );
}

#[test]
fn constant_and_variable_seeds() {
    let c = Dual::constant(3.0);
    let v = Dual::variable(3.0);
    assert_eq!(c, Dual::new(3.0, 0.0));
    assert_eq!(v, Dual::new(3.0, 1.0));
    assert_eq!(Dual::<f64>::from_f64(2.0), Dual::new(2.0, 0.0));
    assert_eq!(v.primal(), 3.0);
    assert_eq!(v.scale(2.0), Dual::new(6.0, 2.0));
}

#[test]
fn arithmetic_rules() {
    let a = Dual::new(2.0, 3.0);
    let b = Dual::new(5.0, -1.0);

    assert_eq!(a + b, Dual::new(7.0, 2.0));
    assert_eq!(a - b, Dual::new(-3.0, 4.0));
    assert_eq!(-a, Dual::new(-2.0, -3.0));
    // (a b)' = a' b + a b'
    assert_eq!(a * b, Dual::new(10.0, 13.0));
    // (a / b)' = (a' b - a b') / b^2
    let q = a / b;
    assert_scalar_eq!(q.value, 0.4, comp = abs, tol = 1e-15);
    assert_scalar_eq!(q.derivative, (3.0 * 5.0 + 2.0) / 25.0, comp = abs, tol = 1e-15);

    let mut c = a;
    c += b;
    c *= b;
    assert_eq!(c, (a + b) * b);
}

#[test]
fn mixed_primal_operations() {
    let x = Dual::new(2.0, 1.0);
    assert_eq!(x + 1.0, Dual::new(3.0, 1.0));
    assert_eq!(1.0 + x, Dual::new(3.0, 1.0));
    assert_eq!(x - 1.0, Dual::new(1.0, 1.0));
    assert_eq!(1.0 - x, Dual::new(-1.0, -1.0));
    assert_eq!(3.0 * x, Dual::new(6.0, 3.0));
    assert_eq!(x * 3.0, Dual::new(6.0, 3.0));
    assert_eq!(x / 2.0, Dual::new(1.0, 0.5));
    // d/dx (1 / x) = -1 / x^2
    assert_eq!(1.0 / x, Dual::new(0.5, -0.25));

    let y = Dual::new(2.0f32, 1.0f32);
    assert_eq!(2.0f32 * y, Dual::new(4.0f32, 2.0f32));
}

#[test]
fn sum_and_product_of_iterators() {
    let values = [Dual::new(1.0, 1.0), Dual::new(2.0, 0.0), Dual::new(3.0, 2.0)];
    let sum: Dual<f64> = values.iter().sum();
    assert_eq!(sum, Dual::new(6.0, 3.0));
    let product: Dual<f64> = values.iter().copied().product();
    // (1 + e)(2)(3 + 2e) = 6 + 6e + 4e
    assert_eq!(product, Dual::new(6.0, 10.0));
}

#[test]
fn product_rule_matches_finite_differences() {
    for &x in &[-2.0, -0.5, 0.0, 0.7, 3.0] {
        check_against_fd(
            "x^2 sin(x) exp(x)",
            |x| x * x * x.sin() * x.exp(),
            |x| x * x * x.sin() * x.exp(),
            x,
        );
    }
}

#[test]
fn elementary_functions_match_finite_differences() {
    check_against_fd("exp", |x| x.exp(), f64::exp, 0.7);
    check_against_fd("exp2", |x| x.exp2(), f64::exp2, 0.7);
    check_against_fd("exp_m1", |x| x.exp_m1(), f64::exp_m1, 0.3);
    check_against_fd("ln", |x| x.ln(), f64::ln, 1.7);
    check_against_fd("log2", |x| x.log2(), f64::log2, 1.7);
    check_against_fd("log10", |x| x.log10(), f64::log10, 1.7);
    check_against_fd("ln_1p", |x| x.ln_1p(), f64::ln_1p, 0.4);
    check_against_fd("sqrt", |x| x.sqrt(), f64::sqrt, 2.5);
    check_against_fd("cbrt", |x| x.cbrt(), f64::cbrt, 2.5);
    check_against_fd("cbrt", |x| x.cbrt(), f64::cbrt, -2.5);
    check_against_fd("powi", |x| x.powi(3), |x| x.powi(3), 1.2);
    check_against_fd("powi", |x| x.powi(-2), |x| x.powi(-2), 1.2);
    check_against_fd("powr", |x| x.powr(2.5), |x| x.powf(2.5), 1.4);
    check_against_fd("powf", |x| x.powf(x), |x| x.powf(x), 1.5);
    check_against_fd("recip", |x| x.recip(), f64::recip, 1.3);
    check_against_fd("abs", |x| x.abs(), f64::abs, -0.8);
    check_against_fd("abs", |x| x.abs(), f64::abs, 0.8);
    check_against_fd("sin", |x| x.sin(), f64::sin, 0.6);
    check_against_fd("cos", |x| x.cos(), f64::cos, 0.6);
    check_against_fd("tan", |x| x.tan(), f64::tan, 0.6);
    check_against_fd("asin", |x| x.asin(), f64::asin, 0.3);
    check_against_fd("acos", |x| x.acos(), f64::acos, 0.3);
    check_against_fd("atan", |x| x.atan(), f64::atan, 0.9);
    check_against_fd("atan2", |x| x.atan2(Dual::constant(2.0)), |x| x.atan2(2.0), 0.9);
    check_against_fd("atan2", |x| Dual::constant(2.0).atan2(x), |x| 2.0f64.atan2(x), 0.9);
    check_against_fd("sinh", |x| x.sinh(), f64::sinh, 0.5);
    check_against_fd("cosh", |x| x.cosh(), f64::cosh, 0.5);
    check_against_fd("tanh", |x| x.tanh(), f64::tanh, 0.5);
    check_against_fd("asinh", |x| x.asinh(), f64::asinh, 0.5);
    check_against_fd("acosh", |x| x.acosh(), f64::acosh, 1.5);
    check_against_fd("atanh", |x| x.atanh(), f64::atanh, 0.5);
    check_against_fd("hypot", |x| x.hypot(2.0 * x + 1.0), |x| x.hypot(2.0 * x + 1.0), 0.8);
    check_against_fd(
        "mul_add",
        |x| x.mul_add(x, Dual::constant(3.0)),
        |x| x.mul_add(x, 3.0),
        0.8,
    );
}

#[test]
fn second_derivative_of_sin_times_square() {
    // f(x) = sin(x) x^2
    for &x in &[-PI, 0.0, 1.3, PI] {
        let (f, df, d2f) = second_derivative(|x: Dual2<f64>| x.sin() * x * x, x);
        assert_scalar_eq!(f, x.sin() * x * x, comp = abs, tol = 1e-12);
        assert_scalar_eq!(df, x.cos() * x * x + 2.0 * x.sin() * x, comp = abs, tol = 1e-12);
        assert_scalar_eq!(d2f, -x.sin() * x * x + 4.0 * x.cos() * x + 2.0 * x.sin(), comp = abs, tol = 1e-12);
    }
}

#[test]
fn second_derivative_of_logarithm_and_power() {
    let (_, df, d2f) = second_derivative(|x: Dual2<f64>| x.ln(), 2.0);
    assert_scalar_eq!(df, 0.5, comp = abs, tol = 1e-15);
    assert_scalar_eq!(d2f, -0.25, comp = abs, tol = 1e-15);

    let (_, df, d2f) = second_derivative(|x: Dual2<f64>| x.powr(3.5), 1.5);
    assert_scalar_eq!(df, 3.5 * 1.5f64.powf(2.5), comp = abs, tol = 1e-12);
    assert_scalar_eq!(d2f, 3.5 * 2.5 * 1.5f64.powf(1.5), comp = abs, tol = 1e-12);
}

#[test]
fn powf_with_constant_exponent_at_non_positive_base() {
    // d/da a^2 = 2a, which must not go through ln(a)
    for &a in &[-2.0, 0.0] {
        let (value, df) = derivative(|x: Dual<f64>| x.powf(Dual::constant(2.0)), a);
        assert_scalar_eq!(value, a * a, comp = abs, tol = 1e-14);
        assert_scalar_eq!(df, 2.0 * a, comp = abs, tol = 1e-14);

        let (f, df, d2f) = second_derivative(|x: Dual2<f64>| x.powf(Dual2::from_f64(3.0)), a);
        assert_scalar_eq!(f, a.powi(3), comp = abs, tol = 1e-14);
        assert_scalar_eq!(df, 3.0 * a * a, comp = abs, tol = 1e-14);
        assert_scalar_eq!(d2f, 6.0 * a, comp = abs, tol = 1e-14);
    }

    let (value, df) = derivative(|x: Dual<f64>| x.powf(Dual::constant(-2.0)), -2.0);
    assert_scalar_eq!(value, 0.25, comp = abs, tol = 1e-15);
    assert_scalar_eq!(df, 0.25, comp = abs, tol = 1e-15);
}

#[test]
fn powf_with_varying_exponent() {
    // d/dx x^(2x) = x^(2x) (2 ln x + 2)
    let x0: f64 = 1.3;
    let (value, df) = derivative(|x: Dual<f64>| x.powf(x * 2.0), x0);
    let f = x0.powf(2.0 * x0);
    assert_scalar_eq!(value, f, comp = abs, tol = 1e-14);
    assert_scalar_eq!(df, f * (2.0 * x0.ln() + 2.0), comp = abs, tol = 1e-12);
}

#[test]
fn nested_seeds_give_mixed_partial_derivatives() {
    // f(x, y) = x^2 y^3
    let (x0, y0) = (1.5, -0.7);
    let x: Dual2<f64> = Dual::new(Dual::new(x0, 1.0), Dual::new(0.0, 0.0));
    let y: Dual2<f64> = Dual::new(Dual::new(y0, 0.0), Dual::new(1.0, 0.0));
    let f = x * x * y * y * y;

    assert_scalar_eq!(f.value.value, x0 * x0 * y0.powi(3), comp = abs, tol = 1e-14);
    assert_scalar_eq!(f.value.derivative, 2.0 * x0 * y0.powi(3), comp = abs, tol = 1e-14);
    assert_scalar_eq!(f.derivative.value, 3.0 * x0 * x0 * y0 * y0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(f.derivative.derivative, 6.0 * x0 * y0 * y0, comp = abs, tol = 1e-14);
}

#[test]
fn invalid_arguments_propagate_non_finite_values() {
    let (value, df) = derivative(|x: Dual<f64>| x.ln(), -1.0);
    assert!(value.is_nan());
    assert!(!Dual::new(value, df).is_finite());

    // sqrt is finite at zero, but its derivative is not
    let y = Dual::variable(0.0).sqrt();
    assert_eq!(y.value, 0.0);
    assert!(!y.is_finite());

    let z = Dual::variable(1.0) / Dual::constant(0.0);
    assert!(!z.is_finite());

    assert!(Dual::variable(1.0).sin().is_finite());
    assert!(!Dual::<Dual<f64>>::from_f64(f64::NAN).is_finite());
}

#[test]
fn primal_selection_follows_primal_values() {
    let a = Dual::new(1.0, 10.0);
    let b = Dual::new(2.0, -10.0);
    assert_eq!(a.max_by_primal(b), b);
    assert_eq!(a.min_by_primal(b), a);
}

proptest! {
    #[test]
    fn product_and_quotient_rules(a in -10.0..10.0f64, da in -10.0..10.0f64,
                                  b in 0.5..10.0f64, db in -10.0..10.0f64) {
        let x = Dual::new(a, da);
        let y = Dual::new(b, db);
        let product = x * y;
        let quotient = x / y;
        prop_assert!((product.derivative - (da * b + a * db)).abs() <= 1e-12 * (1.0 + product.derivative.abs()));
        let expected = (da * b - a * db) / (b * b);
        prop_assert!((quotient.derivative - expected).abs() <= 1e-12 * (1.0 + expected.abs()));
    }

    #[test]
    fn second_order_polynomial_derivatives_are_exact(c0 in -5.0..5.0f64, c1 in -5.0..5.0f64,
                                                     c2 in -5.0..5.0f64, x in -5.0..5.0f64) {
        let (f, df, d2f) = second_derivative(|x: Dual2<f64>| c2 * x * x + c1 * x + c0, x);
        prop_assert!((f - (c2 * x * x + c1 * x + c0)).abs() <= 1e-10);
        prop_assert!((df - (2.0 * c2 * x + c1)).abs() <= 1e-10);
        prop_assert!((d2f - 2.0 * c2).abs() <= 1e-12);
    }
}
