use adform::assembly::{AssemblyError, EnergyFormBuilder};
use adform::dual::Dual;
use adform::functional::{
    EnergyFunctional, EvaluateEnergy, FnFunctional, LameParameters, LinearElasticEnergy, NeoHookeanEnergy,
    QuadraticEnergy, QuadraturePoint, SumOfSquares, YoungPoisson,
};
use adform::interpolate::SparseInterpolator;
use adform::layout::{SampleView, VariableTable};
use adform::Number;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Matrix3};
use util::assert_panics;

/// Gradient of a functional with respect to the sample buffer, one dual seed per sample.
fn sample_gradient<F: EnergyFunctional<f64>>(functional: &F, table: &VariableTable, samples: &[f64]) -> DVector<f64> {
    let mut duals: Vec<_> = samples.iter().copied().map(Dual::constant).collect();
    DVector::from_fn(samples.len(), |i, _| {
        duals[i].derivative = 1.0;
        let energy = functional.evaluate(&SampleView::new(table, duals.as_slice()));
        duals[i].derivative = 0.0;
        energy.derivative
    })
}

fn energy<F: EnergyFunctional<f64>>(functional: &F, table: &VariableTable, samples: &[f64]) -> f64 {
    functional.evaluate(&SampleView::new(table, samples))
}

fn elasticity_table(dim: usize) -> (VariableTable, QuadraturePoint) {
    let mut table = VariableTable::new();
    let weight = table.add_variable("w", 0, &[]).unwrap();
    let deformation_gradient = table.add_variable("F", 0, &[dim, dim]).unwrap();
    table.finalize();
    let point = QuadraturePoint {
        deformation_gradient,
        weight,
    };
    (table, point)
}

#[rustfmt::skip]
const DEFORMATION_GRADIENT: [f64; 9] = [
    1.1, 0.2, 0.0,
    0.1, 0.9, 0.05,
    0.0, 0.1, 1.2,
];

fn elasticity_samples(weight: f64) -> Vec<f64> {
    let mut samples = vec![weight];
    samples.extend_from_slice(&DEFORMATION_GRADIENT);
    samples
}

#[test]
fn sum_of_squares() {
    let mut table = VariableTable::new();
    let a = table.add_variable("a", 0, &[2]).unwrap();
    table.add_variable("b", 0, &[]).unwrap();
    table.finalize();
    let samples = [1.0, 2.0, 3.0];

    assert_eq!(energy(&SumOfSquares::new(), &table, &samples), 14.0);
    assert_eq!(energy(&SumOfSquares::new().with_scale(0.5), &table, &samples), 7.0);
    assert_eq!(energy(&SumOfSquares::new().restricted_to(a), &table, &samples), 5.0);

    let gradient = sample_gradient(&SumOfSquares::new().restricted_to(a), &table, &samples);
    assert_eq!(gradient, DVector::from_vec(vec![2.0, 4.0, 0.0]));
}

#[test]
fn quadratic_energy_gradient() {
    let mut table = VariableTable::new();
    table.add_variable("s", 0, &[3]).unwrap();
    table.finalize();

    let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, -1.0, 0.0, -1.0, 2.0]);
    let b = DVector::from_vec(vec![1.0, -2.0, 0.5]);
    let functional = QuadraticEnergy::new(a.clone(), b.clone());
    let s = DVector::from_vec(vec![0.3, -0.7, 1.1]);

    let expected_energy = 0.5 * s.dot(&(&a * &s)) - b.dot(&s);
    assert_scalar_eq!(energy(&functional, &table, s.as_slice()), expected_energy, comp = abs, tol = 1e-14);

    let gradient = sample_gradient(&functional, &table, s.as_slice());
    assert_matrix_eq!(gradient, &a * &s - &b, comp = abs, tol = 1e-14);
}

#[test]
fn quadratic_energy_requires_consistent_dimensions() {
    assert_panics!(QuadraticEnergy::new(DMatrix::<f64>::identity(2, 3), DVector::zeros(2)));
    assert_panics!(QuadraticEnergy::new(DMatrix::<f64>::identity(3, 3), DVector::zeros(2)));
}

#[test]
fn lame_parameters_from_young_poisson() {
    let LameParameters { mu, lambda } = LameParameters::from(YoungPoisson {
        young: 2.0,
        poisson: 0.25,
    });
    assert_scalar_eq!(mu, 0.8, comp = abs, tol = 1e-15);
    assert_scalar_eq!(lambda, 0.8, comp = abs, tol = 1e-15);
}

#[test]
fn neo_hookean_energy_vanishes_at_identity() {
    let (table, point) = elasticity_table(2);
    let functional = NeoHookeanEnergy::new(LameParameters { mu: 2.0, lambda: 5.0 }).with_quadrature_point(point);
    let samples = [0.5, 1.0, 0.0, 0.0, 1.0];
    assert_scalar_eq!(energy(&functional, &table, &samples), 0.0, comp = abs, tol = 1e-15);
    let gradient = sample_gradient(&functional, &table, &samples);
    assert_matrix_eq!(gradient, DVector::<f64>::zeros(5), comp = abs, tol = 1e-14);
}

#[test]
#[allow(non_snake_case)]
fn neo_hookean_gradient_is_first_piola_kirchhoff_stress() {
    let (mu, lambda, weight) = (2.0, 5.0, 0.25);
    let (table, point) = elasticity_table(3);
    let functional = NeoHookeanEnergy::new(LameParameters { mu, lambda }).with_quadrature_point(point);
    let samples = elasticity_samples(weight);

    // P = mu (F - F^{-T}) + lambda ln(J) F^{-T}
    let F = Matrix3::from_row_slice(&DEFORMATION_GRADIENT);
    let J = F.determinant();
    let F_inv_t = F.try_inverse().unwrap().transpose();
    let P = (F - F_inv_t) * mu + F_inv_t * (lambda * J.ln());

    let psi = 0.5 * mu * ((F.transpose() * F).trace() - 3.0) - mu * J.ln() + 0.5 * lambda * J.ln().powi(2);
    assert_scalar_eq!(energy(&functional, &table, &samples), weight * psi, comp = abs, tol = 1e-13);

    let gradient = sample_gradient(&functional, &table, &samples);
    // The derivative with respect to the weight is the energy density itself
    assert_scalar_eq!(gradient[0], psi, comp = abs, tol = 1e-13);
    for i in 0..3 {
        for j in 0..3 {
            assert_scalar_eq!(gradient[1 + 3 * i + j], weight * P[(i, j)], comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn neo_hookean_energy_of_inverted_element_is_not_finite() {
    let (table, point) = elasticity_table(2);
    let functional = NeoHookeanEnergy::new(LameParameters { mu: 1.0, lambda: 1.0 }).with_quadrature_point(point);
    // det F = -1
    let samples = [1.0, -1.0, 0.0, 0.0, 1.0];
    assert!(!energy(&functional, &table, &samples).is_finite());
}

#[test]
#[allow(non_snake_case)]
fn linear_elastic_gradient_is_linear_stress() {
    let (mu, lambda, weight) = (3.0, 1.5, 2.0);
    let (table, point) = elasticity_table(3);
    let functional = LinearElasticEnergy::new(LameParameters { mu, lambda }).with_quadrature_point(point);
    let samples = elasticity_samples(weight);

    let F = Matrix3::from_row_slice(&DEFORMATION_GRADIENT);
    let eps = (F + F.transpose()) * 0.5 - Matrix3::identity();
    let sigma = eps * (2.0 * mu) + Matrix3::identity() * (lambda * eps.trace());

    let gradient = sample_gradient(&functional, &table, &samples);
    for i in 0..3 {
        for j in 0..3 {
            assert_scalar_eq!(gradient[1 + 3 * i + j], weight * sigma[(i, j)], comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn elasticity_variables_are_validated() {
    let mut table = VariableTable::new();
    let weight = table.add_variable("w", 0, &[]).unwrap();
    let rectangular = table.add_variable("F", 0, &[2, 3]).unwrap();
    let square = table.add_variable("G", 0, &[2, 2]).unwrap();
    table.finalize();

    let invalid_gradient = NeoHookeanEnergy::<f64>::new(LameParameters { mu: 1.0, lambda: 1.0 }).with_quadrature_point(
        QuadraturePoint {
            deformation_gradient: rectangular,
            weight,
        },
    );
    assert!(matches!(
        invalid_gradient.validate(&table),
        Err(AssemblyError::InvalidVariable { name, .. }) if name == "F"
    ));

    let invalid_weight = LinearElasticEnergy::<f64>::new(LameParameters { mu: 1.0, lambda: 1.0 }).with_quadrature_point(
        QuadraturePoint {
            deformation_gradient: square,
            weight: square,
        },
    );
    assert!(matches!(
        invalid_weight.validate(&table),
        Err(AssemblyError::InvalidVariable { name, .. }) if name == "G"
    ));

    let valid = NeoHookeanEnergy::<f64>::new(LameParameters { mu: 1.0, lambda: 1.0 }).with_quadrature_point(
        QuadraturePoint {
            deformation_gradient: square,
            weight,
        },
    );
    assert_eq!(valid.validate(&table), Ok(()));
    assert_eq!(valid.quadrature_points().len(), 1);
}

#[test]
fn building_a_form_validates_the_functional() {
    // A 4x4 deformation gradient has no supported determinant
    let mut table = VariableTable::new();
    let weight = table.add_variable("w", 0, &[]).unwrap();
    let gradient = table.add_variable("F", 0, &[4, 4]).unwrap();
    table.finalize();
    let neo_hookean = NeoHookeanEnergy::<f64>::new(LameParameters { mu: 1.0, lambda: 1.0 }).with_quadrature_point(
        QuadraturePoint {
            deformation_gradient: gradient,
            weight,
        },
    );
    let error = EnergyFormBuilder::<f64, _, _>::new(table.clone())
        .with_functional(&neo_hookean)
        .with_interpolation(SparseInterpolator::identity(17))
        .build()
        .err();
    assert!(matches!(
        error,
        Some(AssemblyError::InvalidVariable { name, .. }) if name == "F"
    ));

    // Composite functionals validate each of their parts
    let sum = SumOfSquares::<f64>::new().plus(neo_hookean.clone().scaled(2.0));
    assert!(matches!(
        sum.validate(&table),
        Err(AssemblyError::InvalidVariable { name, .. }) if name == "F"
    ));

    let quadratic = QuadraticEnergy::new(DMatrix::<f64>::identity(3, 3), DVector::zeros(3));
    let error = EnergyFormBuilder::<f64, _, _>::new(table)
        .with_functional(SumOfSquares::<f64>::new().plus(quadratic))
        .with_interpolation(SparseInterpolator::identity(17))
        .build()
        .err();
    assert_eq!(
        error,
        Some(AssemblyError::FunctionalSampleCountMismatch {
            layout: 17,
            functional: 3,
        })
    );
}

struct CubeOfFirstSample;

impl EvaluateEnergy<f64> for CubeOfFirstSample {
    fn evaluate_energy<N>(&self, samples: &[N]) -> N
    where
        N: Number<Primal = f64>,
    {
        samples[0] * samples[0] * samples[0]
    }
}

#[test]
fn combinators_add_and_scale_functionals() {
    let mut table = VariableTable::new();
    table.add_variable("s", 0, &[2]).unwrap();
    table.finalize();
    let samples = [2.0, 3.0];

    let combined = FnFunctional(CubeOfFirstSample)
        .plus(SumOfSquares::new())
        .scaled(0.5);
    // 0.5 * (8 + 4 + 9)
    assert_eq!(energy(&combined, &table, &samples), 10.5);
    let gradient = sample_gradient(&combined, &table, &samples);
    // 0.5 * (3 s_0^2 + 2 s_0, 2 s_1)
    assert_eq!(gradient, DVector::from_vec(vec![8.0, 3.0]));
}
