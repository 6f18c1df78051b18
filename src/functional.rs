//! Energy functionals evaluated over element samples.
//!
//! An energy functional is a pure function of the sample buffer. It is evaluated generically
//! over [`Number`], so that the same code produces energies (`f64`), residual entries
//! (first-order duals) and Jacobian entries (second-order duals). Functionals must only use
//! the arithmetic and elementary functions of [`Number`], and branch on
//! [`primal`](Number::primal) values only.
use crate::assembly::AssemblyError;
use crate::layout::{SampleView, VariableId, VariableTable};
use crate::tensor::{det2, det3, double_contraction, trace, transpose_product_into};
use adform_expr::Expression;
use adform_traits::{Number, RealNumber};
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A scalar energy functional of the sample buffer of an element.
pub trait EnergyFunctional<T: RealNumber> {
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>;

    /// Checks that the functional can be evaluated on samples with the given layout.
    ///
    /// Called when an [`EnergyForm`](crate::assembly::EnergyForm) is built, so that
    /// evaluation never encounters variables of unexpected shape.
    fn validate(&self, _table: &VariableTable) -> Result<(), AssemblyError> {
        Ok(())
    }

    fn plus<G>(self, other: G) -> SumFunctional<Self, G>
    where
        Self: Sized,
        G: EnergyFunctional<T>,
    {
        SumFunctional {
            first: self,
            second: other,
        }
    }

    fn scaled(self, factor: T) -> Scaled<T, Self>
    where
        Self: Sized,
    {
        Scaled { factor, inner: self }
    }
}

impl<T, F> EnergyFunctional<T> for &F
where
    T: RealNumber,
    F: ?Sized + EnergyFunctional<T>,
{
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        F::evaluate(self, samples)
    }

    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        F::validate(self, table)
    }
}

/// An energy defined directly on the flat sample buffer, without reference to the layout.
///
/// Closures cannot be generic over the number type, so layout-free energies implement this
/// trait on a (usually zero-sized) type and are wrapped in [`FnFunctional`].
pub trait EvaluateEnergy<T: RealNumber> {
    fn evaluate_energy<N>(&self, samples: &[N]) -> N
    where
        N: Number<Primal = T>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnFunctional<E>(pub E);

impl<T, E> EnergyFunctional<T> for FnFunctional<E>
where
    T: RealNumber,
    E: EvaluateEnergy<T>,
{
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        self.0.evaluate_energy(samples.samples())
    }
}

/// The energy $e = c \sum_i s_i^2$, summed over all samples or over a single variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SumOfSquares<T> {
    scale: T,
    variable: Option<VariableId>,
}

impl<T: RealNumber> Default for SumOfSquares<T> {
    fn default() -> Self {
        Self {
            scale: T::one(),
            variable: None,
        }
    }
}

impl<T: RealNumber> SumOfSquares<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(self, scale: T) -> Self {
        Self { scale, ..self }
    }

    pub fn restricted_to(self, variable: VariableId) -> Self {
        Self {
            variable: Some(variable),
            ..self
        }
    }
}

impl<T: RealNumber> EnergyFunctional<T> for SumOfSquares<T> {
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        let values = match self.variable {
            Some(id) => samples.slice(id),
            None => samples.samples(),
        };
        values.iter().map(|&s| s * s).sum::<N>().scale(self.scale)
    }
}

/// The quadratic energy $e = \frac{1}{2} s^T A s - b^T s$ over all samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticEnergy<T: RealNumber> {
    matrix: DMatrix<T>,
    rhs: DVector<T>,
}

impl<T: RealNumber> QuadraticEnergy<T> {
    pub fn new(matrix: DMatrix<T>, rhs: DVector<T>) -> Self {
        assert!(matrix.is_square(), "Matrix must be square");
        assert_eq!(matrix.nrows(), rhs.len(), "Matrix and right-hand side dimensions must agree");
        Self { matrix, rhs }
    }

    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<T> {
        &self.rhs
    }
}

impl<T: RealNumber> EnergyFunctional<T> for QuadraticEnergy<T> {
    #[replace_float_literals(N::from_f64(literal))]
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        let s = samples.samples();
        assert_eq!(s.len(), self.rhs.len(), "Sample count must match matrix dimensions");
        let mut energy = N::zero();
        for i in 0..s.len() {
            let a_s_i: N = (0..s.len())
                .map(|j| s[j].scale(self.matrix[(i, j)]))
                .sum();
            energy += 0.5 * s[i] * a_s_i - s[i].scale(self.rhs[i]);
        }
        energy
    }

    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        if table.sample_count() != self.rhs.len() {
            return Err(AssemblyError::FunctionalSampleCountMismatch {
                layout: table.sample_count(),
                functional: self.rhs.len(),
            });
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LameParameters<T> {
    pub mu: T,
    pub lambda: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young: T,
    pub poisson: T,
}

impl<T: RealNumber> From<YoungPoisson<T>> for LameParameters<T> {
    #[replace_float_literals(<T as Number>::from_f64(literal))]
    fn from(params: YoungPoisson<T>) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

/// A quadrature point of an elasticity energy: a rank-2 deformation gradient variable
/// of extents `[d, d]` and a scalar weight variable (quadrature weight times Jacobian
/// determinant of the reference map).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadraturePoint {
    pub deformation_gradient: VariableId,
    pub weight: VariableId,
}

impl QuadraturePoint {
    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        let extents = table.extents(self.deformation_gradient);
        let is_square = extents.len() == 2 && extents[0] == extents[1] && (1..=3).contains(&extents[0]);
        if !is_square {
            return Err(AssemblyError::InvalidVariable {
                name: table.name(self.deformation_gradient).to_string(),
                reason: "deformation gradient must be a square matrix of dimension 1, 2 or 3",
            });
        }
        if table.rank(self.weight) != 0 {
            return Err(AssemblyError::InvalidVariable {
                name: table.name(self.weight).to_string(),
                reason: "quadrature weight must be a scalar",
            });
        }
        Ok(())
    }
}

fn validate_points(points: &[QuadraturePoint], table: &VariableTable) -> Result<(), AssemblyError> {
    points.iter().try_for_each(|point| point.validate(table))
}

fn dimension_of<N: Copy>(samples: &SampleView<N>, point: &QuadraturePoint) -> usize {
    samples.table().extents(point.deformation_gradient)[0]
}

/// Compressible Neo-Hookean energy.
///
/// Given Lamé parameters $\mu$ and $\lambda$, the strain energy density is
/// $$
/// \psi(\vec F) = \frac{\mu}{2} \left( \operatorname{tr}(\vec F^T \vec F) - d \right)
///     - \mu \ln J + \frac{\lambda}{2} (\ln J)^2,
/// $$
/// with $J = \det \vec F$. The energy is the weighted sum of $\psi$ over all quadrature points.
/// Inverted elements ($J \leq 0$) yield non-finite energies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeoHookeanEnergy<T> {
    parameters: LameParameters<T>,
    points: Vec<QuadraturePoint>,
}

impl<T: RealNumber> NeoHookeanEnergy<T> {
    pub fn new(parameters: impl Into<LameParameters<T>>) -> Self {
        Self {
            parameters: parameters.into(),
            points: Vec::new(),
        }
    }

    pub fn with_quadrature_point(mut self, point: QuadraturePoint) -> Self {
        self.points.push(point);
        self
    }

    pub fn quadrature_points(&self) -> &[QuadraturePoint] {
        &self.points
    }
}

#[allow(non_snake_case)]
fn determinant<N: Number>(F: &[N], dim: usize) -> N {
    match dim {
        1 => F[0],
        2 => det2(&[F[0], F[1], F[2], F[3]]),
        3 => det3(&[F[0], F[1], F[2], F[3], F[4], F[5], F[6], F[7], F[8]]),
        _ => panic!("Unsupported dimension {}", dim),
    }
}

#[allow(non_snake_case)]
impl<T: RealNumber> EnergyFunctional<T> for NeoHookeanEnergy<T> {
    #[replace_float_literals(N::from_f64(literal))]
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        let LameParameters { mu, lambda } = self.parameters;
        let mut C = [N::zero(); 9];
        let mut energy = N::zero();
        for point in &self.points {
            let d = dimension_of(samples, point);
            let F = samples.slice(point.deformation_gradient);
            let C = &mut C[..d * d];
            transpose_product_into(C, F, d);
            let log_J = determinant(F, d).ln();
            let psi = 0.5 * (trace(C, d) - N::from_f64(d as f64)).scale(mu) - log_J.scale(mu)
                + 0.5 * (log_J * log_J).scale(lambda);
            energy += samples.scalar(point.weight) * psi;
        }
        energy
    }

    /// Checks that the quadrature point variables have the expected ranks and extents.
    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        validate_points(&self.points, table)
    }
}

/// Linear elastic energy.
///
/// The strain energy density is
/// $$
/// \psi(\vec F) = \mu \vec \epsilon : \vec \epsilon + \frac{\lambda}{2} \operatorname{tr}^2(\vec \epsilon),
/// \qquad \vec \epsilon = \frac{\vec F + \vec F^T}{2} - \vec I.
/// $$
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearElasticEnergy<T> {
    parameters: LameParameters<T>,
    points: Vec<QuadraturePoint>,
}

impl<T: RealNumber> LinearElasticEnergy<T> {
    pub fn new(parameters: impl Into<LameParameters<T>>) -> Self {
        Self {
            parameters: parameters.into(),
            points: Vec::new(),
        }
    }

    pub fn with_quadrature_point(mut self, point: QuadraturePoint) -> Self {
        self.points.push(point);
        self
    }

    pub fn quadrature_points(&self) -> &[QuadraturePoint] {
        &self.points
    }
}

#[allow(non_snake_case)]
impl<T: RealNumber> EnergyFunctional<T> for LinearElasticEnergy<T> {
    #[replace_float_literals(N::from_f64(literal))]
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        let LameParameters { mu, lambda } = self.parameters;
        let mut eps = [N::zero(); 9];
        let mut energy = N::zero();
        for point in &self.points {
            let d = dimension_of(samples, point);
            let F = samples.slice(point.deformation_gradient);
            let eps = &mut eps[..d * d];
            for i in 0..d {
                for j in 0..d {
                    eps[d * i + j] = 0.5 * (F[d * i + j] + F[d * j + i]);
                }
                eps[d * i + i] -= 1.0;
            }
            let tr = trace(eps, d);
            let psi = double_contraction(eps, eps).scale(mu) + 0.5 * (tr * tr).scale(lambda);
            energy += samples.scalar(point.weight) * psi;
        }
        energy
    }

    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        validate_points(&self.points, table)
    }
}

/// The sum of two functionals, see [`EnergyFunctional::plus`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SumFunctional<A, B> {
    first: A,
    second: B,
}

impl<T, A, B> EnergyFunctional<T> for SumFunctional<A, B>
where
    T: RealNumber,
    A: EnergyFunctional<T>,
    B: EnergyFunctional<T>,
{
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        self.first.evaluate(samples) + self.second.evaluate(samples)
    }

    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        self.first.validate(table)?;
        self.second.validate(table)
    }
}

/// A functional multiplied by a constant factor, see [`EnergyFunctional::scaled`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaled<T, F> {
    factor: T,
    inner: F,
}

impl<T, F> EnergyFunctional<T> for Scaled<T, F>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
{
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        self.inner.evaluate(samples).scale(self.factor)
    }

    fn validate(&self, table: &VariableTable) -> Result<(), AssemblyError> {
        self.inner.validate(table)
    }
}

/// A functional given by an index-notation expression, see [`adform_expr`].
///
/// Every variable declared in the expression is bound by name to a variable of the layout
/// with identical extents.
#[derive(Clone, Debug)]
pub struct ParsedFunctional {
    expression: Expression,
    bindings: Vec<VariableId>,
}

impl ParsedFunctional {
    pub fn new(expression: Expression, table: &VariableTable) -> Result<Self, AssemblyError> {
        let bindings = expression
            .variables()
            .iter()
            .map(|declared| {
                let id = table
                    .find(&declared.name)
                    .ok_or_else(|| AssemblyError::UnboundExpressionVariable(declared.name.clone()))?;
                if table.extents(id) != declared.extents.as_slice() {
                    return Err(AssemblyError::InvalidVariable {
                        name: declared.name.clone(),
                        reason: "extents differ between expression declaration and layout",
                    });
                }
                Ok(id)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { expression, bindings })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl<T: RealNumber> EnergyFunctional<T> for ParsedFunctional {
    fn evaluate<N>(&self, samples: &SampleView<N>) -> N
    where
        N: Number<Primal = T>,
    {
        self.expression
            .evaluate(|variable, offset| samples.slice(self.bindings[variable])[offset])
    }
}
