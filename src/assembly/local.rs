//! Element-level evaluation of energies, residuals and Jacobians.
//!
//! The residual entry for local DOF $m$ is obtained by seeding the derivative component of
//! every sample $i$ with the interpolation weight $W_{im}$, which makes the derivative of the
//! evaluated energy equal to $\partial e / \partial u_m$. For the Jacobian, the samples are
//! second-order duals: DOF $m$ seeds the inner derivative slot (`value.derivative`), DOF $n$
//! seeds the outer slot (`derivative.value`), and the mixed component
//! (`derivative.derivative`) of the energy is $\partial^2 e / \partial u_m \partial u_n$.
//!
//! Seeds are applied through the transpose of the element interpolator, so that only the
//! samples actually depending on a DOF are touched, and are reset before the next DOF.
use crate::assembly::restriction::ElementRestriction;
use crate::assembly::{AssemblyError, EnergyForm, JacobianSymmetry};
use crate::dual::{Dual, Dual2};
use crate::functional::EnergyFunctional;
use crate::interpolate::{ElementInterpolation, SparseInterpolator};
use crate::layout::{SampleView, VariableTable};
use adform_traits::{Number, RealNumber};
use eyre::eyre;
use itertools::izip;
use log::warn;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

/// Scratch buffers for the evaluation of a single element.
///
/// Buffers grow to the largest element seen and are reused afterwards, so that steady-state
/// assembly does not allocate.
#[derive(Debug, Clone)]
pub struct ElementWorkspace<T> {
    dof_indices: Vec<usize>,
    element_dofs: Vec<T>,
    // Column access to the element interpolator, used for seeding
    transpose: SparseInterpolator<T>,
    samples: Vec<T>,
    first_order_samples: Vec<Dual<T>>,
    second_order_samples: Vec<Dual2<T>>,
    residual: DVector<T>,
    jacobian: DMatrix<T>,
}

impl<T: RealNumber> Default for ElementWorkspace<T> {
    fn default() -> Self {
        Self {
            dof_indices: Vec::new(),
            element_dofs: Vec::new(),
            transpose: SparseInterpolator::default(),
            samples: Vec::new(),
            first_order_samples: Vec::new(),
            second_order_samples: Vec::new(),
            residual: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
        }
    }
}

impl<T: RealNumber> ElementWorkspace<T> {
    /// Gathers the element DOFs from the global vector using the given restriction.
    pub(crate) fn gather(
        &mut self,
        restriction: &impl ElementRestriction,
        global: &[T],
        element_index: usize,
    ) {
        let n = restriction.element_dof_count(element_index);
        self.dof_indices.resize(n, usize::MAX);
        restriction.populate_element_dofs(&mut self.dof_indices, element_index);
        self.element_dofs.resize(n, T::zero());
        restriction.restrict_into(&mut self.element_dofs, global, &self.dof_indices, element_index);
    }

    pub(crate) fn set_element_dofs(&mut self, element_dofs: &[T]) {
        self.element_dofs.clear();
        self.element_dofs.extend_from_slice(element_dofs);
    }

    pub(crate) fn dof_indices(&self) -> &[usize] {
        &self.dof_indices
    }

    pub(crate) fn residual(&self) -> &DVector<T> {
        &self.residual
    }

    pub(crate) fn jacobian(&self) -> &DMatrix<T> {
        &self.jacobian
    }

    /// Interpolates the current element DOFs to the sample buffer.
    pub(crate) fn interpolate(&mut self, interpolator: &SparseInterpolator<T>) {
        self.samples.resize(interpolator.num_samples(), T::zero());
        interpolator.apply_into(&mut self.samples, &self.element_dofs);
    }

    pub(crate) fn energy(&self, table: &VariableTable, functional: &impl EnergyFunctional<T>) -> T {
        functional.evaluate(&SampleView::new(table, &self.samples))
    }

    /// Computes the element residual from the interpolated samples.
    pub(crate) fn compute_residual(
        &mut self,
        table: &VariableTable,
        functional: &impl EnergyFunctional<T>,
        interpolator: &SparseInterpolator<T>,
    ) {
        interpolator.transpose_into(&mut self.transpose);
        let n = interpolator.num_dofs();
        self.residual.resize_vertically_mut(n, T::zero());

        let samples = &mut self.first_order_samples;
        samples.clear();
        samples.extend(self.samples.iter().map(|&s| Dual::constant(s)));

        for m in 0..n {
            let (sample_indices, weights) = self.transpose.row(m);
            for (&i, &w) in izip!(sample_indices, weights) {
                samples[i].derivative += w;
            }

            let energy = functional.evaluate(&SampleView::new(table, samples.as_slice()));
            self.residual[m] = energy.derivative;

            for &i in sample_indices {
                samples[i].derivative = T::zero();
            }
        }
    }

    /// Computes the element Jacobian from the interpolated samples.
    pub(crate) fn compute_jacobian(
        &mut self,
        table: &VariableTable,
        functional: &impl EnergyFunctional<T>,
        interpolator: &SparseInterpolator<T>,
        symmetry: JacobianSymmetry,
    ) {
        interpolator.transpose_into(&mut self.transpose);
        let n = interpolator.num_dofs();
        self.jacobian.resize_mut(n, n, T::zero());

        let samples = &mut self.second_order_samples;
        samples.clear();
        samples.extend(
            self.samples
                .iter()
                .map(|&s| Dual::constant(Dual::constant(s))),
        );

        for m in 0..n {
            let (rows_m, weights_m) = self.transpose.row(m);
            for (&i, &w) in izip!(rows_m, weights_m) {
                samples[i].value.derivative += w;
            }

            let first_column = match symmetry {
                JacobianSymmetry::Mirror => m,
                JacobianSymmetry::Full => 0,
            };
            for k in first_column..n {
                let (rows_k, weights_k) = self.transpose.row(k);
                for (&i, &w) in izip!(rows_k, weights_k) {
                    samples[i].derivative.value += w;
                }

                let energy = functional.evaluate(&SampleView::new(table, samples.as_slice()));
                self.jacobian[(m, k)] = energy.derivative.derivative;

                for &i in rows_k {
                    samples[i].derivative.value = T::zero();
                }
            }

            for &i in rows_m {
                samples[i].value.derivative = T::zero();
            }
        }

        if symmetry == JacobianSymmetry::Mirror {
            for m in 0..n {
                for k in (m + 1)..n {
                    self.jacobian[(k, m)] = self.jacobian[(m, k)];
                }
            }
        }
    }
}

pub(crate) fn check_element_dof_count<T: RealNumber>(
    element_index: usize,
    dof_count: usize,
    interpolator: &SparseInterpolator<T>,
) -> Result<(), AssemblyError> {
    if dof_count != interpolator.num_dofs() {
        return Err(AssemblyError::ElementDofCountMismatch {
            element: element_index,
            restriction: dof_count,
            interpolation: interpolator.num_dofs(),
        });
    }
    Ok(())
}

pub(crate) fn warn_if_not_finite<'a, T: RealNumber>(
    values: impl IntoIterator<Item = &'a T>,
    element_index: usize,
    what: &str,
) {
    if values.into_iter().any(|v| !Number::is_finite(v)) {
        warn!("Non-finite {} contribution in element {}", what, element_index);
    }
}

impl<T, F, I, R> EnergyForm<T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    fn with_workspace<U>(&self, f: impl FnOnce(&mut ElementWorkspace<T>) -> U) -> U {
        let mut ws = self.workspace.get_or_default().borrow_mut();
        f(&mut ws)
    }

    fn prepare_element<'a>(
        &'a self,
        ws: &mut ElementWorkspace<T>,
        element_index: usize,
        element_dofs: &[T],
    ) -> eyre::Result<&'a SparseInterpolator<T>> {
        let interpolator = self.interpolation.element_interpolator(element_index);
        check_element_dof_count(element_index, element_dofs.len(), interpolator)?;
        ws.set_element_dofs(element_dofs);
        ws.interpolate(interpolator);
        Ok(interpolator)
    }

    /// Evaluates the energy of a single element, given its DOF values.
    pub fn assemble_element_energy(&self, element_index: usize, element_dofs: &[T]) -> eyre::Result<T> {
        self.with_workspace(|ws| {
            self.prepare_element(ws, element_index, element_dofs)?;
            Ok(ws.energy(&self.table, &self.functional))
        })
    }

    /// Computes the residual (energy gradient) of a single element, given its DOF values.
    pub fn assemble_element_residual_into(
        &self,
        element_index: usize,
        element_dofs: &[T],
        output: DVectorViewMut<T>,
    ) -> eyre::Result<()> {
        let mut output = output;
        if output.len() != element_dofs.len() {
            return Err(eyre!(
                "Output vector has length {}, but the element has {} DOFs",
                output.len(),
                element_dofs.len()
            ));
        }
        self.with_workspace(|ws| {
            let interpolator = self.prepare_element(ws, element_index, element_dofs)?;
            ws.compute_residual(&self.table, &self.functional, interpolator);
            warn_if_not_finite(ws.residual().iter(), element_index, "residual");
            output.copy_from(ws.residual());
            Ok(())
        })
    }

    /// Computes the Jacobian (energy Hessian) of a single element, given its DOF values.
    pub fn assemble_element_jacobian_into(
        &self,
        element_index: usize,
        element_dofs: &[T],
        output: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        let mut output = output;
        let n = element_dofs.len();
        if output.shape() != (n, n) {
            return Err(eyre!(
                "Output matrix has shape {:?}, but the element has {} DOFs",
                output.shape(),
                n
            ));
        }
        self.with_workspace(|ws| {
            let interpolator = self.prepare_element(ws, element_index, element_dofs)?;
            ws.compute_jacobian(&self.table, &self.functional, interpolator, self.symmetry);
            warn_if_not_finite(ws.jacobian().iter(), element_index, "Jacobian");
            output.copy_from(ws.jacobian());
            Ok(())
        })
    }
}
