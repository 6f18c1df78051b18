use crate::assembly::local::{check_element_dof_count, warn_if_not_finite, ElementWorkspace};
use crate::assembly::restriction::ElementRestriction;
use crate::assembly::{AssemblyError, EnergyForm};
use crate::functional::EnergyFunctional;
use crate::interpolate::{ElementInterpolation, SparseInterpolator};
use adform_traits::{Real, RealNumber};
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorViewMut};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::BTreeSet;

/// A global matrix that element Jacobians can be added into.
pub trait ElementMatrixSink<T> {
    /// Adds `element_matrix[(i, j)]` to the global entry `(dofs[i], dofs[j])`.
    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: &DMatrix<T>) -> eyre::Result<()>;
}

impl<T: Real> ElementMatrixSink<T> for DMatrix<T> {
    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: &DMatrix<T>) -> eyre::Result<()> {
        for (i, &row) in dofs.iter().enumerate() {
            for (j, &col) in dofs.iter().enumerate() {
                self[(row, col)] += element_matrix[(i, j)];
            }
        }
        Ok(())
    }
}

impl<T: Real> ElementMatrixSink<T> for CooMatrix<T> {
    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: &DMatrix<T>) -> eyre::Result<()> {
        for (i, &row) in dofs.iter().enumerate() {
            for (j, &col) in dofs.iter().enumerate() {
                self.push(row, col, element_matrix[(i, j)]);
            }
        }
        Ok(())
    }
}

/// Adds element rows into existing entries of the CSR matrix.
///
/// Every entry touched by the element must already be present in the sparsity pattern,
/// see [`assemble_pattern`].
impl<T: Real> ElementMatrixSink<T> for CsrMatrix<T> {
    fn add_element_matrix(&mut self, dofs: &[usize], element_matrix: &DMatrix<T>) -> eyre::Result<()> {
        // Visit the element columns in the order of their global indices, so that each CSR row
        // can be searched in a single linear pass
        let mut sorted_permutation: Vec<usize> = (0..dofs.len()).collect();
        sorted_permutation.sort_unstable_by_key(|&i| dofs[i]);

        for (local_row, &global_row) in dofs.iter().enumerate() {
            let mut csr_row = self.row_mut(global_row);
            let (column_indices, values) = csr_row.cols_and_values_mut();
            let mut search_start = 0;

            for &local_col in &sorted_permutation {
                let global_col = dofs[local_col];
                let csr_idx = column_indices[search_start..]
                    .iter()
                    .position(|&col| col == global_col)
                    .map(|offset| search_start + offset)
                    .ok_or(AssemblyError::MissingMatrixEntry {
                        row: global_row,
                        col: global_col,
                    })?;
                values[csr_idx] += element_matrix[(local_row, local_col)];
                search_start = csr_idx;
            }
        }
        Ok(())
    }
}

/// Computes the sparsity pattern of the global Jacobian for the given restriction.
///
/// Every pair of DOFs shared by an element gives an entry. Entries are collected in a
/// `BTreeSet`, so that each entry is stored exactly once regardless of how many elements
/// contribute to it.
pub fn assemble_pattern(restriction: &dyn ElementRestriction) -> eyre::Result<SparsityPattern> {
    let mut matrix_entries = BTreeSet::new();
    let mut element_dofs = Vec::new();
    for element_index in 0..restriction.num_elements() {
        element_dofs.resize(restriction.element_dof_count(element_index), usize::MAX);
        restriction.populate_element_dofs(&mut element_dofs, element_index);
        for &i in &element_dofs {
            for &j in &element_dofs {
                matrix_entries.insert((i, j));
            }
        }
    }

    let num_rows = restriction.num_global_dofs();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        // Loop to correctly handle consecutive empty rows
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    Ok(SparsityPattern::try_from_offsets_and_indices(
        num_rows,
        num_rows,
        offsets,
        column_indices,
    )?)
}

fn check_global_len(expected: usize, actual: usize) -> Result<(), AssemblyError> {
    if expected != actual {
        return Err(AssemblyError::GlobalLengthMismatch { expected, actual });
    }
    Ok(())
}

impl<T, F, I, R> EnergyForm<T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    fn gather_and_interpolate(
        &self,
        ws: &mut ElementWorkspace<T>,
        restriction: &impl ElementRestriction,
        u: &[T],
        element_index: usize,
    ) -> eyre::Result<&SparseInterpolator<T>> {
        let interpolator = self.interpolation.element_interpolator(element_index);
        check_element_dof_count(
            element_index,
            restriction.element_dof_count(element_index),
            interpolator,
        )?;
        ws.gather(restriction, u, element_index);
        ws.interpolate(interpolator);
        Ok(interpolator)
    }

    /// Computes the element residual of `element_index` and adds it into `residual`.
    fn add_element_residual(
        &self,
        ws: &mut ElementWorkspace<T>,
        restriction: &impl ElementRestriction,
        residual: &mut [T],
        u: &[T],
        element_index: usize,
    ) -> eyre::Result<()> {
        let interpolator = self.gather_and_interpolate(ws, restriction, u, element_index)?;
        ws.compute_residual(&self.table, &self.functional, interpolator);
        warn_if_not_finite(ws.residual().iter(), element_index, "residual");
        restriction.prolongate_add(residual, ws.residual().as_slice(), ws.dof_indices(), element_index);
        Ok(())
    }

    /// Forces the residual entries of essential DOFs to zero.
    pub fn apply_essential_dofs(&self, residual: &mut [T]) {
        for &dof in &self.essential_dofs {
            residual[dof] = T::zero();
        }
    }

    /// Computes the total energy, summed over all elements.
    pub fn assemble_energy(&self, u: &[T]) -> eyre::Result<T> {
        let restriction = self.restriction_for(u.len())?;
        let mut ws = self.workspace.get_or_default().borrow_mut();
        let mut energy = T::zero();
        for element_index in 0..restriction.num_elements() {
            self.gather_and_interpolate(&mut ws, &restriction, u, element_index)?;
            energy += ws.energy(&self.table, &self.functional);
        }
        Ok(energy)
    }

    /// Computes the global residual into `residual`, overwriting its previous contents.
    pub fn assemble_residual_into(&self, residual: &mut [T], u: &[T]) -> eyre::Result<()> {
        let restriction = self.restriction_for(u.len())?;
        check_global_len(u.len(), residual.len())?;

        residual.fill(T::zero());
        let mut ws = self.workspace.get_or_default().borrow_mut();
        for element_index in 0..restriction.num_elements() {
            self.add_element_residual(&mut ws, &restriction, residual, u, element_index)?;
        }
        self.apply_essential_dofs(residual);

        debug!(
            "Assembled residual of {} DOFs over {} elements",
            u.len(),
            restriction.num_elements()
        );
        Ok(())
    }

    pub fn assemble_residual(&self, u: &[T]) -> eyre::Result<DVector<T>> {
        let mut residual = DVector::zeros(u.len());
        self.assemble_residual_into(residual.as_mut_slice(), u)?;
        Ok(residual)
    }

    /// Computes the global residual in parallel over elements.
    ///
    /// Each worker accumulates into its own global vector, and the vectors are summed at the
    /// end.
    pub fn par_assemble_residual_into(&self, residual: &mut [T], u: &[T]) -> eyre::Result<()>
    where
        F: Sync,
        I: Sync,
        R: Sync,
    {
        let restriction = self.restriction_for(u.len())?;
        check_global_len(u.len(), residual.len())?;
        let n = u.len();

        let sum = (0..restriction.num_elements())
            .into_par_iter()
            .try_fold(
                || vec![T::zero(); n],
                |mut accumulator, element_index| -> eyre::Result<Vec<T>> {
                    let mut ws = self.workspace.get_or_default().borrow_mut();
                    self.add_element_residual(&mut ws, &restriction, &mut accumulator, u, element_index)?;
                    Ok(accumulator)
                },
            )
            .try_reduce(
                || vec![T::zero(); n],
                |mut a, b| {
                    for (a_i, b_i) in a.iter_mut().zip(b) {
                        *a_i += b_i;
                    }
                    Ok(a)
                },
            )?;

        residual.copy_from_slice(&sum);
        self.apply_essential_dofs(residual);

        debug!(
            "Assembled residual of {} DOFs over {} elements in parallel",
            n,
            restriction.num_elements()
        );
        Ok(())
    }

    /// Adds the element Jacobians into the given global matrix.
    ///
    /// Essential DOFs are not treated here, see e.g. [`apply_homogeneous_dirichlet_bc_csr`].
    pub fn assemble_jacobian_into(&self, sink: &mut impl ElementMatrixSink<T>, u: &[T]) -> eyre::Result<()> {
        let restriction = self.restriction_for(u.len())?;
        let mut ws = self.workspace.get_or_default().borrow_mut();
        for element_index in 0..restriction.num_elements() {
            let interpolator = self.gather_and_interpolate(&mut ws, &restriction, u, element_index)?;
            ws.compute_jacobian(&self.table, &self.functional, interpolator, self.symmetry);
            warn_if_not_finite(ws.jacobian().iter(), element_index, "Jacobian");
            sink.add_element_matrix(ws.dof_indices(), ws.jacobian())?;
        }

        debug!(
            "Assembled Jacobian of {} DOFs over {} elements",
            u.len(),
            restriction.num_elements()
        );
        Ok(())
    }

    pub fn assemble_jacobian_dense(&self, u: &[T]) -> eyre::Result<DMatrix<T>> {
        let mut jacobian = DMatrix::zeros(u.len(), u.len());
        self.assemble_jacobian_into(&mut jacobian, u)?;
        Ok(jacobian)
    }

    /// The sparsity pattern of the Jacobian for global vectors of the given length.
    pub fn jacobian_pattern(&self, num_global_dofs: usize) -> eyre::Result<SparsityPattern> {
        let restriction = self.restriction_for(num_global_dofs)?;
        assemble_pattern(&restriction)
    }

    pub fn assemble_jacobian_csr(&self, u: &[T]) -> eyre::Result<CsrMatrix<T>> {
        let pattern = self.jacobian_pattern(u.len())?;
        let values = vec![T::zero(); pattern.nnz()];
        let mut jacobian = CsrMatrix::try_from_pattern_and_values(pattern, values)
            .map_err(|err| eyre!("Failed to create CSR matrix from pattern: {}", err))?;
        self.assemble_jacobian_into(&mut jacobian, u)?;
        Ok(jacobian)
    }

    /// Assembles the Jacobian in parallel over elements.
    ///
    /// Each worker collects element entries in its own triplet (COO) buffer. The buffers are
    /// concatenated and converted to CSR, which sums duplicate entries. The resulting pattern
    /// coincides with [`jacobian_pattern`](Self::jacobian_pattern).
    pub fn par_assemble_jacobian_csr(&self, u: &[T]) -> eyre::Result<CsrMatrix<T>>
    where
        F: Sync,
        I: Sync,
        R: Sync,
    {
        let restriction = self.restriction_for(u.len())?;
        let n = u.len();

        let coo = (0..restriction.num_elements())
            .into_par_iter()
            .try_fold(
                || CooMatrix::new(n, n),
                |mut coo, element_index| -> eyre::Result<CooMatrix<T>> {
                    let mut ws = self.workspace.get_or_default().borrow_mut();
                    let interpolator = self.gather_and_interpolate(&mut ws, &restriction, u, element_index)?;
                    ws.compute_jacobian(&self.table, &self.functional, interpolator, self.symmetry);
                    warn_if_not_finite(ws.jacobian().iter(), element_index, "Jacobian");
                    coo.add_element_matrix(ws.dof_indices(), ws.jacobian())?;
                    Ok(coo)
                },
            )
            .try_reduce(
                || CooMatrix::new(n, n),
                |mut coo1, coo2| {
                    for (i, j, &v) in coo2.triplet_iter() {
                        coo1.push(i, j, v);
                    }
                    Ok(coo1)
                },
            )?;

        debug!(
            "Assembled Jacobian of {} DOFs over {} elements in parallel",
            n,
            restriction.num_elements()
        );
        Ok(CsrMatrix::from(&coo))
    }
}

/// Zeros the rows and columns of the given DOFs, placing a representative diagonal scale on the
/// diagonal.
///
/// The matrix is assumed to be structurally symmetric.
pub fn apply_homogeneous_dirichlet_bc_csr<T: Real>(matrix: &mut CsrMatrix<T>, dofs: &[usize]) {
    // The first non-zero diagonal entry serves as the representative scale
    let scale = (0..matrix.nrows())
        .filter_map(|i| {
            let row = matrix.row(i);
            row.col_indices()
                .iter()
                .position(|&j| j == i)
                .map(|idx| row.values()[idx])
        })
        .find(|&x| x != T::zero())
        .map(|x| x.abs())
        .unwrap_or(T::one());

    // Zero the Dirichlet rows. By structural symmetry, visiting column c in a Dirichlet row r
    // tells us that (c, r) also needs to be zeroed, so only those rows are visited afterwards
    let mut dirichlet_membership = vec![false; matrix.nrows()];
    let mut rows_to_visit = vec![false; matrix.nrows()];
    for &dof in dofs {
        dirichlet_membership[dof] = true;
        let mut row = matrix.row_mut(dof);
        let (cols, values) = row.cols_and_values_mut();
        for (&col, value) in cols.iter().zip(values) {
            if col == dof {
                *value = scale;
            } else {
                *value = T::zero();
                rows_to_visit[col] = true;
            }
        }
    }

    for row_index in (0..matrix.nrows()).filter(|&i| rows_to_visit[i] && !dirichlet_membership[i]) {
        let mut row = matrix.row_mut(row_index);
        let (cols, values) = row.cols_and_values_mut();
        for (&col, value) in cols.iter().zip(values) {
            if dirichlet_membership[col] {
                *value = T::zero();
            }
        }
    }
}

/// Zeros the rows and columns of the given DOFs, placing the mean absolute diagonal entry on
/// the diagonal.
pub fn apply_homogeneous_dirichlet_bc_matrix<T: Real>(matrix: &mut DMatrix<T>, dofs: &[usize]) {
    let n = matrix.nrows();
    let mean_abs_diagonal = if n > 0 {
        matrix.diagonal().iter().map(|x| x.abs()).fold(T::zero(), |a, b| a + b) / nalgebra::convert(n as f64)
    } else {
        T::zero()
    };
    let scale = if mean_abs_diagonal > T::zero() {
        mean_abs_diagonal
    } else {
        T::one()
    };

    for &dof in dofs {
        matrix.column_mut(dof).fill(T::zero());
        matrix.row_mut(dof).fill(T::zero());
        matrix[(dof, dof)] = scale;
    }
}

pub fn apply_homogeneous_dirichlet_bc_rhs<'a, T: Real>(rhs: impl Into<DVectorViewMut<'a, T>>, dofs: &[usize]) {
    let mut rhs = rhs.into();
    for &dof in dofs {
        rhs[dof] = T::zero();
    }
}
