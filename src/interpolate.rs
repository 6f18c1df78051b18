//! Sparse interpolation from element degrees of freedom to sample values.
//!
//! For an element with DOF values $u_J$, a finite element interpolation of sample $I$ can be
//! written
//!
//! $$ s_I = \sum_J W_{IJ} u_J, $$
//!
//! where $W_{IJ}$ is, depending on the variable, a basis function value, a basis function
//! gradient component or simply $\delta_{IJ}$ for variables that are the DOFs themselves.
//! Since each sample only depends on few DOFs, $W$ is stored in a compact CSR-like format.
use crate::layout::{VariableId, VariableTable};
use adform_traits::{Number, RealNumber};
use itertools::izip;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// Row offsets are not a monotone sequence starting at zero and ending at the number
    /// of stored entries.
    InvalidOffsets,
    ColumnOutOfBounds { row: usize, column: usize, num_dofs: usize },
    LengthMismatch { columns: usize, values: usize },
    LayoutNotFinalized,
    BlockShape {
        name: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    FieldOutOfBounds { name: String, field: usize, num_fields: usize },
    DuplicateBlock(String),
    MissingBlock(String),
}

impl Display for InterpolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InterpolationError::*;
        match self {
            InvalidOffsets => write!(f, "Row offsets must be monotone, start at 0 and end at the number of entries."),
            ColumnOutOfBounds { row, column, num_dofs } => write!(
                f,
                "Column {} in row {} is out of bounds for {} DOFs.",
                column, row, num_dofs
            ),
            LengthMismatch { columns, values } => write!(
                f,
                "Number of column indices ({}) and values ({}) must be the same.",
                columns, values
            ),
            LayoutNotFinalized => write!(f, "Variable layout must be finalized before building interpolators."),
            BlockShape { name, expected, actual } => write!(
                f,
                "Interpolation block for variable \"{}\" has shape {:?}, expected {:?}.",
                name, actual, expected
            ),
            FieldOutOfBounds { name, field, num_fields } => write!(
                f,
                "Variable \"{}\" refers to field {}, but only {} fields are present.",
                name, field, num_fields
            ),
            DuplicateBlock(name) => write!(f, "Variable \"{}\" already has an interpolation block.", name),
            MissingBlock(name) => write!(f, "Variable \"{}\" has no interpolation block.", name),
        }
    }
}

impl Error for InterpolationError {}

/// A sparse linear map from element DOFs to samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseInterpolator<T> {
    num_dofs: usize,
    // row_offsets[I] is the index of the first entry of sample I in `columns` and `values`.
    // The number of entries for sample I is row_offsets[I + 1] - row_offsets[I].
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<T>,
}

impl<T> Default for SparseInterpolator<T> {
    fn default() -> Self {
        Self {
            num_dofs: 0,
            row_offsets: vec![0],
            columns: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> SparseInterpolator<T> {
    pub fn from_compressed(
        num_dofs: usize,
        row_offsets: Vec<usize>,
        columns: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, InterpolationError> {
        if columns.len() != values.len() {
            return Err(InterpolationError::LengthMismatch {
                columns: columns.len(),
                values: values.len(),
            });
        }
        let offsets_valid = row_offsets.first() == Some(&0)
            && row_offsets.last() == Some(&columns.len())
            && row_offsets.windows(2).all(|w| w[0] <= w[1]);
        if !offsets_valid {
            return Err(InterpolationError::InvalidOffsets);
        }
        for (row, w) in row_offsets.windows(2).enumerate() {
            if let Some(&column) = columns[w[0]..w[1]].iter().find(|&&j| j >= num_dofs) {
                return Err(InterpolationError::ColumnOutOfBounds { row, column, num_dofs });
            }
        }

        Ok(Self {
            num_dofs,
            row_offsets,
            columns,
            values,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Number of explicitly stored weights.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// The DOF indices and weights of the given sample.
    #[inline]
    pub fn row(&self, sample: usize) -> (&[usize], &[T]) {
        let range = self.row_offsets[sample]..self.row_offsets[sample + 1];
        (&self.columns[range.clone()], &self.values[range])
    }
}

impl<T: RealNumber> SparseInterpolator<T> {
    /// The interpolator of variables that are the DOFs themselves.
    pub fn identity(n: usize) -> Self {
        Self {
            num_dofs: n,
            row_offsets: (0..=n).collect(),
            columns: (0..n).collect(),
            values: vec![T::one(); n],
        }
    }

    /// Creates an interpolator from a dense `num_samples x num_dofs` matrix, skipping zeros.
    pub fn from_dense(matrix: &DMatrix<T>) -> Self {
        let mut row_offsets = Vec::with_capacity(matrix.nrows() + 1);
        let mut columns = Vec::new();
        let mut values = Vec::new();
        row_offsets.push(0);
        for row in matrix.row_iter() {
            for (j, &w) in row.iter().enumerate() {
                if w != T::zero() {
                    columns.push(j);
                    values.push(w);
                }
            }
            row_offsets.push(columns.len());
        }
        Self {
            num_dofs: matrix.ncols(),
            row_offsets,
            columns,
            values,
        }
    }

    pub fn to_dense(&self) -> DMatrix<T> {
        let mut matrix = DMatrix::zeros(self.num_samples(), self.num_dofs);
        for i in 0..self.num_samples() {
            let (columns, values) = self.row(i);
            for (&j, &w) in izip!(columns, values) {
                matrix[(i, j)] += w;
            }
        }
        matrix
    }

    /// Returns the transposed operator, mapping samples to DOFs.
    ///
    /// Row `J` of the transpose lists the samples depending on DOF `J`, in increasing order.
    pub fn transpose(&self) -> Self {
        let mut transpose = Self::default();
        self.transpose_into(&mut transpose);
        transpose
    }

    /// Same as [`transpose`](Self::transpose), but reuses the storage of `output`.
    pub fn transpose_into(&self, output: &mut Self) {
        let num_samples = self.num_samples();

        // Counting sort of the entries by column
        output.num_dofs = num_samples;
        output.row_offsets.clear();
        output.row_offsets.resize(self.num_dofs + 1, 0);
        for &j in &self.columns {
            output.row_offsets[j + 1] += 1;
        }
        for j in 0..self.num_dofs {
            output.row_offsets[j + 1] += output.row_offsets[j];
        }

        output.columns.clear();
        output.columns.resize(self.nnz(), usize::MAX);
        output.values.clear();
        output.values.resize(self.nnz(), T::zero());

        // Use the first `num_dofs` offsets as insertion cursors, shifted back afterwards
        for i in 0..num_samples {
            let (columns, values) = self.row(i);
            for (&j, &w) in izip!(columns, values) {
                let cursor = output.row_offsets[j];
                output.columns[cursor] = i;
                output.values[cursor] = w;
                output.row_offsets[j] += 1;
            }
        }
        for j in (1..=self.num_dofs).rev() {
            output.row_offsets[j] = output.row_offsets[j - 1];
        }
        output.row_offsets[0] = 0;
    }

    /// Computes `samples = W * dofs`.
    pub fn apply_into<N>(&self, samples: &mut [N], dofs: &[N])
    where
        N: Number<Primal = T>,
    {
        assert_eq!(samples.len(), self.num_samples(), "Sample buffer length must match operator");
        assert_eq!(dofs.len(), self.num_dofs, "DOF buffer length must match operator");
        for (i, sample) in samples.iter_mut().enumerate() {
            let (columns, values) = self.row(i);
            *sample = izip!(columns, values)
                .map(|(&j, &w)| dofs[j].scale(w))
                .sum();
        }
    }

    pub fn apply<N>(&self, dofs: &[N]) -> Vec<N>
    where
        N: Number<Primal = T>,
    {
        let mut samples = vec![N::zero(); self.num_samples()];
        self.apply_into(&mut samples, dofs);
        samples
    }

    /// Computes `dofs = W^T * samples`, the adjoint of [`apply_into`](Self::apply_into).
    pub fn apply_transpose_into<N>(&self, dofs: &mut [N], samples: &[N])
    where
        N: Number<Primal = T>,
    {
        assert_eq!(samples.len(), self.num_samples(), "Sample buffer length must match operator");
        assert_eq!(dofs.len(), self.num_dofs, "DOF buffer length must match operator");
        dofs.fill(N::zero());
        for (i, &sample) in samples.iter().enumerate() {
            let (columns, values) = self.row(i);
            for (&j, &w) in izip!(columns, values) {
                dofs[j] += sample.scale(w);
            }
        }
    }

    pub fn apply_transpose<N>(&self, samples: &[N]) -> Vec<N>
    where
        N: Number<Primal = T>,
    {
        let mut dofs = vec![N::zero(); self.num_dofs];
        self.apply_transpose_into(&mut dofs, samples);
        dofs
    }
}

/// Supplies the interpolation operator of each element.
pub trait ElementInterpolation<T> {
    /// The number of samples produced by every element operator.
    fn num_samples(&self) -> usize;

    /// The number of elements with a dedicated operator, if the operator varies per element.
    fn num_elements(&self) -> Option<usize> {
        None
    }

    fn element_interpolator(&self, element_index: usize) -> &SparseInterpolator<T>;
}

/// A single operator shared by all elements.
impl<T> ElementInterpolation<T> for SparseInterpolator<T> {
    fn num_samples(&self) -> usize {
        SparseInterpolator::num_samples(self)
    }

    fn element_interpolator(&self, _element_index: usize) -> &SparseInterpolator<T> {
        self
    }
}

/// One operator per element, e.g. when gradients depend on the element geometry.
impl<T> ElementInterpolation<T> for Vec<SparseInterpolator<T>> {
    fn num_samples(&self) -> usize {
        self.first()
            .map(SparseInterpolator::num_samples)
            .unwrap_or(0)
    }

    fn num_elements(&self) -> Option<usize> {
        Some(self.len())
    }

    fn element_interpolator(&self, element_index: usize) -> &SparseInterpolator<T> {
        &self[element_index]
    }
}

impl<'a, T, I> ElementInterpolation<T> for &'a I
where
    I: ?Sized + ElementInterpolation<T>,
{
    fn num_samples(&self) -> usize {
        I::num_samples(self)
    }

    fn num_elements(&self) -> Option<usize> {
        I::num_elements(self)
    }

    fn element_interpolator(&self, element_index: usize) -> &SparseInterpolator<T> {
        I::element_interpolator(self, element_index)
    }
}

/// Composes per-variable interpolation blocks into a single element operator.
///
/// The element DOF vector is the concatenation of the DOFs of each field, in field order.
/// Each variable of the layout receives one dense block of shape
/// `size(variable) x dof_count(field(variable))`, whose rows are placed at the variable's
/// offset in the sample buffer and whose columns are placed at the field's offset in the
/// element DOF vector. Several variables may read from the same field, e.g. the value and the
/// gradient of a field.
#[derive(Debug, Clone)]
pub struct InterpolatorBuilder<'a, T> {
    table: &'a VariableTable,
    field_dof_offsets: Vec<usize>,
    blocks: Vec<Option<DMatrix<T>>>,
}

impl<'a, T: RealNumber> InterpolatorBuilder<'a, T> {
    pub fn new(table: &'a VariableTable, field_dof_counts: &[usize]) -> Result<Self, InterpolationError> {
        if !table.is_finalized() {
            return Err(InterpolationError::LayoutNotFinalized);
        }
        let mut field_dof_offsets = Vec::with_capacity(field_dof_counts.len() + 1);
        field_dof_offsets.push(0);
        for &count in field_dof_counts {
            let last = *field_dof_offsets.last().unwrap_or(&0);
            field_dof_offsets.push(last + count);
        }
        for id in table.variable_ids() {
            let field = table.field(id);
            if field >= field_dof_counts.len() {
                return Err(InterpolationError::FieldOutOfBounds {
                    name: table.name(id).to_string(),
                    field,
                    num_fields: field_dof_counts.len(),
                });
            }
        }
        Ok(Self {
            table,
            field_dof_offsets,
            blocks: vec![None; table.variable_count()],
        })
    }

    fn field_dof_count(&self, field: usize) -> usize {
        self.field_dof_offsets[field + 1] - self.field_dof_offsets[field]
    }

    pub fn with_block(mut self, id: VariableId, block: DMatrix<T>) -> Result<Self, InterpolationError> {
        let name = self.table.name(id).to_string();
        let expected = (self.table.size(id), self.field_dof_count(self.table.field(id)));
        let actual = block.shape();
        if expected != actual {
            return Err(InterpolationError::BlockShape { name, expected, actual });
        }
        if self.blocks[id.index()].is_some() {
            return Err(InterpolationError::DuplicateBlock(name));
        }
        self.blocks[id.index()] = Some(block);
        Ok(self)
    }

    /// Ties the variable directly to the DOFs of its field.
    pub fn with_identity(self, id: VariableId) -> Result<Self, InterpolationError> {
        let n = self.table.size(id);
        self.with_block(id, DMatrix::identity(n, n))
    }

    pub fn build(self) -> Result<SparseInterpolator<T>, InterpolationError> {
        let num_dofs = *self.field_dof_offsets.last().unwrap_or(&0);
        let mut row_offsets = Vec::with_capacity(self.table.sample_count() + 1);
        let mut columns = Vec::new();
        let mut values = Vec::new();
        row_offsets.push(0);

        // Variables are stored in order of their sample offsets, so rows come out in order
        for (id, block) in self.table.variable_ids().zip(&self.blocks) {
            let block = block
                .as_ref()
                .ok_or_else(|| InterpolationError::MissingBlock(self.table.name(id).to_string()))?;
            let column_offset = self.field_dof_offsets[self.table.field(id)];
            for row in block.row_iter() {
                for (j, &w) in row.iter().enumerate() {
                    if w != T::zero() {
                        columns.push(column_offset + j);
                        values.push(w);
                    }
                }
                row_offsets.push(columns.len());
            }
        }

        SparseInterpolator::from_compressed(num_dofs, row_offsets, columns, values)
    }
}
