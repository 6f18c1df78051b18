//! Layout of tensor-valued variables in a flat sample buffer.
//!
//! Every variable participating in an energy functional is a tensor of some rank with given
//! per-axis extents (rank 0 for scalars, rank 1 for vectors, rank 2 for matrices and so on).
//! The sample buffer stores all variables back to back, each as a contiguous run in
//! *row-major* order: the last axis varies fastest. For a variable with extents
//! $(n_0, \dots, n_{r-1})$ starting at offset $s$, the multi-index $(i_0, \dots, i_{r-1})$
//! is stored at
//!
//! $$ s + \sum_{k} i_k \prod_{l > k} n_l. $$
//!
//! The [`VariableTable`] is append-only until it is finalized. Afterwards its layout is frozen
//! and any attempt to add a variable is an error. Since adding a variable shifts the layout of
//! every buffer derived from the table, changing the set of variables requires an explicit
//! [`VariableTable::clear`] and a complete rebuild of every dependent operator.
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::ops::Range;

/// Identifies a variable registered in a [`VariableTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The table was finalized before the variable was added.
    Finalized { name: String },
    DuplicateName(String),
    ZeroExtent { name: String, axis: usize },
    UnknownVariable(String),
    RankMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    IndexOutOfBounds {
        name: String,
        axis: usize,
        index: usize,
        extent: usize,
    },
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::Finalized { name } => {
                write!(f, "Cannot add variable \"{}\" to a finalized layout.", name)
            }
            LayoutError::DuplicateName(name) => write!(f, "Variable \"{}\" is already registered.", name),
            LayoutError::ZeroExtent { name, axis } => {
                write!(f, "Variable \"{}\" has zero extent along axis {}.", name, axis)
            }
            LayoutError::UnknownVariable(name) => write!(f, "No variable named \"{}\".", name),
            LayoutError::RankMismatch { name, expected, actual } => write!(
                f,
                "Variable \"{}\" has rank {}, but was indexed with {} indices.",
                name, expected, actual
            ),
            LayoutError::IndexOutOfBounds {
                name,
                axis,
                index,
                extent,
            } => write!(
                f,
                "Index {} out of bounds for axis {} of variable \"{}\" with extent {}.",
                index, axis, name, extent
            ),
        }
    }
}

impl Error for LayoutError {}

/// A registered variable, as described by [`VariableTable::variable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo<'a> {
    pub name: &'a str,
    pub field: usize,
    pub extents: &'a [usize],
    pub range: Range<usize>,
}

/// Bookkeeping for all variables sampled by an energy functional.
///
/// The table is stored as parallel arrays. The extents of all variables are concatenated
/// into a single array, with `extent_offsets` giving the start of each variable's extents
/// (a prefix sum over the ranks). Likewise, `sample_offsets` is a prefix sum over the variable
/// sizes and gives the start of each variable in the sample buffer. Both have one more entry
/// than there are variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableTable {
    names: Vec<String>,
    // Index of the field (true-DOF vector) the variable is interpolated from.
    fields: Vec<usize>,
    extent_offsets: Vec<usize>,
    extents: Vec<usize>,
    // Row-major strides, parallel to `extents`.
    strides: Vec<usize>,
    sample_offsets: Vec<usize>,
    finalized: bool,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            fields: Vec::new(),
            extent_offsets: vec![0],
            extents: Vec::new(),
            strides: Vec::new(),
            sample_offsets: vec![0],
            finalized: false,
        }
    }
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new variable with the given extents, one per axis.
    ///
    /// The rank of the variable is the number of extents, so an empty slice registers a scalar.
    /// Returns the identifier of the new variable, which is stable until the table is cleared.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        field: usize,
        extents: &[usize],
    ) -> Result<VariableId, LayoutError> {
        let name = name.into();
        if self.finalized {
            return Err(LayoutError::Finalized { name });
        }
        if self.names.contains(&name) {
            return Err(LayoutError::DuplicateName(name));
        }
        if let Some(axis) = extents.iter().position(|&n| n == 0) {
            return Err(LayoutError::ZeroExtent { name, axis });
        }

        let id = VariableId(self.names.len());
        let size: usize = extents.iter().product();

        // stride_k = prod_{l > k} n_l
        let mut stride = size;
        for &extent in extents {
            stride /= extent;
            self.strides.push(stride);
        }
        self.extents.extend_from_slice(extents);
        self.extent_offsets.push(self.extents.len());

        let start = self.sample_count();
        self.sample_offsets.push(start + size);
        self.names.push(name);
        self.fields.push(field);

        Ok(id)
    }

    /// Freezes the layout. Subsequent calls to [`add_variable`](Self::add_variable) fail.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Removes all variables and unfreezes the table.
    ///
    /// All previously issued [`VariableId`]s and sample buffer offsets become invalid.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn variable_count(&self) -> usize {
        self.names.len()
    }

    /// The total length of a sample buffer for this layout.
    pub fn sample_count(&self) -> usize {
        *self
            .sample_offsets
            .last()
            .expect("Sample offsets always contain at least one entry")
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        (0..self.variable_count()).map(VariableId)
    }

    pub fn find(&self, name: &str) -> Option<VariableId> {
        self.names.iter().position(|n| n == name).map(VariableId)
    }

    pub fn try_find(&self, name: &str) -> Result<VariableId, LayoutError> {
        self.find(name)
            .ok_or_else(|| LayoutError::UnknownVariable(name.to_string()))
    }

    /// Collects the description of a registered variable.
    pub fn variable(&self, id: VariableId) -> VariableInfo<'_> {
        VariableInfo {
            name: self.name(id),
            field: self.field(id),
            extents: self.extents(id),
            range: self.range(id),
        }
    }

    pub fn name(&self, id: VariableId) -> &str {
        &self.names[id.0]
    }

    pub fn field(&self, id: VariableId) -> usize {
        self.fields[id.0]
    }

    pub fn rank(&self, id: VariableId) -> usize {
        self.extent_offsets[id.0 + 1] - self.extent_offsets[id.0]
    }

    pub fn extents(&self, id: VariableId) -> &[usize] {
        &self.extents[self.extent_range(id)]
    }

    fn strides(&self, id: VariableId) -> &[usize] {
        &self.strides[self.extent_range(id)]
    }

    fn extent_range(&self, id: VariableId) -> Range<usize> {
        self.extent_offsets[id.0]..self.extent_offsets[id.0 + 1]
    }

    /// The number of sample entries occupied by the variable.
    pub fn size(&self, id: VariableId) -> usize {
        self.sample_offsets[id.0 + 1] - self.sample_offsets[id.0]
    }

    /// The offset of the first entry of the variable in the sample buffer.
    pub fn start(&self, id: VariableId) -> usize {
        self.sample_offsets[id.0]
    }

    /// The range of the sample buffer occupied by the variable.
    pub fn range(&self, id: VariableId) -> Range<usize> {
        self.sample_offsets[id.0]..self.sample_offsets[id.0 + 1]
    }

    /// Maps a multi-index of a variable to its offset in the sample buffer.
    ///
    /// Indices are only validated in debug builds. Use
    /// [`try_forward_index`](Self::try_forward_index) to validate indices up front.
    #[inline]
    pub fn forward_index(&self, id: VariableId, multi_index: &[usize]) -> usize {
        let start = self.start(id);
        let strides = self.strides(id);
        debug_assert_eq!(strides.len(), multi_index.len(), "Rank mismatch");
        debug_assert!(
            multi_index
                .iter()
                .zip(self.extents(id))
                .all(|(i, n)| i < n),
            "Index out of bounds"
        );

        // Scalars short-circuit, since there are no axes to iterate over
        if strides.is_empty() {
            return start;
        }

        start
            + multi_index
                .iter()
                .zip(strides)
                .map(|(i, stride)| i * stride)
                .sum::<usize>()
    }

    /// Same as [`forward_index`](Self::forward_index), but validates the multi-index.
    pub fn try_forward_index(&self, id: VariableId, multi_index: &[usize]) -> Result<usize, LayoutError> {
        let extents = self.extents(id);
        if extents.len() != multi_index.len() {
            return Err(LayoutError::RankMismatch {
                name: self.name(id).to_string(),
                expected: extents.len(),
                actual: multi_index.len(),
            });
        }
        for (axis, (&index, &extent)) in multi_index.iter().zip(extents).enumerate() {
            if index >= extent {
                return Err(LayoutError::IndexOutOfBounds {
                    name: self.name(id).to_string(),
                    axis,
                    index,
                    extent,
                });
            }
        }
        Ok(self.forward_index(id, multi_index))
    }

    /// Maps an offset in the sample buffer back to the multi-index of the given variable.
    ///
    /// The result is stored in `multi_index`, which must have length equal to the rank of the
    /// variable. The offset must lie within [`range`](Self::range) of the variable; this is
    /// only checked in debug builds.
    #[inline]
    pub fn inverse_index_into(&self, multi_index: &mut [usize], id: VariableId, flat_offset: usize) {
        debug_assert!(self.range(id).contains(&flat_offset), "Offset out of bounds");
        let strides = self.strides(id);
        assert_eq!(multi_index.len(), strides.len(), "Output length must match rank");

        let mut remainder = flat_offset - self.start(id);
        for (i, &stride) in multi_index.iter_mut().zip(strides) {
            *i = remainder / stride;
            remainder %= stride;
        }
    }

    pub fn inverse_index(&self, id: VariableId, flat_offset: usize) -> Vec<usize> {
        let mut multi_index = vec![0; self.rank(id)];
        self.inverse_index_into(&mut multi_index, id, flat_offset);
        multi_index
    }

    /// Iterates over all multi-indices of the variable in storage (row-major) order.
    pub fn multi_indices(&self, id: VariableId) -> impl Iterator<Item = Vec<usize>> + '_ {
        self.range(id)
            .map(move |offset| self.inverse_index(id, offset))
    }
}

/// A read-only view of a sample buffer, as handed to energy functionals.
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a, N> {
    table: &'a VariableTable,
    samples: &'a [N],
}

impl<'a, N: Copy> SampleView<'a, N> {
    pub fn new(table: &'a VariableTable, samples: &'a [N]) -> Self {
        assert_eq!(
            table.sample_count(),
            samples.len(),
            "Sample buffer length must match the layout"
        );
        Self { table, samples }
    }

    pub fn table(&self) -> &'a VariableTable {
        self.table
    }

    pub fn samples(&self) -> &'a [N] {
        self.samples
    }

    /// The value of a scalar (rank-0) variable.
    #[inline]
    pub fn scalar(&self, id: VariableId) -> N {
        debug_assert_eq!(self.table.rank(id), 0, "Variable is not a scalar");
        self.samples[self.table.start(id)]
    }

    #[inline]
    pub fn get(&self, id: VariableId, multi_index: &[usize]) -> N {
        self.samples[self.table.forward_index(id, multi_index)]
    }

    /// All entries of the variable, in row-major order.
    #[inline]
    pub fn slice(&self, id: VariableId) -> &'a [N] {
        &self.samples[self.table.range(id)]
    }
}
