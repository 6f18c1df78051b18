//! Restriction of global vectors to element buffers, and the transposed prolongation.
//!
//! A restriction is described purely by connectivity: for each element, the list of global DOF
//! indices its local DOFs map to. Gathering along that list restricts a global vector, and
//! scatter-adding along it prolongates an element vector. Prolongation is thus exactly the
//! transpose of restriction.
use crate::assembly::AssemblyError;
use itertools::izip;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

pub trait ElementRestriction {
    fn num_elements(&self) -> usize;

    /// The length of the global vectors restricted by this restriction.
    fn num_global_dofs(&self) -> usize;

    fn element_dof_count(&self, element_index: usize) -> usize;

    /// Stores the global indices of the element DOFs in `output`, whose length must be
    /// equal to [`element_dof_count`](Self::element_dof_count).
    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize);

    /// Restricts `global` to the element buffer `local`, where `dofs` holds the indices
    /// previously obtained from [`populate_element_dofs`](Self::populate_element_dofs).
    ///
    /// Implementations may override this with a faster access pattern, but the result must
    /// agree with gathering along `dofs`.
    fn restrict_into<T: Copy>(&self, local: &mut [T], global: &[T], dofs: &[usize], _element_index: usize)
    where
        Self: Sized,
    {
        gather_global_to_local(local, global, dofs);
    }

    /// Adds the element vector `local` into `global`. This is the transpose of
    /// [`restrict_into`](Self::restrict_into), and overrides must agree with scatter-adding
    /// along `dofs`.
    fn prolongate_add<T: Copy + AddAssign>(&self, global: &mut [T], local: &[T], dofs: &[usize], _element_index: usize)
    where
        Self: Sized,
    {
        distribute_local_to_global(global, local, dofs);
    }
}

impl<R: ElementRestriction> ElementRestriction for &R {
    fn num_elements(&self) -> usize {
        R::num_elements(self)
    }

    fn num_global_dofs(&self) -> usize {
        R::num_global_dofs(self)
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        R::element_dof_count(self, element_index)
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        R::populate_element_dofs(self, output, element_index)
    }

    fn restrict_into<T: Copy>(&self, local: &mut [T], global: &[T], dofs: &[usize], element_index: usize) {
        R::restrict_into(self, local, global, dofs, element_index)
    }

    fn prolongate_add<T: Copy + AddAssign>(&self, global: &mut [T], local: &[T], dofs: &[usize], element_index: usize) {
        R::prolongate_add(self, global, local, dofs, element_index)
    }
}

/// Restriction given by explicit per-element lists of global DOF indices.
///
/// DOFs shared between elements (e.g. nodes on common faces) appear in the lists of all
/// elements that share them, and prolongation accumulates their contributions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofMapRestriction {
    num_global_dofs: usize,
    // The DOFs of element e are dofs[offsets[e] .. offsets[e + 1]]
    offsets: Vec<usize>,
    dofs: Vec<usize>,
}

impl DofMapRestriction {
    /// Creates a restriction from one list of global DOF indices per element.
    pub fn from_element_dofs<I, D>(num_global_dofs: usize, element_dofs: I) -> Result<Self, AssemblyError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[usize]>,
    {
        let mut offsets = vec![0];
        let mut dofs = Vec::new();
        for (element_index, element) in element_dofs.into_iter().enumerate() {
            let element = element.as_ref();
            if let Some(&dof) = element.iter().find(|&&dof| dof >= num_global_dofs) {
                return Err(AssemblyError::DofOutOfBounds {
                    element: element_index,
                    dof,
                    num_global_dofs,
                });
            }
            dofs.extend_from_slice(element);
            offsets.push(dofs.len());
        }
        Ok(Self {
            num_global_dofs,
            offsets,
            dofs,
        })
    }

    /// Creates a restriction for elements with the same number of DOFs, given the
    /// concatenated DOF lists of all elements.
    pub fn uniform(
        num_global_dofs: usize,
        element_dof_count: usize,
        dofs: &[usize],
    ) -> Result<Self, AssemblyError> {
        assert!(element_dof_count > 0, "Elements must have at least one DOF");
        if dofs.len() % element_dof_count != 0 {
            return Err(AssemblyError::GlobalLengthNotDivisible {
                global_len: dofs.len(),
                element_dof_count,
            });
        }
        Self::from_element_dofs(num_global_dofs, dofs.chunks_exact(element_dof_count))
    }

    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        &self.dofs[self.offsets[element_index]..self.offsets[element_index + 1]]
    }
}

impl ElementRestriction for DofMapRestriction {
    fn num_elements(&self) -> usize {
        self.offsets.len() - 1
    }

    fn num_global_dofs(&self) -> usize {
        self.num_global_dofs
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.offsets[element_index + 1] - self.offsets[element_index]
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.element_dofs(element_index));
    }
}

/// The restriction used when element data already lives in the global buffer.
///
/// The global vector is the concatenation of equally sized element blocks: element `e` owns
/// the global DOFs `e * n .. (e + 1) * n`, where `n` is the element DOF count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRestriction {
    num_elements: usize,
    element_dof_count: usize,
}

impl BlockRestriction {
    pub fn new(num_elements: usize, element_dof_count: usize) -> Self {
        Self {
            num_elements,
            element_dof_count,
        }
    }

    /// Infers the number of elements from the length of the global vector.
    pub fn for_global_len(global_len: usize, element_dof_count: usize) -> Result<Self, AssemblyError> {
        if element_dof_count == 0 || global_len % element_dof_count != 0 {
            return Err(AssemblyError::GlobalLengthNotDivisible {
                global_len,
                element_dof_count,
            });
        }
        Ok(Self::new(global_len / element_dof_count, element_dof_count))
    }
}

impl ElementRestriction for BlockRestriction {
    fn num_elements(&self) -> usize {
        self.num_elements
    }

    fn num_global_dofs(&self) -> usize {
        self.num_elements * self.element_dof_count
    }

    fn element_dof_count(&self, _element_index: usize) -> usize {
        self.element_dof_count
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        let start = element_index * self.element_dof_count;
        for (i, dof) in output.iter_mut().enumerate() {
            *dof = start + i;
        }
    }

    fn restrict_into<T: Copy>(&self, local: &mut [T], global: &[T], dofs: &[usize], element_index: usize) {
        debug_assert_eq!(dofs.len(), self.element_dof_count);
        let start = element_index * self.element_dof_count;
        local.copy_from_slice(&global[start..start + self.element_dof_count]);
    }

    fn prolongate_add<T: Copy + AddAssign>(&self, global: &mut [T], local: &[T], dofs: &[usize], element_index: usize) {
        debug_assert_eq!(dofs.len(), self.element_dof_count);
        let start = element_index * self.element_dof_count;
        for (global_value, &local_value) in izip!(&mut global[start..start + self.element_dof_count], local) {
            *global_value += local_value;
        }
    }
}

/// The restriction in effect for an assembly pass: either the configured one or, when none is
/// configured, a [`BlockRestriction`] inferred from the global vector length.
#[derive(Debug, Clone, Copy)]
pub enum ActiveRestriction<'a, R> {
    Configured(&'a R),
    Blocks(BlockRestriction),
}

impl<'a, R: ElementRestriction> ElementRestriction for ActiveRestriction<'a, R> {
    fn num_elements(&self) -> usize {
        match self {
            Self::Configured(r) => r.num_elements(),
            Self::Blocks(r) => r.num_elements(),
        }
    }

    fn num_global_dofs(&self) -> usize {
        match self {
            Self::Configured(r) => r.num_global_dofs(),
            Self::Blocks(r) => r.num_global_dofs(),
        }
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        match self {
            Self::Configured(r) => r.element_dof_count(element_index),
            Self::Blocks(r) => r.element_dof_count(element_index),
        }
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        match self {
            Self::Configured(r) => r.populate_element_dofs(output, element_index),
            Self::Blocks(r) => r.populate_element_dofs(output, element_index),
        }
    }

    fn restrict_into<T: Copy>(&self, local: &mut [T], global: &[T], dofs: &[usize], element_index: usize) {
        match self {
            Self::Configured(r) => r.restrict_into(local, global, dofs, element_index),
            Self::Blocks(r) => r.restrict_into(local, global, dofs, element_index),
        }
    }

    fn prolongate_add<T: Copy + AddAssign>(&self, global: &mut [T], local: &[T], dofs: &[usize], element_index: usize) {
        match self {
            Self::Configured(r) => r.prolongate_add(global, local, dofs, element_index),
            Self::Blocks(r) => r.prolongate_add(global, local, dofs, element_index),
        }
    }
}

/// Gathers `global[dofs[i]]` into `local[i]`.
pub fn gather_global_to_local<T: Copy>(local: &mut [T], global: &[T], dofs: &[usize]) {
    assert_eq!(local.len(), dofs.len());
    for (local_value, &dof) in izip!(local, dofs) {
        *local_value = global[dof];
    }
}

/// Adds `local[i]` to `global[dofs[i]]`.
pub fn distribute_local_to_global<T: Copy + AddAssign>(global: &mut [T], local: &[T], dofs: &[usize]) {
    assert_eq!(local.len(), dofs.len());
    for (&local_value, &dof) in izip!(local, dofs) {
        global[dof] += local_value;
    }
}
