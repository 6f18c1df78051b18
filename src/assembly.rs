//! Assembly of residuals and Jacobians of energy functionals by forward-mode differentiation.
//!
//! An [`EnergyForm`] ties together a [`VariableTable`], an [`ElementInterpolation`] and an
//! [`EnergyFunctional`]. For every element, the element DOFs are interpolated to the sample
//! buffer, and the functional is evaluated on dual numbers seeded along one DOF (residual) or a
//! pair of DOFs (Jacobian) at a time. See [`local`] for the element passes and [`global`] for
//! the global assembly routines.
use crate::functional::EnergyFunctional;
use crate::interpolate::ElementInterpolation;
use crate::layout::VariableTable;
use adform_traits::RealNumber;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::marker::PhantomData;
use thread_local::ThreadLocal;

pub mod global;
pub mod local;
pub mod restriction;

use local::ElementWorkspace;
use restriction::{ActiveRestriction, BlockRestriction, DofMapRestriction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    MissingFunctional,
    MissingInterpolation,
    UnfinalizedLayout,
    SampleCountMismatch {
        element: Option<usize>,
        layout: usize,
        interpolation: usize,
    },
    ElementCountMismatch {
        restriction: usize,
        interpolation: usize,
    },
    ElementDofCountMismatch {
        element: usize,
        restriction: usize,
        interpolation: usize,
    },
    /// Without a restriction, the global vector must consist of whole element blocks.
    GlobalLengthNotDivisible {
        global_len: usize,
        element_dof_count: usize,
    },
    GlobalLengthMismatch {
        expected: usize,
        actual: usize,
    },
    DofOutOfBounds {
        element: usize,
        dof: usize,
        num_global_dofs: usize,
    },
    EssentialDofOutOfBounds {
        dof: usize,
        num_global_dofs: usize,
    },
    /// An element matrix entry has no counterpart in the sparsity pattern of the global matrix.
    MissingMatrixEntry {
        row: usize,
        col: usize,
    },
    InvalidVariable {
        name: String,
        reason: &'static str,
    },
    UnboundExpressionVariable(String),
    FunctionalSampleCountMismatch {
        layout: usize,
        functional: usize,
    },
}

impl Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AssemblyError::*;
        match self {
            MissingFunctional => write!(f, "No energy functional was provided."),
            MissingInterpolation => write!(f, "No element interpolation was provided."),
            UnfinalizedLayout => write!(f, "The variable layout must be finalized before assembly."),
            SampleCountMismatch {
                element,
                layout,
                interpolation,
            } => {
                write!(
                    f,
                    "Interpolation produces {} samples, but the layout has {} samples",
                    interpolation, layout
                )?;
                match element {
                    Some(element) => write!(f, " (element {}).", element),
                    None => write!(f, "."),
                }
            }
            ElementCountMismatch {
                restriction,
                interpolation,
            } => write!(
                f,
                "Restriction has {} elements, but interpolation is given for {} elements.",
                restriction, interpolation
            ),
            ElementDofCountMismatch {
                element,
                restriction,
                interpolation,
            } => write!(
                f,
                "Element {} has {} DOFs in the restriction, but its interpolator expects {} DOFs.",
                element, restriction, interpolation
            ),
            GlobalLengthNotDivisible {
                global_len,
                element_dof_count,
            } => write!(
                f,
                "Global vector of length {} is not a concatenation of element blocks of length {}.",
                global_len, element_dof_count
            ),
            GlobalLengthMismatch { expected, actual } => write!(
                f,
                "Global vector has length {}, expected length {}.",
                actual, expected
            ),
            DofOutOfBounds {
                element,
                dof,
                num_global_dofs,
            } => write!(
                f,
                "Element {} refers to DOF {}, but there are only {} global DOFs.",
                element, dof, num_global_dofs
            ),
            EssentialDofOutOfBounds { dof, num_global_dofs } => write!(
                f,
                "Essential DOF {} is out of bounds for {} global DOFs.",
                dof, num_global_dofs
            ),
            MissingMatrixEntry { row, col } => write!(
                f,
                "Entry ({}, {}) is not part of the sparsity pattern of the global matrix.",
                row, col
            ),
            InvalidVariable { name, reason } => write!(f, "Invalid variable \"{}\": {}.", name, reason),
            UnboundExpressionVariable(name) => write!(
                f,
                "Expression variable \"{}\" has no counterpart in the variable layout.",
                name
            ),
            FunctionalSampleCountMismatch { layout, functional } => write!(
                f,
                "Functional expects {} samples, but the layout has {} samples.",
                functional, layout
            ),
        }
    }
}

impl Error for AssemblyError {}

/// Determines which entries of element Jacobians are evaluated.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JacobianSymmetry {
    /// Evaluate the upper triangle and mirror it into the lower triangle.
    #[default]
    Mirror,
    /// Evaluate every pair of DOFs.
    Full,
}

/// The residual and Jacobian of an energy functional over a collection of elements.
///
/// Each worker thread holds its own [`ElementWorkspace`], so a single form can be used
/// concurrently from a `rayon` thread pool.
#[derive(Debug)]
pub struct EnergyForm<T, F, I, R = DofMapRestriction>
where
    T: RealNumber,
{
    table: VariableTable,
    functional: F,
    interpolation: I,
    restriction: Option<R>,
    essential_dofs: Vec<usize>,
    symmetry: JacobianSymmetry,
    workspace: ThreadLocal<RefCell<ElementWorkspace<T>>>,
}

impl<T, F, I, R> EnergyForm<T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: restriction::ElementRestriction,
{
    pub fn table(&self) -> &VariableTable {
        &self.table
    }

    pub fn functional(&self) -> &F {
        &self.functional
    }

    pub fn interpolation(&self) -> &I {
        &self.interpolation
    }

    pub fn restriction(&self) -> Option<&R> {
        self.restriction.as_ref()
    }

    pub fn essential_dofs(&self) -> &[usize] {
        &self.essential_dofs
    }

    pub fn symmetry(&self) -> JacobianSymmetry {
        self.symmetry
    }

    /// Returns the restriction used to assemble global vectors of the given length.
    ///
    /// Without a configured restriction, element data is assumed to be stored as consecutive
    /// element blocks in the global vector.
    pub fn restriction_for(&self, num_global_dofs: usize) -> Result<ActiveRestriction<R>, AssemblyError> {
        let active = match &self.restriction {
            Some(restriction) => ActiveRestriction::Configured(restriction),
            None if self.interpolation.num_elements() == Some(0) => {
                ActiveRestriction::Blocks(BlockRestriction::new(0, 0))
            }
            None => {
                let element_dof_count = self.interpolation.element_interpolator(0).num_dofs();
                ActiveRestriction::Blocks(BlockRestriction::for_global_len(num_global_dofs, element_dof_count)?)
            }
        };

        let expected = restriction::ElementRestriction::num_global_dofs(&active);
        if expected != num_global_dofs {
            return Err(AssemblyError::GlobalLengthMismatch {
                expected,
                actual: num_global_dofs,
            });
        }
        let num_elements = restriction::ElementRestriction::num_elements(&active);
        if let Some(interpolation_elements) = self.interpolation.num_elements() {
            if interpolation_elements != num_elements {
                return Err(AssemblyError::ElementCountMismatch {
                    restriction: num_elements,
                    interpolation: interpolation_elements,
                });
            }
        }
        if let Some(&dof) = self.essential_dofs.iter().find(|&&dof| dof >= num_global_dofs) {
            return Err(AssemblyError::EssentialDofOutOfBounds { dof, num_global_dofs });
        }
        Ok(active)
    }
}

/// Configures and validates an [`EnergyForm`].
///
/// The functional and interpolation are mandatory. Without a restriction, global vectors are
/// treated as concatenations of element blocks.
#[derive(Debug)]
pub struct EnergyFormBuilder<T, F, I, R = DofMapRestriction> {
    table: VariableTable,
    functional: Option<F>,
    interpolation: Option<I>,
    restriction: Option<R>,
    essential_dofs: Vec<usize>,
    symmetry: JacobianSymmetry,
    marker: PhantomData<T>,
}

impl<T, F, I, R> EnergyFormBuilder<T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: restriction::ElementRestriction,
{
    pub fn new(table: VariableTable) -> Self {
        Self {
            table,
            functional: None,
            interpolation: None,
            restriction: None,
            essential_dofs: Vec::new(),
            symmetry: JacobianSymmetry::default(),
            marker: PhantomData,
        }
    }

    pub fn with_functional(self, functional: F) -> Self {
        Self {
            functional: Some(functional),
            ..self
        }
    }

    pub fn with_interpolation(self, interpolation: I) -> Self {
        Self {
            interpolation: Some(interpolation),
            ..self
        }
    }

    pub fn with_restriction<R2>(self, restriction: R2) -> EnergyFormBuilder<T, F, I, R2> {
        EnergyFormBuilder {
            table: self.table,
            functional: self.functional,
            interpolation: self.interpolation,
            restriction: Some(restriction),
            essential_dofs: self.essential_dofs,
            symmetry: self.symmetry,
            marker: PhantomData,
        }
    }

    /// Global DOFs whose residual entries are forced to zero after assembly.
    pub fn with_essential_dofs(self, dofs: impl IntoIterator<Item = usize>) -> Self {
        let mut essential_dofs: Vec<_> = dofs.into_iter().collect();
        essential_dofs.sort_unstable();
        essential_dofs.dedup();
        Self { essential_dofs, ..self }
    }

    pub fn with_symmetry(self, symmetry: JacobianSymmetry) -> Self {
        Self { symmetry, ..self }
    }

    pub fn build(self) -> Result<EnergyForm<T, F, I, R>, AssemblyError> {
        let functional = self.functional.ok_or(AssemblyError::MissingFunctional)?;
        let interpolation = self
            .interpolation
            .ok_or(AssemblyError::MissingInterpolation)?;
        if !self.table.is_finalized() {
            return Err(AssemblyError::UnfinalizedLayout);
        }
        functional.validate(&self.table)?;

        let layout = self.table.sample_count();
        match interpolation.num_elements() {
            Some(num_elements) => {
                for element in 0..num_elements {
                    let samples = interpolation.element_interpolator(element).num_samples();
                    if samples != layout {
                        return Err(AssemblyError::SampleCountMismatch {
                            element: Some(element),
                            layout,
                            interpolation: samples,
                        });
                    }
                }
            }
            None => {
                if interpolation.num_samples() != layout {
                    return Err(AssemblyError::SampleCountMismatch {
                        element: None,
                        layout,
                        interpolation: interpolation.num_samples(),
                    });
                }
            }
        }

        if let (Some(restriction), Some(num_elements)) = (&self.restriction, interpolation.num_elements()) {
            if restriction.num_elements() != num_elements {
                return Err(AssemblyError::ElementCountMismatch {
                    restriction: restriction.num_elements(),
                    interpolation: num_elements,
                });
            }
        }

        Ok(EnergyForm {
            table: self.table,
            functional,
            interpolation,
            restriction: self.restriction,
            essential_dofs: self.essential_dofs,
            symmetry: self.symmetry,
            workspace: ThreadLocal::new(),
        })
    }
}
