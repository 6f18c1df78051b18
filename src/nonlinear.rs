//! Newton iterations for the stationary points of an [`EnergyForm`].
//!
//! [`NonlinearProblem`] exposes the residual and Jacobian of a form through the function traits
//! of [`crate::optimize::calculus`], so that the solvers in [`crate::optimize::newton`] can be
//! used directly. Essential DOFs keep the values of the initial guess: their residual entries
//! vanish, and their rows and columns of the Jacobian are replaced by a scaled identity before
//! each linear solve.
use crate::assembly::global::{
    apply_homogeneous_dirichlet_bc_csr, apply_homogeneous_dirichlet_bc_matrix, apply_homogeneous_dirichlet_bc_rhs,
};
use crate::assembly::restriction::ElementRestriction;
use crate::assembly::EnergyForm;
use crate::functional::EnergyFunctional;
use crate::interpolate::ElementInterpolation;
use adform_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use adform_optimize::newton::{newton_line_search, BacktrackingLineSearch, NewtonSettings};
use adform_traits::RealNumber;
use eyre::eyre;
use log::debug;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};
use std::error::Error;

/// The linear solver used for the Newton correction.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolver {
    /// Dense LU factorization of the assembled Jacobian.
    #[default]
    DenseLu,
    /// Sparse Cholesky factorization. Requires a positive definite Jacobian.
    SparseCholesky,
}

/// The residual of an [`EnergyForm`] as a function of the global DOF vector.
#[derive(Debug)]
pub struct NonlinearProblem<'a, T, F, I, R>
where
    T: RealNumber,
{
    form: &'a EnergyForm<T, F, I, R>,
    num_dofs: usize,
    solver: LinearSolver,
}

impl<'a, T, F, I, R> NonlinearProblem<'a, T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    pub fn new(form: &'a EnergyForm<T, F, I, R>, num_dofs: usize) -> Self {
        Self {
            form,
            num_dofs,
            solver: LinearSolver::default(),
        }
    }

    pub fn with_solver(self, solver: LinearSolver) -> Self {
        Self { solver, ..self }
    }

    pub fn form(&self) -> &'a EnergyForm<T, F, I, R> {
        self.form
    }

    fn solve_dense(&self, sol: &mut DVectorViewMut<T>, x: &[T], rhs: &DVectorView<T>) -> eyre::Result<()> {
        let mut jacobian = self.form.assemble_jacobian_dense(x)?;
        apply_homogeneous_dirichlet_bc_matrix(&mut jacobian, self.form.essential_dofs());
        let mut rhs = rhs.clone_owned();
        apply_homogeneous_dirichlet_bc_rhs(&mut rhs, self.form.essential_dofs());
        let solution = jacobian
            .lu()
            .solve(&rhs)
            .ok_or_else(|| eyre!("Jacobian is singular"))?;
        sol.copy_from(&solution);
        Ok(())
    }

    fn solve_sparse(&self, sol: &mut DVectorViewMut<T>, x: &[T], rhs: &DVectorView<T>) -> eyre::Result<()> {
        let mut jacobian = self.form.assemble_jacobian_csr(x)?;
        apply_homogeneous_dirichlet_bc_csr(&mut jacobian, self.form.essential_dofs());
        let mut rhs = rhs.clone_owned();
        apply_homogeneous_dirichlet_bc_rhs(&mut rhs, self.form.essential_dofs());
        let cholesky = CscCholesky::factor(&CscMatrix::from(&jacobian))
            .map_err(|err| eyre!("Failed to factor Jacobian. Error: {}", err))?;
        let solution = cholesky.solve(&rhs);
        sol.copy_from(&solution.column(0));
        Ok(())
    }
}

impl<'a, T, F, I, R> VectorFunction<T> for NonlinearProblem<'a, T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    fn dimension(&self) -> usize {
        self.num_dofs
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), Box<dyn Error>> {
        self.form
            .assemble_residual_into(f.as_mut_slice(), x.as_slice())?;
        Ok(())
    }
}

impl<'a, T, F, I, R> DifferentiableVectorFunction<T> for NonlinearProblem<'a, T, F, I, R>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        match self.solver {
            LinearSolver::DenseLu => self.solve_dense(sol, x.as_slice(), rhs)?,
            LinearSolver::SparseCholesky => self.solve_sparse(sol, x.as_slice(), rhs)?,
        }
        Ok(())
    }
}

/// Finds a stationary point of the energy of `form` with Newton's method and backtracking.
///
/// `u` holds the initial guess on entry, including the prescribed values of essential DOFs,
/// and the solution on successful return. Returns the number of Newton iterations.
pub fn solve_stationary_point<T, F, I, R>(
    form: &EnergyForm<T, F, I, R>,
    u: &mut DVector<T>,
    settings: NewtonSettings<T>,
    solver: LinearSolver,
) -> eyre::Result<usize>
where
    T: RealNumber,
    F: EnergyFunctional<T>,
    I: ElementInterpolation<T>,
    R: ElementRestriction,
{
    let n = u.len();
    let problem = NonlinearProblem::new(form, n).with_solver(solver);
    let mut f = DVector::zeros(n);
    let mut dx = DVector::zeros(n);
    let iterations = newton_line_search(
        problem,
        &mut *u,
        &mut f,
        &mut dx,
        settings,
        &mut BacktrackingLineSearch::default(),
    )
    .map_err(|err| eyre!("Newton iterations failed. Error: {}", err))?;
    debug!("Newton converged in {} iterations with residual norm {}", iterations, f.norm());
    Ok(iterations)
}
