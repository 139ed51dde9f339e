//! Linear and nonlinear problems built on a global assembly.
use crate::boundary_conditions::BoundaryConditionList;
use crate::constraint::ConstraintReduction;
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::solver::{solve_linear_system, SolverKind};
use crate::space::ModelingSpace;
use log::warn;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;
use weakfem_sparse::sparse::gather;

mod linear;
mod nonlinear;

pub use linear::LinearProblem;
pub use nonlinear::{
    ConvergenceCriterion, IncrementOutcome, NewtonRaphsonSettings, NlSolveOptions, NlSolveReport, NonLinearProblem,
    OutputInterval, Snapshot,
};

/// System matrix of a problem.
#[derive(Debug, Clone)]
pub enum SystemMatrix {
    Sparse(CsrMatrix<f64>),
    /// Diagonal system, solved by division without factorization.
    Diagonal(DVector<f64>),
}

/// A linear system `A X = B + D` with constraints.
///
/// `B` holds the Neumann loads of the boundary conditions and `D` the vector of the assembly.
#[derive(Debug, Clone)]
pub struct Problem {
    space: Arc<ModelingSpace>,
    mesh: Arc<Mesh>,
    a: Option<SystemMatrix>,
    b: DVector<f64>,
    d: DVector<f64>,
    x: DVector<f64>,
    x_free: DVector<f64>,
    bc: BoundaryConditionList,
    reduction: Option<ConstraintReduction>,
    solver: SolverKind,
}

impl Problem {
    pub fn new(space: Arc<ModelingSpace>, mesh: Arc<Mesh>) -> Self {
        let n_dof = space.nvar() * mesh.n_nodes();
        Self {
            bc: BoundaryConditionList::new(Arc::clone(&space)),
            space,
            mesh,
            a: None,
            b: DVector::zeros(n_dof),
            d: DVector::zeros(n_dof),
            x: DVector::zeros(n_dof),
            x_free: DVector::zeros(0),
            reduction: None,
            solver: SolverKind::default(),
        }
    }

    pub fn n_dof(&self) -> usize {
        self.space.nvar() * self.mesh.n_nodes()
    }

    pub fn space(&self) -> &Arc<ModelingSpace> {
        &self.space
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn bc(&self) -> &BoundaryConditionList {
        &self.bc
    }

    pub fn bc_mut(&mut self) -> &mut BoundaryConditionList {
        &mut self.bc
    }

    pub fn set_solver(&mut self, solver: SolverKind) {
        self.solver = solver;
    }

    pub fn solver(&self) -> &SolverKind {
        &self.solver
    }

    pub fn set_a(&mut self, a: SystemMatrix) {
        self.a = Some(a);
    }

    pub fn a(&self) -> Option<&SystemMatrix> {
        self.a.as_ref()
    }

    pub fn set_d(&mut self, d: DVector<f64>) {
        self.d = d;
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn x(&self) -> &DVector<f64> {
        &self.x
    }

    /// Free dof values of the last solve.
    pub fn x_free(&self) -> &DVector<f64> {
        &self.x_free
    }

    pub fn reduction(&self) -> eyre::Result<&ConstraintReduction> {
        self.reduction
            .as_ref()
            .ok_or_else(|| eyre::eyre!("boundary conditions must be applied before solving"))
    }

    /// Sets the prescribed part of the solution to zero, keeping the constraint structure.
    pub fn clear_prescribed_values(&mut self) {
        if let Some(reduction) = &mut self.reduction {
            reduction.xbc.fill(0.0);
        }
    }

    /// Starts the boundary conditions from the dofs `u` and the Neumann loads last applied.
    pub fn set_bc_start_to_current(&mut self, u: &DVector<f64>) -> eyre::Result<()> {
        self.bc.set_start_to_current(&self.mesh, u, &self.b)
    }

    /// Evaluates the constraints at a time factor and stores the resulting reduction and loads.
    pub fn apply_boundary_conditions(&mut self, t_fact: f64, t_fact_old: Option<f64>) -> eyre::Result<()> {
        let reduction = self.bc.reduce(&self.mesh, t_fact, t_fact_old)?;
        self.b = reduction.neumann.clone();
        self.reduction = Some(reduction);
        Ok(())
    }

    /// Reduced residual `Mᵀ (B + D)` at the current state.
    pub fn reduced_residual(&self) -> eyre::Result<DVector<f64>> {
        let reduction = self.reduction()?;
        Ok(&reduction.matrix.transpose() * &(&self.b + &self.d))
    }

    /// Solves the constrained system and stores the full solution.
    pub fn solve(&mut self) -> eyre::Result<()> {
        let reduction = self
            .reduction
            .as_ref()
            .ok_or_else(|| eyre::eyre!("boundary conditions must be applied before solving"))?;
        let a = self
            .a
            .as_ref()
            .ok_or_else(|| eyre::eyre!("the system matrix must be set before solving"))?;
        let rhs = &self.b + &self.d;

        let x_free = match a {
            SystemMatrix::Diagonal(diagonal) => {
                if reduction.has_multi_point() {
                    return Err(ConfigurationError::InvalidSetting(
                        "multi-point constraints are not supported with a diagonal system".to_string(),
                    )
                    .into());
                }
                let mut x_free = gather(&rhs, &reduction.free);
                for (value, &dof) in x_free.iter_mut().zip(&reduction.free) {
                    *value /= diagonal[dof];
                }
                x_free
            }
            SystemMatrix::Sparse(a) => {
                if reduction.prescribed.is_empty() {
                    warn!("No Dirichlet condition has been applied, the system may be singular");
                }
                let mt = reduction.matrix.transpose();
                let a_reduced = &(&mt * a) * &reduction.matrix;
                let rhs_reduced = &mt * &(rhs - a * &reduction.xbc);
                solve_linear_system(&a_reduced, &rhs_reduced, &self.solver)?
            }
        };
        self.x = reduction.expand(&x_free);
        self.x_free = x_free;
        Ok(())
    }

    /// Values of a variable at every node.
    pub fn dof_solution(&self, variable: &str) -> eyre::Result<DVector<f64>> {
        let rank = self.space.variable_rank(variable)?;
        let n = self.mesh.n_nodes();
        Ok(self.x.rows(rank * n, n).into_owned())
    }
}
