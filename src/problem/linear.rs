use crate::assembly::{Compute, GlobalAssembly};
use crate::boundary_conditions::BoundaryConditionList;
use crate::error::ConfigurationError;
use crate::problem::{Problem, SystemMatrix};
use crate::solver::SolverKind;
use log::info;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// A static linear problem `K X = B + D`.
pub struct LinearProblem {
    problem: Problem,
    assembly: Box<dyn GlobalAssembly>,
}

impl LinearProblem {
    pub fn new(assembly: impl GlobalAssembly + 'static) -> eyre::Result<Self> {
        Self::from_boxed(Box::new(assembly))
    }

    pub fn from_boxed(mut assembly: Box<dyn GlobalAssembly>) -> eyre::Result<Self> {
        assembly.initialize(0.0)?;
        let problem = Problem::new(Arc::clone(assembly.space()), Arc::clone(assembly.mesh()));
        let mut linear = Self { problem, assembly };
        linear.refresh(Compute::All)?;
        Ok(linear)
    }

    fn refresh(&mut self, compute: Compute) -> eyre::Result<()> {
        if compute.matrix() {
            let a = self.assembly.global_matrix()?.clone();
            self.problem.set_a(SystemMatrix::Sparse(a));
        }
        if compute.vector() {
            let d = self.assembly.global_vector()?.clone();
            self.problem.set_d(d);
        }
        Ok(())
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn problem_mut(&mut self) -> &mut Problem {
        &mut self.problem
    }

    pub fn assembly(&self) -> &dyn GlobalAssembly {
        self.assembly.as_ref()
    }

    pub fn assembly_mut(&mut self) -> &mut dyn GlobalAssembly {
        self.assembly.as_mut()
    }

    pub fn bc(&self) -> &BoundaryConditionList {
        self.problem.bc()
    }

    pub fn bc_mut(&mut self) -> &mut BoundaryConditionList {
        self.problem.bc_mut()
    }

    pub fn set_solver(&mut self, solver: SolverKind) {
        self.problem.set_solver(solver);
    }

    pub fn apply_boundary_conditions(&mut self) -> eyre::Result<()> {
        self.problem.apply_boundary_conditions(1.0, None)
    }

    /// Solves the system and updates the weak form with the solution.
    pub fn solve(&mut self) -> eyre::Result<()> {
        self.problem.solve()?;
        info!("Solved linear problem '{}' with {} dofs", self.assembly.name(), self.problem.n_dof());
        self.update(Compute::None)
    }

    /// Updates the weak form from the current solution and refreshes the requested parts of the
    /// system.
    pub fn update(&mut self, compute: Compute) -> eyre::Result<()> {
        let x = self.problem.x().clone();
        self.assembly.update(&x, 1.0, compute)?;
        self.refresh(compute)
    }

    /// Restores the initial state of the weak form and reassembles the system.
    pub fn reset(&mut self) -> eyre::Result<()> {
        self.assembly.reset()?;
        let space = Arc::clone(self.problem.space());
        let mesh = Arc::clone(self.problem.mesh());
        let bc = self.problem.bc().clone();
        let solver = *self.problem.solver();
        self.problem = Problem::new(space, mesh);
        *self.problem.bc_mut() = bc;
        self.problem.set_solver(solver);
        self.refresh(Compute::All)
    }

    /// Replaces the assembly, keeping constraints and solution.
    pub fn change_assembly(&mut self, assembly: impl GlobalAssembly + 'static, update: bool) -> eyre::Result<()> {
        let mut assembly: Box<dyn GlobalAssembly> = Box::new(assembly);
        if assembly.n_dof() != self.problem.n_dof() {
            return Err(ConfigurationError::DimensionMismatch {
                context: format!("dofs of assembly '{}'", assembly.name()),
                expected: self.problem.n_dof(),
                actual: assembly.n_dof(),
            }
            .into());
        }
        if update {
            assembly.update(self.problem.x(), 1.0, Compute::All)?;
        }
        self.assembly = assembly;
        self.refresh(Compute::All)
    }

    pub fn x(&self) -> &DVector<f64> {
        self.problem.x()
    }

    pub fn dof_solution(&self, variable: &str) -> eyre::Result<DVector<f64>> {
        self.problem.dof_solution(variable)
    }

    /// Components of a vector variable, one column per component.
    pub fn vector_solution(&self, vector: &str) -> eyre::Result<DMatrix<f64>> {
        let names = self.problem.space().expand_variable(vector)?;
        let columns = names
            .iter()
            .map(|name| self.problem.dof_solution(name))
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(DMatrix::from_columns(&columns))
    }

    pub fn disp(&self) -> eyre::Result<DMatrix<f64>> {
        self.vector_solution("Disp")
    }

    pub fn rot(&self) -> eyre::Result<DMatrix<f64>> {
        self.vector_solution("Rot")
    }

    /// Stored energy `½ Xᵀ K X`.
    pub fn elastic_energy(&self) -> eyre::Result<f64> {
        let x = self.problem.x();
        match self.problem.a() {
            Some(SystemMatrix::Sparse(a)) => Ok(0.5 * x.dot(&(a * x))),
            Some(SystemMatrix::Diagonal(diagonal)) => Ok(0.5 * x.dot(&x.component_mul(diagonal))),
            None => Err(eyre::eyre!("the system matrix has not been assembled")),
        }
    }

    /// Forces `K X - D` needed to hold the current solution.
    pub fn ext_forces(&self) -> eyre::Result<DVector<f64>> {
        let x = self.problem.x();
        let kx = match self.problem.a() {
            Some(SystemMatrix::Sparse(a)) => a * x,
            Some(SystemMatrix::Diagonal(diagonal)) => x.component_mul(diagonal),
            None => return Err(eyre::eyre!("the system matrix has not been assembled")),
        };
        Ok(kx - self.problem.d())
    }
}
