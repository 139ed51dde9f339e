//! Solution of reduced linear systems.
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use weakfem_sparse::cg::{ConjugateGradient, JacobiPreconditioner, RelativeResidualCriterion, SolveErrorKind};

/// Linear solver used for the reduced system.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolverKind {
    /// Sparse Cholesky factorization, falling back to dense LU for systems that are not
    /// positive definite.
    Direct,
    /// Conjugate gradient with relative residual tolerance and optional Jacobi preconditioning.
    Cg { tolerance: f64, precondition: bool },
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::Direct
    }
}

impl SolverKind {
    pub fn cg() -> Self {
        SolverKind::Cg {
            tolerance: 1e-10,
            precondition: true,
        }
    }
}

/// Solves `A x = b` for a square sparse `A`.
pub fn solve_linear_system(a: &CsrMatrix<f64>, b: &DVector<f64>, kind: &SolverKind) -> eyre::Result<DVector<f64>> {
    if a.nrows() != a.ncols() || a.nrows() != b.len() {
        return Err(eyre::eyre!(
            "incompatible linear system: {}x{} matrix, right-hand side of length {}",
            a.nrows(),
            a.ncols(),
            b.len()
        ));
    }
    if b.is_empty() {
        return Ok(DVector::zeros(0));
    }
    match kind {
        SolverKind::Direct => solve_direct(a, b),
        SolverKind::Cg {
            tolerance,
            precondition,
        } => solve_cg(a, b, *tolerance, *precondition),
    }
}

fn solve_direct(a: &CsrMatrix<f64>, b: &DVector<f64>) -> eyre::Result<DVector<f64>> {
    match CscCholesky::factor(&CscMatrix::from(a)) {
        Ok(cholesky) => {
            let x = cholesky.solve(b);
            Ok(DVector::from_column_slice(x.as_slice()))
        }
        Err(err) => {
            warn!("Cholesky factorization failed ({err}), falling back to dense LU");
            DMatrix::from(a)
                .lu()
                .solve(b)
                .ok_or_else(|| eyre::eyre!("linear system is singular"))
        }
    }
}

fn solve_cg(a: &CsrMatrix<f64>, b: &DVector<f64>, tolerance: f64, precondition: bool) -> eyre::Result<DVector<f64>> {
    let mut x = DVector::zeros(b.len());
    let cg = ConjugateGradient::new()
        .with_operator(a)
        .with_stopping_criterion(RelativeResidualCriterion::new(tolerance))
        .with_max_iter(10 * b.len());
    let result = if precondition {
        cg.with_preconditioner(JacobiPreconditioner::from_csr(a))
            .solve_with_guess(b, &mut x)
    } else {
        cg.solve_with_guess(b, &mut x)
    };
    match result {
        Ok(output) => {
            debug!(
                "CG converged in {} iterations (residual {:e})",
                output.num_iterations, output.residual_norm
            );
            Ok(x)
        }
        Err(err) => match err.kind {
            SolveErrorKind::MaxIterationsReached { max_iter } => {
                warn!(
                    "CG did not converge within {max_iter} iterations (residual {:e}), using the last iterate",
                    err.output.residual_norm
                );
                Ok(x)
            }
            _ => Err(eyre::eyre!("{err}")),
        },
    }
}
