//! Preconditioned conjugate gradient for symmetric positive definite operators.
use core::fmt;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// An operator `y = A x` acting on dense vectors.
pub trait LinearOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>>;
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator>::apply(self, y, x)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        y.gemv(1.0, self, &x, 0.0);
        Ok(())
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        spmm_csr_dense(0.0, &mut y, 1.0, Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Jacobi preconditioner, i.e. multiplication by the inverse of the operator diagonal.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner {
    inverse_diagonal: DVector<f64>,
}

impl JacobiPreconditioner {
    /// Builds the preconditioner from the diagonal of `matrix`.
    ///
    /// Zero diagonal entries are left unscaled.
    pub fn from_csr(matrix: &CsrMatrix<f64>) -> Self {
        let diagonal = crate::sparse::diagonal(matrix);
        Self::from_diagonal(&diagonal)
    }

    pub fn from_diagonal(diagonal: &DVector<f64>) -> Self {
        let inverse_diagonal = diagonal.map(|d| if d != 0.0 { 1.0 / d } else { 1.0 });
        Self { inverse_diagonal }
    }
}

impl LinearOperator for JacobiPreconditioner {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x.component_mul(&self.inverse_diagonal));
        Ok(())
    }
}

pub trait CgStoppingCriterion {
    fn has_converged(&self, b_norm: f64, iteration: usize, approx_residual: DVectorView<f64>) -> bool;
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// The residual is the recursively updated CG residual, which for ill-conditioned problems
/// may drift away from the true residual `b - Ax`.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion {
    tol: f64,
}

impl RelativeResidualCriterion {
    pub fn new(tol: f64) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl CgStoppingCriterion for RelativeResidualCriterion {
    fn has_converged(&self, b_norm: f64, _iteration: usize, approx_residual: DVectorView<f64>) -> bool {
        approx_residual.norm() <= self.tol * b_norm
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "error applying operator: {err}"),
            Self::PreconditionerError(err) => write!(f, "error applying preconditioner: {err}"),
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "indefinite preconditioner"),
            Self::MaxIterationsReached { max_iter } => write!(f, "max iterations ({max_iter}) reached"),
        }
    }
}

/// A failed solve. `output` describes the state of the solution vector, which holds the last
/// iterate and may be used as a best-effort result.
#[derive(Debug)]
pub struct SolveError {
    pub output: CgOutput,
    pub kind: SolveErrorKind,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl Error for SolveError {}

#[derive(Debug, Clone, Default)]
pub struct CgOutput {
    /// Number of updates made to the initial solution vector.
    pub num_iterations: usize,
    /// Norm of the CG residual at exit.
    pub residual_norm: f64,
}

#[derive(Debug)]
pub struct ConjugateGradient<A, P, Criterion> {
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl ConjugateGradient<(), IdentityOperator, RelativeResidualCriterion> {
    pub fn new() -> Self {
        Self {
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: RelativeResidualCriterion::default(),
            max_iter: None,
        }
    }
}

impl Default for ConjugateGradient<(), IdentityOperator, RelativeResidualCriterion> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion> {
    pub fn with_operator<A2>(self, operator: A2) -> ConjugateGradient<A2, P, Criterion> {
        ConjugateGradient {
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<A, P2, Criterion> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion<C2>(self, stopping_criterion: C2) -> ConjugateGradient<A, P, C2> {
        ConjugateGradient {
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<A, P, Criterion> ConjugateGradient<A, P, Criterion>
where
    A: LinearOperator,
    P: LinearOperator,
    Criterion: CgStoppingCriterion,
{
    /// Solves `A x = b`, starting from the current contents of `x`.
    #[allow(non_snake_case)]
    pub fn solve_with_guess(&self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<CgOutput, SolveError> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len(), "right-hand side and solution must have the same length");

        let n = x.len();
        let mut output = CgOutput::default();
        let fail = |output: &CgOutput, kind| SolveError {
            output: output.clone(),
            kind,
        };

        let mut r = DVector::zeros(n);
        let mut z = DVector::zeros(n);
        let mut Ap = DVector::zeros(n);

        // r = b - Ax
        self.operator
            .apply((&mut r).into(), (&*x).into())
            .map_err(|err| fail(&output, OperatorError(err)))?;
        r.zip_apply(b, |r_i, b_i| *r_i = b_i - *r_i);

        let b_norm = b.norm();
        if b_norm == 0.0 {
            x.fill(0.0);
            return Ok(output);
        }

        // z = Pr
        self.preconditioner
            .apply((&mut z).into(), (&r).into())
            .map_err(|err| fail(&output, PreconditionerError(err)))?;
        let mut p = z.clone();
        let mut zTr = z.dot(&r);

        loop {
            output.residual_norm = r.norm();
            if self
                .stopping_criterion
                .has_converged(b_norm, output.num_iterations, (&r).into())
            {
                return Ok(output);
            }
            if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(fail(&output, MaxIterationsReached { max_iter }));
                }
            }

            self.operator
                .apply((&mut Ap).into(), (&p).into())
                .map_err(|err| fail(&output, OperatorError(err)))?;
            let pAp = p.dot(&Ap);
            if pAp <= 0.0 {
                return Err(fail(&output, IndefiniteOperator));
            }
            if zTr <= 0.0 {
                return Err(fail(&output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &Ap, 1.0);
            output.num_iterations += 1;

            self.preconditioner
                .apply((&mut z).into(), (&r).into())
                .map_err(|err| fail(&output, PreconditionerError(err)))?;
            let zTr_next = z.dot(&r);
            let beta = zTr_next / zTr;
            // p <- z + beta * p
            p.axpy(1.0, &z, beta);
            zTr = zTr_next;
        }
    }
}
