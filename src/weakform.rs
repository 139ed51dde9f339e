//! Interfaces implemented by physical models: weak forms and constitutive laws.
use crate::assembly::{AssemblyOptions, Discretization};
use crate::error::ConfigurationError;
use crate::operator::{Coefficient, DiffOp};
use nalgebra::{DMatrix, DVector};

/// A weak form: a differential operator plus the state it depends on.
///
/// The lifecycle hooks are called by the assembly. Stateful weak forms (e.g. carrying a
/// constitutive law with internal variables) update their state in [`WeakForm::update`] and
/// commit or roll it back in [`WeakForm::set_start`] and [`WeakForm::to_start`].
pub trait WeakForm {
    fn name(&self) -> &str;

    /// The operator to assemble in the current state.
    fn differential_operator(&self, discretization: &Discretization) -> eyre::Result<DiffOp>;

    /// Preferred assembly options of this weak form.
    fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions::default()
    }

    fn constitutive_law(&self) -> Option<&dyn ConstitutiveLaw> {
        None
    }

    fn constitutive_law_mut(&mut self) -> Option<&mut dyn ConstitutiveLaw> {
        None
    }

    fn initialize(&mut self, _discretization: &Discretization, _t0: f64) -> eyre::Result<()> {
        Ok(())
    }

    /// Updates the state from the trial dof vector `dof` at the end of an increment of length `dt`.
    fn update(&mut self, _discretization: &Discretization, _dof: &DVector<f64>, _dt: f64) -> eyre::Result<()> {
        Ok(())
    }

    /// Starts a new increment from the current state.
    fn set_start(&mut self, _discretization: &Discretization, _dt: f64) -> eyre::Result<()> {
        Ok(())
    }

    /// Restores the state at the start of the current increment.
    fn to_start(&mut self) {}

    /// Restores the initial state.
    fn reset(&mut self) {}
}

/// Material behavior evaluated at the integration points of a mesh.
///
/// Strains and stresses are stored in Voigt notation, one column per point.
pub trait ConstitutiveLaw {
    fn name(&self) -> &str;

    fn initialize(&mut self, _n_points: usize) -> eyre::Result<()> {
        Ok(())
    }

    /// Computes the stress and tangent for the given total strain.
    fn update(&mut self, strain: &DMatrix<f64>, dt: f64) -> eyre::Result<()>;

    /// Tangent matrix in Voigt notation.
    fn tangent_matrix(&self) -> TangentMatrix;

    /// Current stress, if any has been computed.
    fn stress(&self) -> Option<&DMatrix<f64>> {
        None
    }

    fn set_start(&mut self) {}

    fn to_start(&mut self) {}

    fn reset(&mut self) {}
}

/// Square matrix of coefficients, uniform or varying over the integration points.
#[derive(Debug, Clone, PartialEq)]
pub struct TangentMatrix {
    size: usize,
    entries: Vec<Coefficient>,
}

impl TangentMatrix {
    /// A tangent that is the same at every point.
    pub fn uniform(matrix: &DMatrix<f64>) -> Self {
        assert!(matrix.is_square(), "tangent matrix must be square");
        let size = matrix.nrows();
        let entries = (0..size * size)
            .map(|k| Coefficient::Scalar(matrix[(k / size, k % size)]))
            .collect();
        Self { size, entries }
    }

    /// A tangent with one matrix per point.
    pub fn per_point(matrices: &[DMatrix<f64>]) -> eyre::Result<Self> {
        let size = matrices.first().map(|m| m.nrows()).unwrap_or(0);
        if let Some(m) = matrices.iter().find(|m| m.shape() != (size, size)) {
            return Err(ConfigurationError::DimensionMismatch {
                context: "tangent matrix per point".to_string(),
                expected: size,
                actual: m.nrows(),
            }
            .into());
        }
        let entries = (0..size * size)
            .map(|k| {
                let (i, j) = (k / size, k % size);
                Coefficient::Field(DVector::from_iterator(matrices.len(), matrices.iter().map(|m| m[(i, j)])))
            })
            .collect();
        Ok(Self { size, entries })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> &Coefficient {
        &self.entries[i * self.size + j]
    }
}
