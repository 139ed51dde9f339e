use weakfem::assembly::Discretization;
use weakfem::operator::{Coefficient, DiffOp};
use weakfem::weakform::WeakForm;

/// A volume force density `f`, i.e. the weak form term `∫ f · u*`.
///
/// For gravity, `f = ρ g`. Each component may be uniform or a field located at the integration
/// points, nodes or elements.
#[derive(Clone, Debug)]
pub struct BodyForce {
    name: String,
    force: Vec<Coefficient>,
}

impl BodyForce {
    pub fn new(force: Vec<Coefficient>) -> Self {
        Self {
            name: "BodyForce".to_string(),
            force,
        }
    }

    /// Gravity with density `rho` and acceleration `g`.
    pub fn gravity(rho: f64, g: &[f64]) -> Self {
        Self::new(g.iter().map(|&gi| Coefficient::Scalar(rho * gi)).collect())
    }
}

impl WeakForm for BodyForce {
    fn name(&self) -> &str {
        &self.name
    }

    fn differential_operator(&self, discretization: &Discretization) -> eyre::Result<DiffOp> {
        let disp = discretization.space().op_disp()?;
        // The assembled vector holds the negated load terms, so external forces enter with a minus.
        Ok(disp
            .iter()
            .zip(&self.force)
            .map(|(u, f)| u.virt() * Coefficient::Scalar(-1.0) * f.clone())
            .sum())
    }
}

/// Inertia term `∫ ρ u* · u`, i.e. the mass matrix.
#[derive(Clone, Debug)]
pub struct Inertia {
    name: String,
    density: Coefficient,
}

impl Inertia {
    pub fn new(density: impl Into<Coefficient>) -> Self {
        Self {
            name: "Inertia".to_string(),
            density: density.into(),
        }
    }
}

impl WeakForm for Inertia {
    fn name(&self) -> &str {
        &self.name
    }

    fn differential_operator(&self, discretization: &Discretization) -> eyre::Result<DiffOp> {
        let disp = discretization.space().op_disp()?;
        let mut op = DiffOp::default();
        for u in &disp {
            op = op + u.virt().try_mul(&(u * &self.density))?;
        }
        Ok(op)
    }
}
