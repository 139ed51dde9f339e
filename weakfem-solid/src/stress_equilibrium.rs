use log::debug;
use nalgebra::DMatrix;
use weakfem::assembly::Discretization;
use weakfem::operator::{Coefficient, DiffOp};
use weakfem::weakform::{ConstitutiveLaw, WeakForm};

/// Small-strain equilibrium `∫ ε(u*) : σ(u) = ∫ u* · f`.
///
/// The bilinear part uses the tangent of the constitutive law. Once the law holds a stress,
/// the weak form also carries the load term `-∫ ε(u*) : σ`, so the assembled vector is the
/// negated internal force and `B + D` is the out-of-balance force of an incremental problem.
pub struct StressEquilibrium {
    name: String,
    law: Box<dyn ConstitutiveLaw>,
}

impl StressEquilibrium {
    pub fn new(law: impl ConstitutiveLaw + 'static) -> Self {
        Self {
            name: "StressEquilibrium".to_string(),
            law: Box::new(law),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Stress at the integration points, one column per point.
    pub fn stress(&self) -> Option<&DMatrix<f64>> {
        self.law.stress()
    }
}

/// Voigt strain at every integration point, one column per point.
pub fn strain_at_points(discretization: &Discretization, dof: &nalgebra::DVector<f64>) -> eyre::Result<DMatrix<f64>> {
    let strain_ops = discretization.space().op_strain()?;
    let n_points = discretization.n_points()?;
    let mut strain = DMatrix::zeros(6, n_points);
    for (i, op) in strain_ops.iter().enumerate() {
        if !op.is_empty() {
            let values = discretization.evaluate(op, dof)?;
            strain.row_mut(i).tr_copy_from(&values);
        }
    }
    Ok(strain)
}

impl WeakForm for StressEquilibrium {
    fn name(&self) -> &str {
        &self.name
    }

    fn differential_operator(&self, discretization: &Discretization) -> eyre::Result<DiffOp> {
        let eps = discretization.space().op_strain()?;
        let eps_vir: Vec<DiffOp> = eps.iter().map(DiffOp::virt).collect();
        let tangent = self.law.tangent_matrix();

        let mut op = DiffOp::default();
        for i in 0..6 {
            if eps_vir[i].is_empty() {
                continue;
            }
            for j in 0..6 {
                let coefficient = tangent.get(i, j);
                if eps[j].is_empty() || coefficient.is_zero() {
                    continue;
                }
                op = op + eps_vir[i].try_mul(&(&eps[j] * coefficient))?;
            }
        }

        if let Some(stress) = self.law.stress() {
            if stress.iter().any(|&s| s != 0.0) {
                for (i, row) in stress.row_iter().enumerate() {
                    if !eps_vir[i].is_empty() {
                        op = op + &eps_vir[i] * &Coefficient::Field(row.transpose());
                    }
                }
            }
        }
        Ok(op)
    }

    fn constitutive_law(&self) -> Option<&dyn ConstitutiveLaw> {
        Some(self.law.as_ref())
    }

    fn constitutive_law_mut(&mut self) -> Option<&mut dyn ConstitutiveLaw> {
        Some(self.law.as_mut())
    }

    fn update(&mut self, discretization: &Discretization, dof: &nalgebra::DVector<f64>, dt: f64) -> eyre::Result<()> {
        let strain = strain_at_points(discretization, dof)?;
        debug!("Updating {} with strain at {} points", self.law.name(), strain.ncols());
        self.law.update(&strain, dt)
    }
}
