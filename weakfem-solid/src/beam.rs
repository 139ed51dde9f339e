use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use weakfem::assembly::Discretization;
use weakfem::operator::DiffOp;
use weakfem::weakform::WeakForm;

/// Section and material properties of a straight beam.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeamProperties {
    pub young: f64,
    pub poisson: f64,
    pub area: f64,
    /// Torsion constant.
    pub jx: f64,
    pub iyy: f64,
    pub izz: f64,
    /// Shear correction factor. Zero neglects shear deformation.
    pub shear_coefficient: f64,
}

impl BeamProperties {
    /// Properties of a full circular section of radius `r`.
    pub fn circular(young: f64, poisson: f64, r: f64) -> Self {
        let inertia = std::f64::consts::PI * r.powi(4) / 4.0;
        Self {
            young,
            poisson,
            area: std::f64::consts::PI * r * r,
            jx: 2.0 * inertia,
            iyy: inertia,
            izz: inertia,
            shear_coefficient: 0.0,
        }
    }

    pub fn shear_modulus(&self) -> f64 {
        self.young / (2.0 * (1.0 + self.poisson))
    }

    /// Section stiffness `[EA, kGA, kGA, GJ, EIyy, EIzz]` of the generalized strains.
    pub fn section_stiffness(&self) -> [f64; 6] {
        let g = self.shear_modulus();
        let k = self.shear_coefficient;
        [
            self.young * self.area,
            k * g * self.area,
            k * g * self.area,
            g * self.jx,
            self.young * self.iyy,
            self.young * self.izz,
        ]
    }
}

/// Euler-Bernoulli beam in 3D: `∫ ε_b(u*) · K ε_b(u)` over the generalized beam strains.
///
/// Requires the variables `DispX..DispZ` and `RotX..RotZ` and a beam element mesh.
#[derive(Clone, Debug)]
pub struct EulerBernoulliBeam {
    name: String,
    properties: BeamProperties,
}

impl EulerBernoulliBeam {
    pub fn new(properties: BeamProperties) -> Self {
        Self {
            name: "EulerBernoulliBeam".to_string(),
            properties,
        }
    }

    pub fn properties(&self) -> &BeamProperties {
        &self.properties
    }

    /// Generalized forces `[N, Ty, Tz, Mx, My, Mz]` at the integration points, one column per point.
    pub fn internal_forces(&self, discretization: &Discretization, dof: &DVector<f64>) -> eyre::Result<DMatrix<f64>> {
        let strains = discretization.space().op_beam_strain()?;
        let stiffness = self.properties.section_stiffness();
        let n_points = discretization.n_points()?;
        let mut forces = DMatrix::zeros(6, n_points);
        for (i, op) in strains.iter().enumerate() {
            let values = discretization.evaluate(op, dof)? * stiffness[i];
            forces.row_mut(i).tr_copy_from(&values);
        }
        Ok(forces)
    }
}

impl WeakForm for EulerBernoulliBeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn differential_operator(&self, discretization: &Discretization) -> eyre::Result<DiffOp> {
        let strains = discretization.space().op_beam_strain()?;
        let stiffness = self.properties.section_stiffness();
        let mut op = DiffOp::default();
        for (strain, k) in strains.iter().zip(stiffness) {
            if k != 0.0 {
                op = op + strain.virt().try_mul(&(strain * k))?;
            }
        }
        Ok(op)
    }
}
