//! Small-strain constitutive laws in Voigt notation `xx, yy, zz, xy, xz, yz` (engineering shear).
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use weakfem::weakform::{ConstitutiveLaw, TangentMatrix};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LameParameters {
    pub mu: f64,
    pub lambda: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YoungPoisson {
    pub young: f64,
    pub poisson: f64,
}

impl From<YoungPoisson> for LameParameters {
    fn from(params: YoungPoisson) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

impl YoungPoisson {
    pub fn shear_modulus(&self) -> f64 {
        LameParameters::from(*self).mu
    }
}

/// The 6x6 isotropic stiffness `σ = C ε`.
pub fn isotropic_stiffness(params: YoungPoisson) -> DMatrix<f64> {
    let LameParameters { mu, lambda } = params.into();
    let mut c = DMatrix::zeros(6, 6);
    for i in 0..3 {
        for j in 0..3 {
            c[(i, j)] = lambda;
        }
        c[(i, i)] += 2.0 * mu;
        c[(i + 3, i + 3)] = mu;
    }
    c
}

/// State shared by the laws below: the strain and stress of the last update and of the start of
/// the current increment.
#[derive(Clone, Debug, PartialEq)]
struct PointState {
    strain: DMatrix<f64>,
    stress: DMatrix<f64>,
}

impl Default for PointState {
    fn default() -> Self {
        Self {
            strain: DMatrix::zeros(0, 0),
            stress: DMatrix::zeros(0, 0),
        }
    }
}

impl PointState {
    fn zeros(n_points: usize) -> Self {
        Self {
            strain: DMatrix::zeros(6, n_points),
            stress: DMatrix::zeros(6, n_points),
        }
    }
}

/// Linear isotropic elasticity.
#[derive(Clone, Debug, PartialEq)]
pub struct ElasticIsotropic {
    params: YoungPoisson,
    stiffness: DMatrix<f64>,
    current: PointState,
    start: PointState,
}

impl ElasticIsotropic {
    pub fn new(young: f64, poisson: f64) -> Self {
        let params = YoungPoisson { young, poisson };
        Self {
            params,
            stiffness: isotropic_stiffness(params),
            current: PointState::default(),
            start: PointState::default(),
        }
    }

    pub fn parameters(&self) -> YoungPoisson {
        self.params
    }

    pub fn stiffness(&self) -> &DMatrix<f64> {
        &self.stiffness
    }
}

impl ConstitutiveLaw for ElasticIsotropic {
    fn name(&self) -> &str {
        "ElasticIsotropic"
    }

    fn initialize(&mut self, n_points: usize) -> eyre::Result<()> {
        self.current = PointState::zeros(n_points);
        self.start = self.current.clone();
        Ok(())
    }

    fn update(&mut self, strain: &DMatrix<f64>, _dt: f64) -> eyre::Result<()> {
        self.current.stress = &self.stiffness * strain;
        self.current.strain = strain.clone();
        Ok(())
    }

    fn tangent_matrix(&self) -> TangentMatrix {
        TangentMatrix::uniform(&self.stiffness)
    }

    fn stress(&self) -> Option<&DMatrix<f64>> {
        Some(&self.current.stress)
    }

    fn set_start(&mut self) {
        self.start = self.current.clone();
    }

    fn to_start(&mut self) {
        self.current = self.start.clone();
    }

    fn reset(&mut self) {
        let n_points = self.current.strain.ncols();
        self.current = PointState::zeros(n_points);
        self.start = self.current.clone();
    }
}

/// Elasticity stiffening with the strain energy: `σ = (1 + β e) C ε` with `e = εᵀ C ε`.
///
/// The tangent is `(1 + β e) C + 2 β (C ε)(C ε)ᵀ` and varies between points.
#[derive(Clone, Debug, PartialEq)]
pub struct CubicHardening {
    params: YoungPoisson,
    beta: f64,
    stiffness: DMatrix<f64>,
    current: PointState,
    start: PointState,
}

impl CubicHardening {
    pub fn new(young: f64, poisson: f64, beta: f64) -> Self {
        let params = YoungPoisson { young, poisson };
        Self {
            params,
            beta,
            stiffness: isotropic_stiffness(params),
            current: PointState::default(),
            start: PointState::default(),
        }
    }

    pub fn parameters(&self) -> YoungPoisson {
        self.params
    }

    fn point_tangent(&self, strain: &DVector<f64>) -> DMatrix<f64> {
        let c_eps = &self.stiffness * strain;
        let energy = strain.dot(&c_eps);
        &self.stiffness * (1.0 + self.beta * energy) + (&c_eps * c_eps.transpose()) * (2.0 * self.beta)
    }
}

impl ConstitutiveLaw for CubicHardening {
    fn name(&self) -> &str {
        "CubicHardening"
    }

    fn initialize(&mut self, n_points: usize) -> eyre::Result<()> {
        self.current = PointState::zeros(n_points);
        self.start = self.current.clone();
        Ok(())
    }

    fn update(&mut self, strain: &DMatrix<f64>, _dt: f64) -> eyre::Result<()> {
        let mut stress = &self.stiffness * strain;
        for (j, mut column) in stress.column_iter_mut().enumerate() {
            let energy = strain.column(j).dot(&column);
            column *= 1.0 + self.beta * energy;
        }
        self.current.stress = stress;
        self.current.strain = strain.clone();
        Ok(())
    }

    fn tangent_matrix(&self) -> TangentMatrix {
        let tangents: Vec<_> = self
            .current
            .strain
            .column_iter()
            .map(|strain| self.point_tangent(&strain.into_owned()))
            .collect();
        if tangents.is_empty() {
            return TangentMatrix::uniform(&self.stiffness);
        }
        TangentMatrix::per_point(&tangents).expect("Must succeed since every point tangent is 6x6")
    }

    fn stress(&self) -> Option<&DMatrix<f64>> {
        Some(&self.current.stress)
    }

    fn set_start(&mut self) {
        self.start = self.current.clone();
    }

    fn to_start(&mut self) {
        self.current = self.start.clone();
    }

    fn reset(&mut self) {
        let n_points = self.current.strain.ncols();
        self.current = PointState::zeros(n_points);
        self.start = self.current.clone();
    }
}
