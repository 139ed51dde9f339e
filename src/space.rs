//! Registry of the variables, vectors and coordinates that a model is expressed in.
use crate::error::ConfigurationError;
use crate::operator::{DiffOp, OpDerivative};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spatial dimension of a modeling space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    One,
    Two,
    Three,
}

impl Dimension {
    pub fn as_usize(&self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }

    fn coordinate_names(&self) -> &'static [&'static str] {
        match self {
            Dimension::One => &["X"],
            Dimension::Two => &["X", "Y"],
            Dimension::Three => &["X", "Y", "Z"],
        }
    }
}

/// Names of the strain components in Voigt order: `xx, yy, zz, xy, xz, yz`.
pub const VOIGT_COMPONENTS: [&str; 6] = ["xx", "yy", "zz", "xy", "xz", "yz"];

/// Variables, vectors and coordinates of a model.
///
/// Each variable and coordinate is identified by a dense rank (its registration order).
/// Registering an existing name is a no-op that returns the existing rank, so the ranks are
/// stable for the lifetime of the space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelingSpace {
    dimension: Dimension,
    variables: Vec<String>,
    variable_ranks: BTreeMap<String, usize>,
    coordinates: Vec<String>,
    coordinate_ranks: BTreeMap<String, usize>,
    vectors: BTreeMap<String, Vec<usize>>,
}

impl ModelingSpace {
    pub fn new(dimension: Dimension) -> Self {
        let mut space = Self {
            dimension,
            variables: Vec::new(),
            variable_ranks: BTreeMap::new(),
            coordinates: Vec::new(),
            coordinate_ranks: BTreeMap::new(),
            vectors: BTreeMap::new(),
        };
        for name in dimension.coordinate_names() {
            space.new_coordinate(name);
        }
        space
    }

    /// A 3D space with the displacement vector `Disp = (DispX, DispY, DispZ)`.
    pub fn solid_3d() -> Self {
        let mut space = Self::new(Dimension::Three);
        space.new_displacement();
        space
    }

    /// A 2D space with the displacement vector `Disp = (DispX, DispY)`.
    pub fn solid_2d() -> Self {
        let mut space = Self::new(Dimension::Two);
        space.new_displacement();
        space
    }

    /// Registers the displacement vector `Disp` with one component per spatial dimension.
    pub fn new_displacement(&mut self) {
        let components: Vec<_> = ["DispX", "DispY", "DispZ"]
            .into_iter()
            .take(self.ndim())
            .collect();
        for name in &components {
            self.new_variable(name);
        }
        self.new_vector("Disp", &components)
            .expect("Must succeed since all components were just registered");
    }

    /// Registers the rotation vector `Rot = (RotX, RotY, RotZ)`.
    pub fn new_rotation(&mut self) {
        let components = ["RotX", "RotY", "RotZ"];
        for name in &components {
            self.new_variable(name);
        }
        self.new_vector("Rot", &components)
            .expect("Must succeed since all components were just registered");
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn ndim(&self) -> usize {
        self.dimension.as_usize()
    }

    /// Registers a variable and returns its rank.
    pub fn new_variable(&mut self, name: &str) -> usize {
        if let Some(&rank) = self.variable_ranks.get(name) {
            return rank;
        }
        let rank = self.variables.len();
        self.variables.push(name.to_string());
        self.variable_ranks.insert(name.to_string(), rank);
        rank
    }

    /// Registers a coordinate and returns its rank.
    pub fn new_coordinate(&mut self, name: &str) -> usize {
        if let Some(&rank) = self.coordinate_ranks.get(name) {
            return rank;
        }
        let rank = self.coordinates.len();
        self.coordinates.push(name.to_string());
        self.coordinate_ranks.insert(name.to_string(), rank);
        rank
    }

    /// Groups existing variables into a named vector.
    pub fn new_vector(&mut self, name: &str, components: &[&str]) -> eyre::Result<()> {
        let ranks = components
            .iter()
            .map(|component| self.variable_rank(component))
            .collect::<eyre::Result<Vec<_>>>()?;
        self.vectors.insert(name.to_string(), ranks);
        Ok(())
    }

    pub fn variable_rank(&self, name: &str) -> eyre::Result<usize> {
        self.variable_ranks
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownVariable(name.to_string()).into())
    }

    pub fn coordinate_rank(&self, name: &str) -> eyre::Result<usize> {
        self.coordinate_ranks
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownCoordinate(name.to_string()).into())
    }

    pub fn variable_name(&self, rank: usize) -> &str {
        &self.variables[rank]
    }

    pub fn coordinate_name(&self, rank: usize) -> &str {
        &self.coordinates[rank]
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn coordinates(&self) -> &[String] {
        &self.coordinates
    }

    pub fn nvar(&self) -> usize {
        self.variables.len()
    }

    pub fn contains_variable(&self, name: &str) -> bool {
        self.variable_ranks.contains_key(name)
    }

    pub fn vector(&self, name: &str) -> Option<&[usize]> {
        self.vectors.get(name).map(Vec::as_slice)
    }

    pub fn vectors(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.vectors
            .iter()
            .map(|(name, ranks)| (name.as_str(), ranks.as_slice()))
    }

    /// Variable names for `name`: the components of a vector, or `name` itself.
    pub fn expand_variable(&self, name: &str) -> eyre::Result<Vec<String>> {
        if let Some(ranks) = self.vectors.get(name) {
            Ok(ranks.iter().map(|&r| self.variables[r].clone()).collect())
        } else {
            self.variable_rank(name)?;
            Ok(vec![name.to_string()])
        }
    }

    /// Single-term operator `coefficient · ∂^order(variable)/∂coordinate^order`.
    ///
    /// With `order == 0` the coordinate is ignored.
    pub fn op(&self, variable: &str, coordinate: Option<&str>, order: u8) -> eyre::Result<DiffOp> {
        let variable = self.variable_rank(variable)?;
        let coordinate = match (order, coordinate) {
            (0, _) => None,
            (_, Some(name)) => Some(self.coordinate_rank(name)?),
            (_, None) => {
                return Err(ConfigurationError::InvalidSetting(
                    "a derivative operator needs a coordinate".to_string(),
                )
                .into())
            }
        };
        Ok(DiffOp::real(OpDerivative {
            variable,
            coordinate,
            order,
        }))
    }

    /// The components of the displacement vector as operators.
    pub fn op_disp(&self) -> eyre::Result<Vec<DiffOp>> {
        self.displacement_names()?
            .iter()
            .map(|name| self.op(name, None, 0))
            .collect()
    }

    /// Displacement gradient `grad_u[i][j] = ∂u_i/∂x_j` over the space dimension.
    pub fn op_grad_u(&self) -> eyre::Result<Vec<Vec<DiffOp>>> {
        let names = self.displacement_names()?;
        let ndim = self.ndim();
        names
            .iter()
            .map(|u| {
                (0..ndim)
                    .map(|j| self.op(u, Some(&self.coordinates[j]), 1))
                    .collect()
            })
            .collect()
    }

    /// Small-strain operator in Voigt order `xx, yy, zz, xy, xz, yz` with engineering shear.
    ///
    /// Components that do not exist in lower dimensions are empty operators.
    pub fn op_strain(&self) -> eyre::Result<[DiffOp; 6]> {
        let grad = self.op_grad_u()?;
        let ndim = self.ndim();
        let g = |i: usize, j: usize| {
            if i < ndim && j < ndim {
                grad[i][j].clone()
            } else {
                DiffOp::default()
            }
        };
        Ok([
            g(0, 0),
            g(1, 1),
            g(2, 2),
            g(0, 1) + g(1, 0),
            g(0, 2) + g(2, 0),
            g(1, 2) + g(2, 1),
        ])
    }

    /// Generalized beam strains `[axial, shear_y, shear_z, torsion, curvature_y, curvature_z]`
    /// in the local frame of the element, `X` being the beam axis.
    pub fn op_beam_strain(&self) -> eyre::Result<[DiffOp; 6]> {
        let d = |name: &str| self.op(name, Some("X"), 1);
        let v = |name: &str| self.op(name, None, 0);
        Ok([
            d("DispX")?,
            d("DispY")? - v("RotZ")?,
            d("DispZ")? + v("RotY")?,
            d("RotX")?,
            d("RotY")?,
            d("RotZ")?,
        ])
    }

    fn displacement_names(&self) -> eyre::Result<Vec<String>> {
        let ranks = self
            .vector("Disp")
            .ok_or_else(|| ConfigurationError::UnknownVector("Disp".to_string()))?;
        Ok(ranks.iter().map(|&r| self.variables[r].clone()).collect())
    }
}
