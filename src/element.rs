//! Element types, their interpolations and quadrature rules.
use crate::error::ConfigurationError;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use weakfem_quadrature::{simplex, tensor, univariate};

mod hermite;
mod lagrange;

pub use hermite::HermiteBasis;
pub use lagrange::Shape;

/// Element types supported by the assembly.
///
/// The set is closed: every variant has a fixed geometry, a default number of Gauss points and a
/// table mapping variable names to interpolations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// A single node, used for point-wise (finite difference) equations.
    Node,
    Lin2,
    Tri3,
    Quad4,
    Tet4,
    Hex8,
    /// Two-node Euler-Bernoulli beam with cubic Hermite bending interpolation.
    BernoulliBeam,
}

/// Interpolation of a single variable inside an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interpolation {
    Lagrange(Shape),
    /// Transverse displacement; the associated variable is the bending rotation.
    HermiteDisplacement,
    /// Bending rotation; the associated variable is the transverse displacement.
    HermiteRotation,
}

impl Interpolation {
    pub fn is_hermite(&self) -> bool {
        !matches!(self, Interpolation::Lagrange(_))
    }

    /// Number of coefficient blocks contributed by each evaluation: the own variable, plus the
    /// associated variable for Hermite interpolations.
    pub fn num_blocks(&self) -> usize {
        if self.is_hermite() {
            2
        } else {
            1
        }
    }
}

/// Interpolation of a variable, and the variable it is coupled to, if any.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VariableInterpolation {
    pub interpolation: Interpolation,
    /// Name and factor of the associated variable.
    pub associated: Option<(&'static str, f64)>,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Node => "node",
            ElementType::Lin2 => "lin2",
            ElementType::Tri3 => "tri3",
            ElementType::Quad4 => "quad4",
            ElementType::Tet4 => "tet4",
            ElementType::Hex8 => "hex8",
            ElementType::BernoulliBeam => "bernoulliBeam",
        }
    }

    /// Lagrange shape of the element geometry.
    pub fn geometry(&self) -> Shape {
        match self {
            ElementType::Node => Shape::Point,
            ElementType::Lin2 | ElementType::BernoulliBeam => Shape::Segment,
            ElementType::Tri3 => Shape::Triangle,
            ElementType::Quad4 => Shape::Quadrilateral,
            ElementType::Tet4 => Shape::Tetrahedron,
            ElementType::Hex8 => Shape::Hexahedron,
        }
    }

    pub fn nodes_per_element(&self) -> usize {
        self.geometry().num_nodes()
    }

    pub fn reference_dim(&self) -> usize {
        self.geometry().reference_dim()
    }

    /// Number of Gauss points used when the assembly does not request a specific count.
    ///
    /// Zero means point-wise evaluation at nodes.
    pub fn default_gauss_points(&self) -> usize {
        match self {
            ElementType::Node => 0,
            ElementType::Lin2 => 2,
            ElementType::Tri3 => 3,
            ElementType::Quad4 => 4,
            ElementType::Tet4 => 4,
            ElementType::Hex8 => 8,
            ElementType::BernoulliBeam => 3,
        }
    }

    /// Whether element operators act on element-local degrees of freedom that must be rotated
    /// into the global frame.
    pub fn has_local_frame(&self) -> bool {
        matches!(self, ElementType::BernoulliBeam)
    }

    /// Interpolation used for the variable with the given name.
    pub fn interpolation_for(&self, variable: &str) -> VariableInterpolation {
        let lagrange = |shape| VariableInterpolation {
            interpolation: Interpolation::Lagrange(shape),
            associated: None,
        };
        match self {
            ElementType::BernoulliBeam => {
                let hermite = |interpolation, name, factor| VariableInterpolation {
                    interpolation,
                    associated: Some((name, factor)),
                };
                match variable {
                    "DispY" => hermite(Interpolation::HermiteDisplacement, "RotZ", 1.0),
                    "DispZ" => hermite(Interpolation::HermiteDisplacement, "RotY", -1.0),
                    "RotY" => hermite(Interpolation::HermiteRotation, "DispZ", -1.0),
                    "RotZ" => hermite(Interpolation::HermiteRotation, "DispY", 1.0),
                    _ => lagrange(Shape::Segment),
                }
            }
            other => lagrange(other.geometry()),
        }
    }

    /// All interpolations used by the element family.
    pub fn interpolations(&self) -> Vec<Interpolation> {
        let mut interpolations = vec![Interpolation::Lagrange(self.geometry())];
        if self.has_local_frame() {
            interpolations.push(Interpolation::HermiteDisplacement);
            interpolations.push(Interpolation::HermiteRotation);
        }
        interpolations
    }

    /// Quadrature weights and reference points with `num_points` points.
    ///
    /// Points are padded with zeros to three reference coordinates.
    pub fn quadrature(&self, num_points: usize) -> eyre::Result<(Vec<f64>, Vec<[f64; 3]>)> {
        let unavailable = || ConfigurationError::UnsupportedElement {
            element: self.name().to_string(),
            reason: format!("no quadrature rule with {num_points} points"),
        };
        let per_direction = |dim: u32| {
            let n = (num_points as f64).powf(1.0 / dim as f64).round() as usize;
            (n.pow(dim) == num_points).then_some(n)
        };
        let pad = |p: &[f64]| {
            let mut point = [0.0; 3];
            point[..p.len()].copy_from_slice(p);
            point
        };
        let (weights, points): (Vec<f64>, Vec<[f64; 3]>) = match self.geometry() {
            Shape::Point => return Err(unavailable().into()),
            Shape::Segment => {
                let (w, p) = univariate::gauss(num_points).map_err(|_| unavailable())?;
                (w, p.iter().map(|p| pad(p)).collect())
            }
            Shape::Triangle => {
                let (w, p) = simplex::triangle(num_points).map_err(|_| unavailable())?;
                (w, p.iter().map(|p| pad(p)).collect())
            }
            Shape::Tetrahedron => {
                let (w, p) = simplex::tetrahedron(num_points).map_err(|_| unavailable())?;
                (w, p.iter().map(|p| pad(p)).collect())
            }
            Shape::Quadrilateral => {
                let n = per_direction(2).ok_or_else(unavailable)?;
                let (w, p) = tensor::quadrilateral_gauss(n).map_err(|_| unavailable())?;
                (w, p.iter().map(|p| pad(p)).collect())
            }
            Shape::Hexahedron => {
                let n = per_direction(3).ok_or_else(unavailable)?;
                let (w, p) = tensor::hexahedron_gauss(n).map_err(|_| unavailable())?;
                (w, p.iter().map(|p| pad(p)).collect())
            }
        };
        Ok((weights, points))
    }
}

/// Mapping from reference to physical coordinates at a single point.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricMap {
    /// Factor applied to the reference quadrature weight.
    pub measure: f64,
    /// Maps reference gradients to derivatives along the available physical directions.
    ///
    /// For line elements embedded in higher dimensions, the only direction is the element axis.
    pub derivative_transform: DMatrix<f64>,
    /// Ratio of physical to reference length along a line element, signed by orientation.
    pub length_scale: f64,
}

impl GeometricMap {
    /// Builds the map from the reference Jacobian `J[i][j] = ∂x_j/∂ξ_i`.
    pub fn from_jacobian(jacobian: &DMatrix<f64>, element: usize) -> eyre::Result<Self> {
        let (ref_dim, dim) = jacobian.shape();
        let degenerate = || ConfigurationError::DegenerateElement { element };
        if ref_dim == 0 {
            return Ok(Self {
                measure: 1.0,
                derivative_transform: DMatrix::zeros(0, 0),
                length_scale: 1.0,
            });
        }
        if ref_dim == dim {
            let det = jacobian.determinant();
            let inverse = jacobian.clone().try_inverse().ok_or_else(degenerate)?;
            if det == 0.0 {
                return Err(degenerate().into());
            }
            return Ok(Self {
                measure: det.abs(),
                derivative_transform: inverse,
                length_scale: det,
            });
        }
        match ref_dim {
            1 => {
                let length = jacobian.row(0).norm();
                if length == 0.0 {
                    return Err(degenerate().into());
                }
                Ok(Self {
                    measure: length,
                    derivative_transform: DMatrix::from_element(1, 1, 1.0 / length),
                    length_scale: length,
                })
            }
            2 => {
                let t1 = jacobian.row(0).transpose();
                let t2 = jacobian.row(1).transpose();
                let area = (t1[1] * t2[2] - t1[2] * t2[1]).powi(2)
                    + (t1[2] * t2[0] - t1[0] * t2[2]).powi(2)
                    + (t1[0] * t2[1] - t1[1] * t2[0]).powi(2);
                if area == 0.0 {
                    return Err(degenerate().into());
                }
                Ok(Self {
                    measure: area.sqrt(),
                    derivative_transform: DMatrix::zeros(0, 2),
                    length_scale: 1.0,
                })
            }
            _ => Err(ConfigurationError::UnsupportedElement {
                element: format!("{ref_dim}D reference element"),
                reason: format!("can not be embedded in {dim} dimensions"),
            }
            .into()),
        }
    }

    pub fn num_directions(&self) -> usize {
        self.derivative_transform.nrows()
    }
}

/// Orthonormal frame of a line element, stored row-wise (`row i` is local axis `i`).
///
/// The first axis follows the element. In 3D the second axis is `ez x e1`, or `ey x e1` when
/// the element is parallel to `Z`.
pub fn line_local_frame(tangent: &[f64]) -> DMatrix<f64> {
    let norm = tangent.iter().map(|t| t * t).sum::<f64>().sqrt();
    match tangent.len() {
        1 => DMatrix::from_element(1, 1, tangent[0].signum()),
        2 => {
            let (c, s) = (tangent[0] / norm, tangent[1] / norm);
            DMatrix::from_row_slice(2, 2, &[c, s, -s, c])
        }
        _ => {
            let e1 = nalgebra::Vector3::new(tangent[0], tangent[1], tangent[2]) / norm;
            let ez_cross = nalgebra::Vector3::z().cross(&e1);
            let e2 = if ez_cross.norm() > 1e-12 {
                ez_cross.normalize()
            } else {
                nalgebra::Vector3::y().cross(&e1).normalize()
            };
            let e3 = e1.cross(&e2);
            DMatrix::from_fn(3, 3, |i, j| [e1, e2, e3][i][j])
        }
    }
}
