use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Reference shapes with linear Lagrange interpolation.
///
/// Segment, quadrilateral and hexahedron live on `[-1, 1]^d`, triangle and tetrahedron on the
/// unit simplex. Nodes are ordered counter-clockwise, the hexahedron bottom face first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shape {
    Point,
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

const QUAD_CORNERS: [[f64; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

#[rustfmt::skip]
const HEX_CORNERS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
    [-1.0, -1.0,  1.0], [1.0, -1.0,  1.0], [1.0, 1.0,  1.0], [-1.0, 1.0,  1.0],
];

impl Shape {
    pub fn num_nodes(&self) -> usize {
        match self {
            Shape::Point => 1,
            Shape::Segment => 2,
            Shape::Triangle => 3,
            Shape::Quadrilateral => 4,
            Shape::Tetrahedron => 4,
            Shape::Hexahedron => 8,
        }
    }

    pub fn reference_dim(&self) -> usize {
        match self {
            Shape::Point => 0,
            Shape::Segment => 1,
            Shape::Triangle | Shape::Quadrilateral => 2,
            Shape::Tetrahedron | Shape::Hexahedron => 3,
        }
    }

    /// Values of the basis functions at `xi`.
    pub fn evaluate_basis(&self, xi: &[f64; 3]) -> DVector<f64> {
        let [x, y, z] = *xi;
        match self {
            Shape::Point => DVector::from_element(1, 1.0),
            Shape::Segment => DVector::from_vec(vec![(1.0 - x) / 2.0, (1.0 + x) / 2.0]),
            Shape::Triangle => DVector::from_vec(vec![1.0 - x - y, x, y]),
            Shape::Tetrahedron => DVector::from_vec(vec![1.0 - x - y - z, x, y, z]),
            Shape::Quadrilateral => DVector::from_iterator(
                4,
                QUAD_CORNERS
                    .iter()
                    .map(|[a, b]| (1.0 + a * x) * (1.0 + b * y) / 4.0),
            ),
            Shape::Hexahedron => DVector::from_iterator(
                8,
                HEX_CORNERS
                    .iter()
                    .map(|[a, b, c]| (1.0 + a * x) * (1.0 + b * y) * (1.0 + c * z) / 8.0),
            ),
        }
    }

    /// Reference gradients at `xi`, one column per basis function.
    #[rustfmt::skip]
    pub fn gradients(&self, xi: &[f64; 3]) -> DMatrix<f64> {
        let [x, y, z] = *xi;
        match self {
            Shape::Point => DMatrix::zeros(0, 1),
            Shape::Segment => DMatrix::from_row_slice(1, 2, &[-0.5, 0.5]),
            Shape::Triangle => DMatrix::from_row_slice(2, 3, &[
                -1.0, 1.0, 0.0,
                -1.0, 0.0, 1.0,
            ]),
            Shape::Tetrahedron => DMatrix::from_row_slice(3, 4, &[
                -1.0, 1.0, 0.0, 0.0,
                -1.0, 0.0, 1.0, 0.0,
                -1.0, 0.0, 0.0, 1.0,
            ]),
            Shape::Quadrilateral => DMatrix::from_fn(2, 4, |i, n| {
                let [a, b] = QUAD_CORNERS[n];
                match i {
                    0 => a * (1.0 + b * y) / 4.0,
                    _ => b * (1.0 + a * x) / 4.0,
                }
            }),
            Shape::Hexahedron => DMatrix::from_fn(3, 8, |i, n| {
                let [a, b, c] = HEX_CORNERS[n];
                match i {
                    0 => a * (1.0 + b * y) * (1.0 + c * z) / 8.0,
                    1 => b * (1.0 + a * x) * (1.0 + c * z) / 8.0,
                    _ => c * (1.0 + a * x) * (1.0 + b * y) / 8.0,
                }
            }),
        }
    }
}
