use crate::element::Interpolation;

/// Cubic Hermite basis of a two-node beam element on `[-1, 1]`.
///
/// `H1`, `H3` interpolate the end displacements and `H2`, `H4` the end slopes with respect to
/// the reference coordinate. With `J` the physical half length, the transverse displacement is
/// `v = H1 v1 + J H2 θ1 + H3 v2 + J H4 θ2` and the rotation is `θ = dv/dx`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HermiteBasis {
    pub values: [f64; 4],
    pub first: [f64; 4],
    pub second: [f64; 4],
}

impl HermiteBasis {
    #[rustfmt::skip]
    pub fn at(xi: f64) -> Self {
        Self {
            values: [
                (1.0 - xi).powi(2) * (2.0 + xi) / 4.0,
                (1.0 - xi).powi(2) * (1.0 + xi) / 4.0,
                (1.0 + xi).powi(2) * (2.0 - xi) / 4.0,
                -(1.0 + xi).powi(2) * (1.0 - xi) / 4.0,
            ],
            first: [
                -3.0 * (1.0 - xi * xi) / 4.0,
                (1.0 - xi) * (-1.0 - 3.0 * xi) / 4.0,
                3.0 * (1.0 - xi * xi) / 4.0,
                -(1.0 + xi) * (1.0 - 3.0 * xi) / 4.0,
            ],
            second: [
                1.5 * xi,
                (3.0 * xi - 1.0) / 2.0,
                -1.5 * xi,
                (1.0 + 3.0 * xi) / 2.0,
            ],
        }
    }

    /// Nodal coefficients `(own, associated)` of the derivative of the given order along the
    /// element axis, for an element with physical half length `j`.
    ///
    /// Returns `None` for derivative orders that the interpolation does not provide.
    pub fn coefficients(&self, interpolation: Interpolation, order: u8, j: f64) -> Option<([f64; 2], [f64; 2])> {
        let [h1, h2, h3, h4] = self.values;
        let [d1, d2, d3, d4] = self.first;
        let [s1, s2, s3, s4] = self.second;
        match (interpolation, order) {
            (Interpolation::HermiteDisplacement, 0) => Some(([h1, h3], [j * h2, j * h4])),
            (Interpolation::HermiteDisplacement, 1) => Some(([d1 / j, d3 / j], [d2, d4])),
            (Interpolation::HermiteRotation, 0) => Some(([d2, d4], [d1 / j, d3 / j])),
            (Interpolation::HermiteRotation, 1) => Some(([s2 / j, s4 / j], [s1 / (j * j), s3 / (j * j)])),
            _ => None,
        }
    }
}
