//! 2D and 3D quadrature rules formed by tensor products of Gauss rules.

use crate::univariate::gauss;
use crate::{Error, Rule};

/// A Gauss quadrature rule for the reference quadrilateral with `n` points per dimension.
pub fn quadrilateral_gauss(n: usize) -> Result<Rule<2>, Error> {
    let (w1, p1) = gauss(n)?;
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);
    // The first coordinate varies fastest
    for (wy, &[y]) in w1.iter().zip(&p1) {
        for (wx, &[x]) in w1.iter().zip(&p1) {
            weights.push(wx * wy);
            points.push([x, y]);
        }
    }
    Ok((weights, points))
}

/// A Gauss quadrature rule for the reference hexahedron with `n` points per dimension.
pub fn hexahedron_gauss(n: usize) -> Result<Rule<3>, Error> {
    let (w1, p1) = gauss(n)?;
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);
    for (wz, &[z]) in w1.iter().zip(&p1) {
        for (wy, &[y]) in w1.iter().zip(&p1) {
            for (wx, &[x]) in w1.iter().zip(&p1) {
                weights.push(wx * wy * wz);
                points.push([x, y, z]);
            }
        }
    }
    Ok((weights, points))
}
