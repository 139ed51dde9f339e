//! Symmetric rules for the reference triangle and tetrahedron.
//!
//! Only a handful of point counts is available; other counts yield [`Error::NoRuleAvailable`].

use crate::{Error, Rule};

/// A rule for the reference triangle with the given number of points.
///
/// Available point counts and the polynomial degree they integrate exactly:
/// 1 (degree 1), 3 (degree 2), 4 (degree 3), 6 (degree 4).
pub fn triangle(num_points: usize) -> Result<Rule<2>, Error> {
    match num_points {
        1 => Ok((vec![0.5], vec![[1.0 / 3.0, 1.0 / 3.0]])),
        3 => {
            let w = 1.0 / 6.0;
            Ok((
                vec![w, w, w],
                vec![[1.0 / 6.0, 1.0 / 6.0], [2.0 / 3.0, 1.0 / 6.0], [1.0 / 6.0, 2.0 / 3.0]],
            ))
        }
        4 => Ok((
            vec![-27.0 / 96.0, 25.0 / 96.0, 25.0 / 96.0, 25.0 / 96.0],
            vec![[1.0 / 3.0, 1.0 / 3.0], [0.2, 0.2], [0.6, 0.2], [0.2, 0.6]],
        )),
        6 => {
            let a = 0.445948490915965;
            let b = 0.091576213509771;
            let wa = 0.223381589678011 / 2.0;
            let wb = 0.109951743655322 / 2.0;
            Ok((
                vec![wa, wa, wa, wb, wb, wb],
                vec![
                    [a, a],
                    [1.0 - 2.0 * a, a],
                    [a, 1.0 - 2.0 * a],
                    [b, b],
                    [1.0 - 2.0 * b, b],
                    [b, 1.0 - 2.0 * b],
                ],
            ))
        }
        _ => Err(Error::NoRuleAvailable),
    }
}

/// A rule for the reference tetrahedron with the given number of points.
///
/// Available point counts: 1 (degree 1), 4 (degree 2).
pub fn tetrahedron(num_points: usize) -> Result<Rule<3>, Error> {
    match num_points {
        1 => Ok((vec![1.0 / 6.0], vec![[0.25, 0.25, 0.25]])),
        4 => {
            let a = 0.1381966011250105;
            let b = 0.5854101966249685;
            let w = 1.0 / 24.0;
            Ok((
                vec![w; 4],
                vec![[a, a, a], [b, a, a], [a, b, a], [a, a, b]],
            ))
        }
        _ => Err(Error::NoRuleAvailable),
    }
}
