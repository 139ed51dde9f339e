use super::monomial_integral_1d;
use weakfem_quadrature::integrate;
use weakfem_quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};
use matrixcompare::assert_scalar_eq;

#[test]
fn quadrilateral_gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=8 {
        // Degree that can be integrated exactly *along each dimension*
        let degree = 2 * n as i32 - 1;
        let rule = quadrilateral_gauss(n).unwrap();
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=degree {
            for beta in 0..=degree {
                let expected = monomial_integral_1d(alpha) * monomial_integral_1d(beta);
                let estimated = integrate(&rule, |&[x, y]| x.powi(alpha) * y.powi(beta));
                assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn hexahedron_gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=4 {
        let degree = 2 * n as i32 - 1;
        let rule = hexahedron_gauss(n).unwrap();
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=degree {
            for beta in 0..=degree {
                for gamma in 0..=degree {
                    let expected =
                        monomial_integral_1d(alpha) * monomial_integral_1d(beta) * monomial_integral_1d(gamma);
                    let estimated =
                        integrate(&rule, |&[x, y, z]| x.powi(alpha) * y.powi(beta) * z.powi(gamma));
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-13);
                }
            }
        }
    }
}

#[test]
fn quadrilateral_points_vary_fastest_in_first_coordinate() {
    let (_, points) = quadrilateral_gauss(2).unwrap();
    assert!(points[0][0] < points[1][0]);
    assert_eq!(points[0][1], points[1][1]);
}
