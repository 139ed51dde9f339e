use super::factorial;
use weakfem_quadrature::simplex::{tetrahedron, triangle};
use weakfem_quadrature::{integrate, Error};
use matrixcompare::assert_scalar_eq;

/// Integral of `x^a y^b` over the reference triangle.
fn triangle_monomial_integral(a: i32, b: i32) -> f64 {
    factorial(a) * factorial(b) / factorial(a + b + 2)
}

/// Integral of `x^a y^b z^c` over the reference tetrahedron.
fn tetrahedron_monomial_integral(a: i32, b: i32, c: i32) -> f64 {
    factorial(a) * factorial(b) * factorial(c) / factorial(a + b + c + 3)
}

#[test]
fn triangle_rules_integrate_monomials_up_to_their_degree() {
    for (n, degree) in [(1, 1), (3, 2), (4, 3), (6, 4)] {
        let rule = triangle(n).unwrap();
        assert_eq!(rule.0.len(), n);
        for a in 0..=degree {
            for b in 0..=(degree - a) {
                let estimated = integrate(&rule, |&[x, y]| x.powi(a) * y.powi(b));
                assert_scalar_eq!(estimated, triangle_monomial_integral(a, b), comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn tetrahedron_rules_integrate_monomials_up_to_their_degree() {
    for (n, degree) in [(1, 1), (4, 2)] {
        let rule = tetrahedron(n).unwrap();
        for a in 0..=degree {
            for b in 0..=(degree - a) {
                for c in 0..=(degree - a - b) {
                    let estimated = integrate(&rule, |&[x, y, z]| x.powi(a) * y.powi(b) * z.powi(c));
                    let expected = tetrahedron_monomial_integral(a, b, c);
                    assert_scalar_eq!(estimated, expected, comp = abs, tol = 1e-12);
                }
            }
        }
    }
}

#[test]
fn unavailable_simplex_rules_are_reported() {
    assert_eq!(triangle(2), Err(Error::NoRuleAvailable));
    assert_eq!(tetrahedron(3), Err(Error::NoRuleAvailable));
}
