use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{dmatrix, DMatrix};
use proptest::prelude::*;
use weakfem::element::{line_local_frame, ElementType, GeometricMap, HermiteBasis, Interpolation, Shape};
use weakfem::error::ConfigurationError;

const SHAPES: [Shape; 6] = [
    Shape::Point,
    Shape::Segment,
    Shape::Triangle,
    Shape::Quadrilateral,
    Shape::Tetrahedron,
    Shape::Hexahedron,
];

proptest! {
    #[test]
    fn lagrange_basis_is_a_partition_of_unity(
        xi in prop::array::uniform3(-1.0..1.0f64),
        shape in prop::sample::select(SHAPES.to_vec()),
    ) {
        let values = shape.evaluate_basis(&xi);
        prop_assert_eq!(values.len(), shape.num_nodes());
        assert_scalar_eq!(values.sum(), 1.0, comp = abs, tol = 1e-12);

        let gradients = shape.gradients(&xi);
        prop_assert_eq!(gradients.shape(), (shape.reference_dim(), shape.num_nodes()));
        for row in gradients.row_iter() {
            assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn lagrange_basis_interpolates_corners() {
    let quad = Shape::Quadrilateral;
    assert_matrix_eq!(
        quad.evaluate_basis(&[1.0, 1.0, 0.0]),
        nalgebra::dvector![0.0, 0.0, 1.0, 0.0],
        comp = float
    );
    let tet = Shape::Tetrahedron;
    assert_matrix_eq!(
        tet.evaluate_basis(&[0.0, 0.0, 1.0]),
        nalgebra::dvector![0.0, 0.0, 0.0, 1.0],
        comp = float
    );
}

#[test]
fn quadrature_weights_sum_to_reference_measure() {
    let cases = [
        (ElementType::Lin2, 2.0),
        (ElementType::Quad4, 4.0),
        (ElementType::Hex8, 8.0),
        (ElementType::Tri3, 0.5),
        (ElementType::Tet4, 1.0 / 6.0),
        (ElementType::BernoulliBeam, 2.0),
    ];
    for (element, measure) in cases {
        let (weights, points) = element.quadrature(element.default_gauss_points()).unwrap();
        assert_eq!(weights.len(), element.default_gauss_points());
        assert_eq!(points.len(), weights.len());
        assert_scalar_eq!(weights.iter().sum::<f64>(), measure, comp = abs, tol = 1e-12);
    }
    assert_eq!(ElementType::Quad4.quadrature(9).unwrap().0.len(), 9);
    assert_eq!(ElementType::Hex8.quadrature(27).unwrap().0.len(), 27);
}

#[test]
fn unavailable_quadrature_is_an_error() {
    for (element, n) in [(ElementType::Node, 1), (ElementType::Quad4, 5), (ElementType::Tri3, 2)] {
        let err = element.quadrature(n).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnsupportedElement { .. })
        ));
    }
}

#[test]
fn beam_couples_bending_variables() {
    let beam = ElementType::BernoulliBeam;
    let expected = [
        ("DispY", Interpolation::HermiteDisplacement, "RotZ", 1.0),
        ("DispZ", Interpolation::HermiteDisplacement, "RotY", -1.0),
        ("RotY", Interpolation::HermiteRotation, "DispZ", -1.0),
        ("RotZ", Interpolation::HermiteRotation, "DispY", 1.0),
    ];
    for (variable, interpolation, associated, factor) in expected {
        let interp = beam.interpolation_for(variable);
        assert_eq!(interp.interpolation, interpolation);
        assert_eq!(interp.associated, Some((associated, factor)));
        assert_eq!(interp.interpolation.num_blocks(), 2);
    }
    for variable in ["DispX", "RotX"] {
        let interp = beam.interpolation_for(variable);
        assert_eq!(interp.interpolation, Interpolation::Lagrange(Shape::Segment));
        assert_eq!(interp.associated, None);
    }
    assert!(beam.has_local_frame());
    assert_eq!(beam.interpolations().len(), 3);
    assert_eq!(
        ElementType::Quad4.interpolation_for("DispY").interpolation,
        Interpolation::Lagrange(Shape::Quadrilateral)
    );
}

#[test]
fn hermite_basis_interpolates_end_values_and_slopes() {
    let left = HermiteBasis::at(-1.0);
    let right = HermiteBasis::at(1.0);
    assert_eq!(left.values, [1.0, 0.0, 0.0, 0.0]);
    assert_eq!(right.values, [0.0, 0.0, 1.0, 0.0]);
    assert_eq!(left.first, [0.0, 1.0, 0.0, 0.0]);
    assert_eq!(right.first, [0.0, 0.0, 0.0, 1.0]);

    // A rotation interpolation reproduces the nodal rotations at the element ends
    let (own, associated) = left
        .coefficients(Interpolation::HermiteRotation, 0, 2.0)
        .unwrap();
    assert_eq!(own, [1.0, 0.0]);
    assert_eq!(associated, [0.0, 0.0]);
    assert!(left
        .coefficients(Interpolation::HermiteRotation, 2, 2.0)
        .is_none());
}

#[test]
fn degenerate_jacobian_is_rejected() {
    let err = GeometricMap::from_jacobian(&dmatrix![1.0, 2.0; 2.0, 4.0], 7).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::DegenerateElement { element: 7 })
    );
    assert!(GeometricMap::from_jacobian(&dmatrix![0.0, 0.0, 0.0], 0).is_err());

    let map = GeometricMap::from_jacobian(&dmatrix![2.0, 0.0; 0.0, 0.5], 0).unwrap();
    assert_scalar_eq!(map.measure, 1.0, comp = float);
    assert_matrix_eq!(map.derivative_transform, dmatrix![0.5, 0.0; 0.0, 2.0], comp = float);
}

#[test]
fn embedded_line_uses_its_length() {
    let map = GeometricMap::from_jacobian(&dmatrix![3.0, 4.0, 0.0], 0).unwrap();
    assert_scalar_eq!(map.measure, 5.0, comp = float);
    assert_eq!(map.num_directions(), 1);
    assert_scalar_eq!(map.derivative_transform[(0, 0)], 0.2, comp = float);
}

#[test]
fn line_frame_is_orthonormal() {
    for tangent in [[3.0, 4.0, 0.0], [0.0, 0.0, 2.0], [1.0, -2.0, 0.5]] {
        let frame = line_local_frame(&tangent);
        assert_matrix_eq!(&frame * frame.transpose(), DMatrix::<f64>::identity(3, 3), comp = abs, tol = 1e-12);
        assert_scalar_eq!(frame.determinant(), 1.0, comp = abs, tol = 1e-12);
        let norm = nalgebra::Vector3::from(tangent).norm();
        for j in 0..3 {
            assert_scalar_eq!(frame[(0, j)], tangent[j] / norm, comp = abs, tol = 1e-12);
        }
    }
    // Second axis lies in the XY plane unless the element is vertical
    let frame = line_local_frame(&[3.0, 4.0, 0.0]);
    assert_matrix_eq!(frame.row(1).clone_owned(), dmatrix![-0.8, 0.6, 0.0], comp = abs, tol = 1e-12);

    let frame = line_local_frame(&[1.0, 1.0]);
    let c = 0.5f64.sqrt();
    assert_matrix_eq!(frame, dmatrix![c, c; -c, c], comp = abs, tol = 1e-12);
}
