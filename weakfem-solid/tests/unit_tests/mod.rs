use weakfem::element::ElementType;
use weakfem::mesh::procedural::create_line_mesh;
use weakfem::mesh::Mesh;
use weakfem::space::ModelingSpace;

mod stress_equilibrium;

/// Straight beam mesh along X in a 3D space with displacements and rotations.
fn beam_along_x(length: f64, n_elements: usize) -> (ModelingSpace, Mesh) {
    let mut space = ModelingSpace::solid_3d();
    space.new_rotation();
    let mesh = create_line_mesh(&[0.0, 0.0, 0.0], &[length, 0.0, 0.0], n_elements, ElementType::BernoulliBeam).unwrap();
    (space, mesh)
}
