use crate::unit_tests::{scalar_space, Diffusion};
use nalgebra::DVector;
use std::sync::Arc;
use weakfem::assembly::{AssemblyOptions, GlobalAssembly};
use weakfem::context::Context;
use weakfem::element::ElementType;
use weakfem::mesh::procedural::{create_line_mesh, create_rectangular_quad_mesh};
use weakfem::space::Dimension;

fn context() -> Context {
    let mut context = Context::new(scalar_space(Dimension::Two));
    context.add_mesh("plate", create_rectangular_quad_mesh(1.0, 1.0, 2, 2).unwrap());
    context.add_mesh("edge", create_line_mesh(&[0.0, 0.0], &[1.0, 0.0], 2, ElementType::Lin2).unwrap());
    context
}

#[test]
fn meshes_are_looked_up_by_name() {
    let context = context();
    let plate = context.mesh("plate").unwrap();
    assert!(Arc::ptr_eq(&plate, &context.mesh("plate").unwrap()));
    assert_eq!(plate.n_nodes(), 9);
    assert_eq!(context.mesh_names().collect::<Vec<_>>(), ["edge", "plate"]);
    assert!(context.mesh("volume").is_err());
    assert!(context.assembly("a", Diffusion::new(1.0), "volume").is_err());
}

#[test]
fn mutating_a_shared_mesh_copies_it() {
    let mut context = context();
    let assembly = context.assembly("diffusion", Diffusion::new(1.0), "plate").unwrap();
    let original_id = assembly.mesh().id();

    let mesh = context.mesh_mut("plate").unwrap();
    mesh.displace_nodes(&DVector::repeat(18, 0.5)).unwrap();
    let copy_id = mesh.id();

    assert_ne!(copy_id, original_id);
    assert_eq!(assembly.mesh().nodes()[(0, 0)], 0.0);
    assert_eq!(context.mesh("plate").unwrap().nodes()[(0, 0)], 0.5);

    // Without other holders the mesh is modified in place
    drop(assembly);
    let mesh = context.mesh_mut("plate").unwrap();
    assert_eq!(mesh.id(), copy_id);
    assert!(context.mesh_mut("volume").is_err());
}

#[test]
fn assemblies_share_the_operator_cache() {
    let context = context();
    let mut first = context.assembly("first", Diffusion::new(1.0), "plate").unwrap();
    let options = AssemblyOptions {
        assume_sym: true,
        ..Default::default()
    };
    let mut second = context
        .assembly_with_options("second", Diffusion::new(2.0), "plate", options)
        .unwrap();
    assert!(second.options().assume_sym);

    let k1 = first.global_matrix().unwrap().clone();
    let k2 = second.global_matrix().unwrap().clone();
    assert_eq!(context.cache().borrow().len(), 1);
    for (a, b) in k1.values().iter().zip(k2.values()) {
        assert!((2.0 * a - b).abs() < 1e-12);
    }
    assert!(Arc::ptr_eq(first.space(), context.space()));
}

#[test]
fn space_changes_are_not_seen_by_existing_assemblies() {
    let mut context = context();
    let assembly = context.assembly("diffusion", Diffusion::new(1.0), "plate").unwrap();
    context.space_mut().new_variable("Pressure");
    assert_eq!(context.space().nvar(), 2);
    assert_eq!(assembly.space().nvar(), 1);
    assert_eq!(assembly.n_dof(), 9);
}
