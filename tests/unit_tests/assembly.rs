use crate::unit_tests::{assemble_with, scalar_space, Diffusion, ExplicitForm};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{dmatrix, dvector, DMatrix, DVector};
use std::sync::Arc;
use util::dense;
use weakfem::assembly::cache::new_shared_cache;
use weakfem::assembly::{Assembly, AssemblyOptions, AssemblySum, Compute, GlobalAssembly};
use weakfem::element::ElementType;
use weakfem::error::ConfigurationError;
use weakfem::mesh::procedural::{create_line_mesh, create_rectangular_quad_mesh};
use weakfem::operator::{Coefficient, DiffOp};
use weakfem::space::{Dimension, ModelingSpace};

fn unit_interval(n: usize) -> weakfem::mesh::Mesh {
    create_line_mesh(&[0.0], &[1.0], n, ElementType::Lin2).unwrap()
}

fn matrix_of(assembly: &mut impl GlobalAssembly) -> DMatrix<f64> {
    dense(assembly.global_matrix().unwrap())
}

/// Two diffusing species coupled symmetrically through their values and gradients.
fn coupled(space: &ModelingSpace) -> eyre::Result<DiffOp> {
    let mut op = DiffOp::default();
    for x in ["X", "Y"] {
        let dt = space.op("Temp", Some(x), 1)?;
        let dc = space.op("Conc", Some(x), 1)?;
        op = op
            + dt.virt().try_mul(&dt)?
            + dc.virt().try_mul(&(&dc * 2.0))?
            + dt.virt().try_mul(&(&dc * 0.5))?
            + dc.virt().try_mul(&(&dt * 0.5))?;
    }
    let t = space.op("Temp", None, 0)?;
    let c = space.op("Conc", None, 0)?;
    Ok(op + t.virt().try_mul(&(&c * 3.0))? + c.virt().try_mul(&(&t * 3.0))?)
}

fn two_species() -> ModelingSpace {
    let mut space = scalar_space(Dimension::Two);
    space.new_variable("Conc");
    space
}

#[test]
fn diffusion_stiffness_in_1d() {
    let mut assembly = assemble_with(Diffusion::new(1.0), unit_interval(2), scalar_space(Dimension::One), Default::default());
    let expected = dmatrix![
         2.0, -2.0,  0.0;
        -2.0,  4.0, -2.0;
         0.0, -2.0,  2.0];
    assert_matrix_eq!(matrix_of(&mut assembly), expected, comp = abs, tol = 1e-12);
    assert_eq!(assembly.global_vector().unwrap(), &DVector::<f64>::zeros(3));
}

#[test]
fn source_enters_the_vector_with_its_sign() {
    let mut form = Diffusion::new(1.0);
    form.source = 1.0;
    let mut assembly = assemble_with(form, unit_interval(2), scalar_space(Dimension::One), Default::default());
    let vector = assembly.global_vector().unwrap().clone();
    assert_matrix_eq!(vector, dvector![0.25, 0.5, 0.25], comp = abs, tol = 1e-12);
}

#[test]
fn element_field_coefficients_scale_each_element() {
    let form = Diffusion {
        conductivity: Coefficient::Field(dvector![1.0, 2.0]),
        source: 0.0,
    };
    let mut assembly = assemble_with(form, unit_interval(2), scalar_space(Dimension::One), Default::default());
    let expected = dmatrix![
         2.0, -2.0,  0.0;
        -2.0,  6.0, -4.0;
         0.0, -4.0,  4.0];
    assert_matrix_eq!(matrix_of(&mut assembly), expected, comp = abs, tol = 1e-12);
}

#[test]
fn diffusion_stiffness_is_symmetric_and_singular_for_constants() {
    let mesh = create_rectangular_quad_mesh(2.0, 1.0, 3, 2).unwrap();
    let mut assembly = assemble_with(Diffusion::new(1.5), mesh, scalar_space(Dimension::Two), Default::default());
    let k = matrix_of(&mut assembly);
    assert_matrix_eq!(k, k.transpose(), comp = abs, tol = 1e-12);
    let ones = DVector::repeat(12, 1.0);
    assert_matrix_eq!(&k * ones, DVector::<f64>::zeros(12), comp = abs, tol = 1e-12);
    assert!(k.diagonal().iter().all(|&d| d > 0.0));
}

#[test]
fn symmetric_assembly_matches_full_assembly() {
    let mesh = create_rectangular_quad_mesh(1.0, 1.0, 2, 2).unwrap();
    let mut full = assemble_with(ExplicitForm::new(coupled), mesh.clone(), two_species(), Default::default());
    let symmetric_options = AssemblyOptions {
        assume_sym: true,
        ..Default::default()
    };
    let mut symmetric = assemble_with(ExplicitForm::new(coupled), mesh, two_species(), symmetric_options);
    let k_full = matrix_of(&mut full);
    let k_sym = matrix_of(&mut symmetric);
    assert_eq!(k_full.shape(), (18, 18));
    assert!(k_full.view((0, 9), (9, 9)).iter().any(|&v| v != 0.0));
    assert_matrix_eq!(k_sym, k_full, comp = abs, tol = 1e-12);
}

#[test]
fn term_order_does_not_change_the_matrix() {
    let mesh = create_rectangular_quad_mesh(1.0, 1.0, 2, 2).unwrap();
    let reversed = |space: &ModelingSpace| -> eyre::Result<DiffOp> {
        let terms = coupled(space)?.into_terms();
        Ok(DiffOp::from_terms(terms.into_iter().rev().collect()))
    };
    let mut forward = assemble_with(ExplicitForm::new(coupled), mesh.clone(), two_species(), Default::default());
    let mut backward = assemble_with(ExplicitForm::new(reversed), mesh, two_species(), Default::default());
    assert_matrix_eq!(matrix_of(&mut forward), matrix_of(&mut backward), comp = abs, tol = 1e-12);
}

#[test]
fn assembly_sum_is_linear() {
    let mesh = Arc::new(create_rectangular_quad_mesh(2.0, 1.0, 2, 2).unwrap());
    let space = Arc::new(scalar_space(Dimension::Two));
    let cache = new_shared_cache();
    let part = |k: f64, name: &str| -> Box<dyn GlobalAssembly> {
        let mut form = Diffusion::new(k);
        form.source = k;
        Box::new(Assembly::new(name, form, mesh.clone(), space.clone(), cache.clone()))
    };
    let mut sum = AssemblySum::new("sum", vec![part(1.0, "a"), part(2.0, "b")]).unwrap();
    let mut combined = part(3.0, "combined");

    assert_matrix_eq!(matrix_of(&mut sum), dense(combined.global_matrix().unwrap()), comp = abs, tol = 1e-12);
    let v_sum = sum.global_vector().unwrap().clone();
    assert_matrix_eq!(v_sum, combined.global_vector().unwrap().clone(), comp = abs, tol = 1e-12);
    assert_eq!(sum.assemblies().len(), 2);
    // Both parts share the operators of the mesh
    assert_eq!(cache.borrow().len(), 1);

    let other_mesh = Arc::new(create_rectangular_quad_mesh(1.0, 1.0, 1, 1).unwrap());
    let small: Box<dyn GlobalAssembly> = Box::new(Assembly::new("small", Diffusion::new(1.0), other_mesh, space.clone(), cache.clone()));
    assert!(AssemblySum::new("mismatch", vec![part(1.0, "a"), small]).is_err());
    assert!(AssemblySum::new("empty", vec![]).is_err());
}

#[test]
fn lumped_mass_keeps_row_sums() {
    let mass = |space: &ModelingSpace| -> eyre::Result<DiffOp> {
        let t = space.op("Temp", None, 0)?;
        t.virt().try_mul(&t)
    };
    let mesh = create_rectangular_quad_mesh(2.0, 1.0, 2, 2).unwrap();
    let mut consistent = assemble_with(ExplicitForm::new(mass), mesh.clone(), scalar_space(Dimension::Two), Default::default());
    let lumped_options = AssemblyOptions {
        lumped: true,
        ..Default::default()
    };
    let mut lumped = assemble_with(ExplicitForm::new(mass), mesh, scalar_space(Dimension::Two), lumped_options);

    let m = matrix_of(&mut consistent);
    let m_lumped = matrix_of(&mut lumped);
    let row_sums = DVector::from_fn(9, |i, _| m.row(i).sum());
    assert_matrix_eq!(m_lumped, DMatrix::from_diagonal(&row_sums), comp = abs, tol = 1e-12);
    assert_scalar_eq!(row_sums.sum(), 2.0, comp = abs, tol = 1e-12);
}

#[test]
fn real_only_terms_are_rejected() {
    let incomplete = |space: &ModelingSpace| space.op("Temp", Some("X"), 1);
    let mut assembly = assemble_with(ExplicitForm::new(incomplete), unit_interval(2), scalar_space(Dimension::One), Default::default());
    let err = assembly.assemble_global_mat(Compute::All).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::MissingVirtualOperator {
            variable: "Temp".to_string()
        })
    );
}

#[test]
fn second_derivatives_of_lagrange_fields_are_unavailable() {
    let curvature = |space: &ModelingSpace| -> eyre::Result<DiffOp> {
        let t = space.op("Temp", Some("X"), 2)?;
        t.virt().try_mul(&t)
    };
    let mut assembly = assemble_with(ExplicitForm::new(curvature), unit_interval(2), scalar_space(Dimension::One), Default::default());
    let err = assembly.global_matrix().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::OperatorUnavailable { .. })
    ));
}

#[test]
fn point_results_and_integrals() {
    let mesh = create_rectangular_quad_mesh(2.0, 1.0, 2, 1).unwrap();
    let x: DVector<f64> = mesh.nodes().column(0).into_owned();
    let assembly = assemble_with(Diffusion::new(1.0), mesh, scalar_space(Dimension::Two), Default::default());
    let space = assembly.discretization().space().clone();

    let temp = space.op("Temp", None, 0).unwrap();
    let values = assembly.gauss_point_results(&temp, &x).unwrap();
    // The integral of x over [0, 2] x [0, 1]
    assert_scalar_eq!(assembly.integrate_field(&values).unwrap(), 2.0, comp = abs, tol = 1e-12);

    let energy_density = assembly
        .gauss_point_results(&space.op("Temp", Some("X"), 1).unwrap(), &x)
        .unwrap();
    assert_scalar_eq!(assembly.integrate_field(&energy_density).unwrap(), 2.0, comp = abs, tol = 1e-12);

    let element_means = assembly.element_results(&temp, &x).unwrap();
    assert_matrix_eq!(element_means, dvector![0.5, 1.5], comp = abs, tol = 1e-12);
    let nodal = assembly.node_results(&temp, &x).unwrap();
    assert_matrix_eq!(nodal, x, comp = abs, tol = 1e-12);
}

#[test]
fn global_system_is_recomputed_after_deletion() {
    let mut assembly = assemble_with(Diffusion::new(1.0), unit_interval(4), scalar_space(Dimension::One), Default::default());
    let k = matrix_of(&mut assembly);
    assembly.delete_global_mat();
    assembly.update(&DVector::<f64>::zeros(5), 0.0, Compute::Matrix).unwrap();
    assert_matrix_eq!(matrix_of(&mut assembly), k, comp = abs, tol = 1e-14);
    assert_eq!(GlobalAssembly::name(&assembly), "test");
    assert_eq!(assembly.n_dof(), 5);
}

/// `∫ ∇T*·(k_a + k_b) ∇T + ∫ T* (s_a + s_b)` with each pair given as separate terms.
fn split_coefficients(k: [Coefficient; 2], s: [Coefficient; 2]) -> ExplicitForm {
    ExplicitForm::new(move |space| {
        let grad = space.op("Temp", Some("X"), 1)?;
        let temp = space.op("Temp", None, 0)?;
        let mut op = DiffOp::default();
        for (k, s) in k.iter().zip(&s) {
            op = op + grad.virt().try_mul(&(&grad * k))? + &temp.virt() * s;
        }
        Ok(op)
    })
}

#[test]
fn fields_at_different_locations_are_summed_at_gauss_points() {
    let nodal_x = Coefficient::Field(dvector![0.0, 0.25, 0.5, 0.75, 1.0]);
    let at_points = Coefficient::Field(DVector::repeat(8, 2.0));
    let combined = Coefficient::Field(dvector![2.0, 2.25, 2.5, 2.75, 3.0]);
    let zero = Coefficient::Scalar(0.0);

    let mut mixed = assemble_with(
        split_coefficients([nodal_x.clone(), at_points.clone()], [nodal_x, at_points]),
        unit_interval(4),
        scalar_space(Dimension::One),
        Default::default(),
    );
    let mut reference = assemble_with(
        split_coefficients([combined.clone(), zero.clone()], [combined, zero]),
        unit_interval(4),
        scalar_space(Dimension::One),
        Default::default(),
    );
    assert_matrix_eq!(matrix_of(&mut mixed), matrix_of(&mut reference), comp = abs, tol = 1e-12);
    let mixed_vector = mixed.global_vector().unwrap().clone();
    let reference_vector = reference.global_vector().unwrap().clone();
    assert_matrix_eq!(mixed_vector, reference_vector, comp = abs, tol = 1e-12);
}

#[test]
fn products_of_fields_at_different_locations_are_evaluated_at_gauss_points() {
    let nodal = Coefficient::Field(DVector::repeat(5, 2.0));
    let per_element = Coefficient::Field(dvector![1.0, 2.0, 3.0, 4.0]);
    let form = ExplicitForm::new(move |space| {
        let grad = space.op("Temp", Some("X"), 1)?;
        grad.virt().try_mul(&(&(&grad * &nodal) * &per_element))
    });
    let mut assembly = assemble_with(form, unit_interval(4), scalar_space(Dimension::One), Default::default());
    let expected = dmatrix![
         8.0,  -8.0,   0.0,   0.0,   0.0;
        -8.0,  24.0, -16.0,   0.0,   0.0;
         0.0, -16.0,  40.0, -24.0,   0.0;
         0.0,   0.0, -24.0,  56.0, -32.0;
         0.0,   0.0,   0.0, -32.0,  32.0];
    assert_matrix_eq!(matrix_of(&mut assembly), expected, comp = abs, tol = 1e-12);
}

#[test]
fn updated_lagrangian_assembly_follows_the_displaced_nodes() {
    let mut space = scalar_space(Dimension::One);
    space.new_displacement();
    let mesh = Arc::new(unit_interval(2));
    let options = AssemblyOptions {
        updated_lagrangian: true,
        ..Default::default()
    };
    let mut assembly =
        Assembly::with_options("moving", Diffusion::new(1.0), Arc::clone(&mesh), Arc::new(space), new_shared_cache(), options);
    let temp_block = |assembly: &mut Assembly| matrix_of(assembly).view((0, 0), (3, 3)).into_owned();

    assembly.initialize(0.0).unwrap();
    assembly.set_start(1.0).unwrap();
    let original = temp_block(&mut assembly);
    assert_matrix_eq!(original, 2.0 * dmatrix![1.0, -1.0, 0.0; -1.0, 2.0, -1.0; 0.0, -1.0, 1.0], comp = abs, tol = 1e-12);

    // DispX doubles the length of the interval
    let dof = dvector![0.0, 0.0, 0.0, 0.0, 0.5, 1.0];
    let stretched = dmatrix![1.0, -1.0, 0.0; -1.0, 2.0, -1.0; 0.0, -1.0, 1.0];
    for _ in 0..2 {
        assembly.update(&dof, 1.0, Compute::All).unwrap();
        assert_eq!(assembly.mesh().nodes(), &dmatrix![0.0; 1.0; 2.0]);
        assert_matrix_eq!(temp_block(&mut assembly), stretched, comp = abs, tol = 1e-12);
    }
    assert_eq!(mesh.nodes(), &dmatrix![0.0; 0.5; 1.0]);

    assembly.to_start().unwrap();
    assert_eq!(assembly.mesh().nodes(), &dmatrix![0.0; 0.5; 1.0]);
    assert_matrix_eq!(temp_block(&mut assembly), original, comp = abs, tol = 1e-12);

    // A committed increment becomes the new start geometry; reset goes back to the reference.
    assembly.update(&dof, 1.0, Compute::All).unwrap();
    assembly.set_start(1.0).unwrap();
    assembly.to_start().unwrap();
    assert_eq!(assembly.mesh().nodes(), &dmatrix![0.0; 1.0; 2.0]);
    assembly.reset().unwrap();
    assert_eq!(assembly.mesh().nodes(), &dmatrix![0.0; 0.5; 1.0]);
    assert_matrix_eq!(temp_block(&mut assembly), original, comp = abs, tol = 1e-12);
}

#[test]
fn displacement_requires_a_disp_vector() {
    let mut assembly = assemble_with(Diffusion::new(1.0), unit_interval(2), scalar_space(Dimension::One), Default::default());
    let err = assembly.set_disp(&DVector::<f64>::zeros(3)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::UnknownVector(name)) if name == "Disp"
    ));
}
