use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;
use std::sync::Arc;
use util::dense;
use weakfem::assembly::cache::new_shared_cache;
use weakfem::assembly::{Assembly, AssemblyOptions, GlobalAssembly};
use weakfem::boundary_conditions::BoundaryKind::{Dirichlet, Neumann};
use weakfem::mesh::procedural::create_rectangular_quad_mesh;
use weakfem::problem::LinearProblem;
use weakfem::space::ModelingSpace;
use weakfem::weakform::WeakForm;
use weakfem_solid::body_force::{BodyForce, Inertia};
use weakfem_solid::materials::ElasticIsotropic;
use weakfem_solid::stress_equilibrium::{strain_at_points, StressEquilibrium};

fn plate_assembly(weak_form: impl WeakForm + 'static, options: AssemblyOptions) -> Assembly {
    let mesh = create_rectangular_quad_mesh(1.0, 1.0, 2, 2).unwrap();
    Assembly::with_options(
        "plate",
        weak_form,
        Arc::new(mesh),
        Arc::new(ModelingSpace::solid_2d()),
        new_shared_cache(),
        options,
    )
}

#[test]
fn stiffness_is_symmetric_and_annihilates_rigid_translations() {
    let mut assembly = plate_assembly(StressEquilibrium::new(ElasticIsotropic::new(1e3, 0.3)), AssemblyOptions::default());
    let k = dense(assembly.global_matrix().unwrap());
    assert_matrix_eq!(k, k.transpose(), comp = abs, tol = 1e-10);

    let n_nodes = 9;
    let mut translation = DVector::zeros(2 * n_nodes);
    translation.rows_mut(0, n_nodes).fill(1.0);
    assert!((&k * &translation).amax() < 1e-10);
}

#[test]
fn symmetric_assembly_matches_full_assembly() {
    let law = ElasticIsotropic::new(1e3, 0.3);
    let mut full = plate_assembly(StressEquilibrium::new(law.clone()), AssemblyOptions::default());
    let mut symmetric = plate_assembly(
        StressEquilibrium::new(law),
        AssemblyOptions {
            assume_sym: true,
            ..Default::default()
        },
    );
    let k_full = dense(full.global_matrix().unwrap());
    let k_sym = dense(symmetric.global_matrix().unwrap());
    assert_matrix_eq!(k_sym, k_full, comp = abs, tol = 1e-10);
}

#[test]
fn uniaxial_traction_gives_uniform_plane_strain_state() {
    let (young, poisson, traction) = (1e3, 0.3, 5.0);
    let assembly = plate_assembly(StressEquilibrium::new(ElasticIsotropic::new(young, poisson)), AssemblyOptions::default());
    let mut problem = LinearProblem::new(assembly).unwrap();
    let nodal_forces = DVector::from_column_slice(&[traction / 4.0, traction / 2.0, traction / 4.0]);
    problem
        .bc_mut()
        .add(Dirichlet, "DispX", 0.0, "left")
        .unwrap()
        .add(Dirichlet, "DispY", 0.0, vec![0])
        .unwrap()
        .add(Neumann, "DispX", nodal_forces, "right")
        .unwrap();
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();

    let exx = (1.0 - poisson * poisson) * traction / young;
    let eyy = -poisson * (1.0 + poisson) * traction / young;

    let discretization = weakfem::assembly::Discretization::new(
        Arc::clone(problem.problem().space()),
        Arc::clone(problem.problem().mesh()),
        None,
        new_shared_cache(),
    );
    let strain = strain_at_points(&discretization, problem.x()).unwrap();
    for column in strain.column_iter() {
        assert_scalar_eq!(column[0], exx, comp = abs, tol = 1e-12);
        assert_scalar_eq!(column[1], eyy, comp = abs, tol = 1e-12);
        assert_scalar_eq!(column[3], 0.0, comp = abs, tol = 1e-12);
    }

    // Work of the applied forces is twice the stored energy
    let ux = problem.dof_solution("DispX").unwrap();
    let work: f64 = [2, 5, 8].iter().zip(nodal_forces_iter(traction)).map(|(&n, f)| f * ux[n]).sum();
    assert_scalar_eq!(problem.elastic_energy().unwrap(), 0.5 * work, comp = abs, tol = 1e-12);
}

fn nodal_forces_iter(traction: f64) -> impl Iterator<Item = f64> {
    [traction / 4.0, traction / 2.0, traction / 4.0].into_iter()
}

#[test]
fn gravity_vector_integrates_to_the_total_weight() {
    let mut assembly = plate_assembly(BodyForce::gravity(2.0, &[0.0, -9.81]), AssemblyOptions::default());
    let d = assembly.global_vector().unwrap().clone();
    let n_nodes = 9;
    assert_scalar_eq!(d.rows(0, n_nodes).sum(), 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(d.rows(n_nodes, n_nodes).sum(), -2.0 * 9.81, comp = abs, tol = 1e-12);
    assert_eq!(assembly.global_matrix().unwrap().nnz(), 0);
}

#[test]
fn lumped_mass_keeps_the_total_mass_on_the_diagonal() {
    let mut consistent = plate_assembly(Inertia::new(3.0), AssemblyOptions::default());
    let mut lumped = plate_assembly(
        Inertia::new(3.0),
        AssemblyOptions {
            lumped: true,
            ..Default::default()
        },
    );
    let m = dense(consistent.global_matrix().unwrap());
    let m_lumped = dense(lumped.global_matrix().unwrap());

    assert_scalar_eq!(m.sum(), 2.0 * 3.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(m_lumped.sum(), m.sum(), comp = abs, tol = 1e-12);
    for i in 0..m.nrows() {
        assert_scalar_eq!(m_lumped[(i, i)], m.row(i).sum(), comp = abs, tol = 1e-12);
        for j in 0..m.ncols() {
            if i != j {
                assert_eq!(m_lumped[(i, j)], 0.0);
            }
        }
    }
}
