use crate::unit_tests::{assemble_with, scalar_space, Diffusion};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{dvector, DVector};
use weakfem::assembly::Assembly;
use weakfem::boundary_conditions::BoundaryKind::{Dirichlet, Neumann};
use weakfem::boundary_conditions::MultiPointConstraint;
use weakfem::element::ElementType;
use weakfem::mesh::procedural::create_line_mesh;
use weakfem::problem::LinearProblem;
use weakfem::solver::SolverKind;
use weakfem::space::Dimension;

fn rod(form: Diffusion) -> Assembly {
    let mesh = create_line_mesh(&[0.0], &[1.0], 4, ElementType::Lin2).unwrap();
    assemble_with(form, mesh, scalar_space(Dimension::One), Default::default())
}

#[test]
fn prescribed_ends_give_a_linear_profile() {
    let mut problem = LinearProblem::new(rod(Diffusion::new(1.0))).unwrap();
    problem
        .bc_mut()
        .add(Dirichlet, "Temp", 1.0, "left")
        .unwrap()
        .add(Dirichlet, "Temp", 3.0, "right")
        .unwrap();
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();

    let temp = problem.dof_solution("Temp").unwrap();
    assert_matrix_eq!(temp, dvector![1.0, 1.5, 2.0, 2.5, 3.0], comp = abs, tol = 1e-12);
    assert_scalar_eq!(problem.elastic_energy().unwrap(), 2.0, comp = abs, tol = 1e-12);

    let reactions = problem.ext_forces().unwrap();
    assert_matrix_eq!(reactions, dvector![-2.0, 0.0, 0.0, 0.0, 2.0], comp = abs, tol = 1e-12);
    assert!(problem.dof_solution("Pressure").is_err());
}

#[test]
fn uniform_source_gives_a_parabola() {
    let mut form = Diffusion::new(1.0);
    form.source = 2.0;
    let mut problem = LinearProblem::new(rod(form)).unwrap();
    problem.bc_mut().add(Dirichlet, "Temp", 0.0, vec![0, 4]).unwrap();
    problem.set_solver(SolverKind::cg());
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();

    let expected = DVector::from_fn(5, |i, _| {
        let x = i as f64 / 4.0;
        x * (1.0 - x)
    });
    assert_matrix_eq!(problem.x().clone(), expected, comp = abs, tol = 1e-8);

    // Each support carries half of the total source
    let reactions = problem.ext_forces().unwrap();
    assert_scalar_eq!(reactions[0], -1.0, comp = abs, tol = 1e-8);
    assert_scalar_eq!(reactions[4], -1.0, comp = abs, tol = 1e-8);
    assert_scalar_eq!(reactions.sum(), -2.0, comp = abs, tol = 1e-8);
}

#[test]
fn tied_dofs_move_together() {
    let mut problem = LinearProblem::new(rod(Diffusion::new(1.0))).unwrap();
    let tie = MultiPointConstraint::new(
        &["Temp", "Temp"],
        vec!["right".into(), vec![3].into()],
        vec![1.0.into(), (-1.0).into()],
    );
    problem
        .bc_mut()
        .add(Dirichlet, "Temp", 0.0, "left")
        .unwrap()
        .add(Neumann, "Temp", 1.0, "right")
        .unwrap()
        .add_mpc(tie)
        .unwrap();
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();

    let temp = problem.dof_solution("Temp").unwrap();
    assert_matrix_eq!(temp, dvector![0.0, 0.25, 0.5, 0.75, 0.75], comp = abs, tol = 1e-12);
    assert_eq!(problem.problem().reduction().unwrap().n_free(), 3);
    assert_eq!(problem.problem().x_free().len(), 3);
}

#[test]
fn reset_keeps_constraints_and_clears_the_solution() {
    let mut problem = LinearProblem::new(rod(Diffusion::new(1.0))).unwrap();
    problem
        .bc_mut()
        .add(Dirichlet, "Temp", 0.0, "left")
        .unwrap()
        .add(Neumann, "Temp", 1.0, "right")
        .unwrap();
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();
    let tip = problem.dof_solution("Temp").unwrap()[4];
    assert_scalar_eq!(tip, 1.0, comp = abs, tol = 1e-12);

    problem.reset().unwrap();
    assert_eq!(problem.x(), &DVector::<f64>::zeros(5));
    assert_eq!(problem.bc().len(), 2);
    assert!(problem.problem().reduction().is_err());

    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();
    assert_scalar_eq!(problem.dof_solution("Temp").unwrap()[4], tip, comp = abs, tol = 1e-12);
}

#[test]
fn changed_assembly_is_used_by_the_next_solve() {
    let mut problem = LinearProblem::new(rod(Diffusion::new(1.0))).unwrap();
    problem
        .bc_mut()
        .add(Dirichlet, "Temp", 0.0, "left")
        .unwrap()
        .add(Neumann, "Temp", 1.0, "right")
        .unwrap();
    problem.change_assembly(rod(Diffusion::new(2.0)), true).unwrap();
    problem.apply_boundary_conditions().unwrap();
    problem.solve().unwrap();
    assert_scalar_eq!(problem.dof_solution("Temp").unwrap()[4], 0.5, comp = abs, tol = 1e-12);

    let longer = create_line_mesh(&[0.0], &[1.0], 5, ElementType::Lin2).unwrap();
    let mismatched = assemble_with(Diffusion::new(1.0), longer, scalar_space(Dimension::One), Default::default());
    assert!(problem.change_assembly(mismatched, false).is_err());
}
