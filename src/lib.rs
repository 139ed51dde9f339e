//! Finite element kernel: symbolic weak forms assembled into sparse systems, constraint
//! elimination and incremental Newton-Raphson solution.
//!
//! A model is described by a [`space::ModelingSpace`] (variables and coordinates), one or more
//! [`mesh::Mesh`]es and weak forms implementing [`weakform::WeakForm`]. An
//! [`assembly::Assembly`] realizes a weak form over a mesh, and a
//! [`problem::LinearProblem`] or [`problem::NonLinearProblem`] solves the assembled system
//! under the constraints declared in its [`boundary_conditions::BoundaryConditionList`].
pub mod assembly;
pub mod boundary_conditions;
pub mod constraint;
pub mod context;
pub mod element;
pub mod error;
pub mod mesh;
pub mod operator;
pub mod problem;
pub mod solver;
pub mod space;
pub mod weakform;

pub extern crate eyre;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use weakfem_quadrature as quadrature;
pub use weakfem_sparse as sparse;
