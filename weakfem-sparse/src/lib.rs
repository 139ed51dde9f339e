//! Sparse matrix functionality for `weakfem`.
//!
//! Matrices are `nalgebra-sparse` CSR matrices; this crate adds the iterative solver and the
//! handful of structural helpers the assembly and constraint machinery needs.

pub mod cg;
pub mod sparse;

pub use nalgebra_sparse::{CooMatrix, CsrMatrix};
