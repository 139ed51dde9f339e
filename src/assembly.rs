//! Assembly of weak forms into global sparse systems.
use crate::assembly::cache::{DataLocation, ElementOperators, OperatorSlot, SharedOperatorCache};
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::operator::{Coefficient, DiffOp, OpDerivative};
use crate::space::ModelingSpace;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;

mod block;
pub mod cache;
mod global;
mod sum;

pub use global::Assembly;
pub use sum::AssemblySum;

/// Which parts of the global system an assembly pass computes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compute {
    All,
    Matrix,
    Vector,
    None,
}

impl Compute {
    pub fn matrix(&self) -> bool {
        matches!(self, Compute::All | Compute::Matrix)
    }

    pub fn vector(&self) -> bool {
        matches!(self, Compute::All | Compute::Vector)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// Gauss points per element. `None` uses the element default.
    pub n_gauss: Option<usize>,
    /// Only compute blocks with `virtual rank <= real rank` and mirror them.
    pub assume_sym: bool,
    /// Collapse every bilinear contribution to its row-sum diagonal.
    pub lumped: bool,
    /// Move the mesh nodes with the `Disp` vector on every update (updated Lagrangian).
    pub updated_lagrangian: bool,
}

/// A (space, mesh, quadrature) triple and its cached element operators.
///
/// This is what weak forms see: it turns operators into point values and moves data between
/// nodes and integration points.
#[derive(Debug, Clone)]
pub struct Discretization {
    space: Arc<ModelingSpace>,
    mesh: Arc<Mesh>,
    n_gauss: usize,
    cache: SharedOperatorCache,
}

/// One block of an elementary operator: the variable it acts on and its coupling factor.
#[derive(Debug)]
pub struct ElementaryBlock<'a> {
    pub variable: usize,
    pub factor: f64,
    pub matrix: &'a CsrMatrix<f64>,
}

impl Discretization {
    pub fn new(space: Arc<ModelingSpace>, mesh: Arc<Mesh>, n_gauss: Option<usize>, cache: SharedOperatorCache) -> Self {
        let n_gauss = n_gauss.unwrap_or_else(|| mesh.element_type().default_gauss_points());
        Self {
            space,
            mesh,
            n_gauss,
            cache,
        }
    }

    pub fn space(&self) -> &Arc<ModelingSpace> {
        &self.space
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    /// Mutable access to the mesh, copying it first if it is shared.
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        Arc::make_mut(&mut self.mesh)
    }

    pub fn n_gauss(&self) -> usize {
        self.n_gauss
    }

    pub fn cache(&self) -> &SharedOperatorCache {
        &self.cache
    }

    /// Number of global dofs: one per variable per node.
    pub fn n_dof(&self) -> usize {
        self.space.nvar() * self.mesh.n_nodes()
    }

    pub fn operators(&self) -> eyre::Result<Rc<ElementOperators>> {
        self.cache
            .borrow_mut()
            .element_operators(&self.mesh, self.n_gauss)
    }

    /// Matrix rotating global dofs into element-local dofs, for element families with local frames.
    pub fn change_of_basis(&self, operators: &ElementOperators) -> eyre::Result<Option<Rc<CsrMatrix<f64>>>> {
        if !operators.has_local_frames() {
            return Ok(None);
        }
        let basis = self
            .cache
            .borrow_mut()
            .change_of_basis(&self.mesh, &self.space, operators)?;
        Ok(Some(basis))
    }

    /// Number of integration points (rows of the point operators).
    pub fn n_points(&self) -> eyre::Result<usize> {
        Ok(self.operators()?.n_points())
    }

    /// Realizes a single derivative as point-operator blocks.
    ///
    /// Derivatives with respect to a coordinate the mesh does not have are zero everywhere and
    /// are treated as plain values.
    pub fn elementary<'a>(
        &self,
        operators: &'a ElementOperators,
        op: &OpDerivative,
    ) -> eyre::Result<Vec<ElementaryBlock<'a>>> {
        let name = self.space.variable_name(op.variable);
        let family = self.mesh.element_type().interpolation_for(name);
        let slot = match op.coordinate {
            Some(c) if op.order > 0 => {
                let coordinate = self.space.coordinate_name(c);
                match self.mesh.coordinate_index(coordinate) {
                    Some(direction) if op.order == 1 => OperatorSlot::Derivative(direction),
                    Some(_) => {
                        return Err(ConfigurationError::OperatorUnavailable {
                            variable: name.to_string(),
                            coordinate: format!("{coordinate} (order {})", op.order),
                        }
                        .into())
                    }
                    None => OperatorSlot::Value,
                }
            }
            _ => OperatorSlot::Value,
        };
        let matrices = operators
            .operator(family.interpolation, slot)
            .ok_or_else(|| ConfigurationError::OperatorUnavailable {
                variable: name.to_string(),
                coordinate: match op.coordinate {
                    Some(c) if op.order > 0 => self.space.coordinate_name(c).to_string(),
                    _ => "value".to_string(),
                },
            })?;
        let mut blocks = vec![ElementaryBlock {
            variable: op.variable,
            factor: 1.0,
            matrix: &matrices[0],
        }];
        if let Some((associated, factor)) = family.associated {
            blocks.push(ElementaryBlock {
                variable: self.space.variable_rank(associated)?,
                factor,
                matrix: &matrices[1],
            });
        }
        Ok(blocks)
    }

    /// Values of a coefficient at the integration points.
    pub fn coefficient_at_points(&self, coefficient: &Coefficient) -> eyre::Result<DVector<f64>> {
        self.operators()?.coefficient_at_points(coefficient)
    }

    /// Evaluates a real-only operator at the integration points for a given global dof vector.
    pub fn evaluate(&self, op: &DiffOp, dof: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        if dof.len() != self.n_dof() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "dof vector".to_string(),
                expected: self.n_dof(),
                actual: dof.len(),
            }
            .into());
        }
        let operators = self.operators()?;
        let local_dof = match self.change_of_basis(&operators)? {
            Some(basis) => basis.as_ref() * dof,
            None => dof.clone(),
        };
        let n_columns = operators.n_columns();
        let mut result = DVector::zeros(operators.n_points());
        for term in op.terms() {
            let coefficient = operators.coefficient_at_points(&term.coefficient)?;
            match term.real {
                None => result += coefficient,
                Some(real) => {
                    for block in self.elementary(&operators, &real)? {
                        let u = local_dof.rows(block.variable * n_columns, n_columns).into_owned();
                        let values = block.matrix * &u;
                        result += values.component_mul(&coefficient) * block.factor;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Integrates point values over the mesh.
    pub fn integrate(&self, values: &DVector<f64>) -> eyre::Result<f64> {
        let operators = self.operators()?;
        if values.len() != operators.n_points() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "integrated field".to_string(),
                expected: operators.n_points(),
                actual: values.len(),
            }
            .into());
        }
        Ok(operators.quadrature().dot(values))
    }

    /// Extrapolates point values to the nodes.
    pub fn points_to_nodes(&self, values: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        Ok(self.operators()?.points_to_nodes(values))
    }

    /// Interpolates nodal values at the integration points.
    pub fn nodes_to_points(&self, values: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        Ok(self.operators()?.node_to_gauss() * values)
    }

    pub fn convert_data(&self, values: &DVector<f64>, from: DataLocation, to: DataLocation) -> eyre::Result<DVector<f64>> {
        self.operators()?.convert_data(values, from, to)
    }
}

/// A weak form assembled into a global system `K`, `D` of size `nvar * n_nodes`.
///
/// `D` holds the load terms of the weak form with a negative sign, so that an equilibrium
/// `K X = B + D` balances the external loads `B` against the forces of the weak form.
pub trait GlobalAssembly {
    fn name(&self) -> &str;

    fn space(&self) -> &Arc<ModelingSpace>;

    fn mesh(&self) -> &Arc<Mesh>;

    fn n_dof(&self) -> usize {
        self.space().nvar() * self.mesh().n_nodes()
    }

    /// Recomputes the requested parts of the global system.
    fn assemble_global_mat(&mut self, compute: Compute) -> eyre::Result<()>;

    /// The global matrix, assembled first if it is stale.
    fn global_matrix(&mut self) -> eyre::Result<&CsrMatrix<f64>>;

    /// The global vector, assembled first if it is stale.
    fn global_vector(&mut self) -> eyre::Result<&DVector<f64>>;

    fn delete_global_mat(&mut self);

    fn initialize(&mut self, t0: f64) -> eyre::Result<()>;

    /// Commits the current state as the start of an increment of length `dt` and reassembles.
    fn set_start(&mut self, dt: f64) -> eyre::Result<()>;

    /// Updates the state from the trial dofs and reassembles what is requested.
    fn update(&mut self, dof: &DVector<f64>, dt: f64, compute: Compute) -> eyre::Result<()>;

    fn to_start(&mut self) -> eyre::Result<()>;

    fn reset(&mut self) -> eyre::Result<()>;

    /// Forces `K X - D` for a global dof vector.
    fn forces(&mut self, dof: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let kx = self.global_matrix()? * dof;
        Ok(kx - self.global_vector()?)
    }
}
