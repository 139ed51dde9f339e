//! Elimination of constrained dofs.
//!
//! Dirichlet conditions and multi-point constraints eliminate dofs. The remaining free dofs are
//! mapped back to the full dof vector by `X = M · X_free + X_bc`, so a system `A X = F` is
//! reduced to `Mᵀ A M · X_free = Mᵀ (F - A X_bc)`.
use crate::boundary_conditions::{BoundaryConditionList, BoundaryKind, Constraint};
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Result of eliminating the constrained dofs at a given time factor.
#[derive(Debug, Clone)]
pub struct ConstraintReduction {
    /// Prescribed part of the solution, including the constant part of multi-point constraints.
    pub xbc: DVector<f64>,
    /// Nodal forces from Neumann conditions.
    pub neumann: DVector<f64>,
    /// `n_dof x n_free` map from free dofs to all dofs.
    pub matrix: CsrMatrix<f64>,
    pub free: Vec<usize>,
    /// Dofs prescribed by Dirichlet conditions.
    pub prescribed: Vec<usize>,
    /// Dofs eliminated by multi-point constraints.
    pub slaves: Vec<usize>,
}

impl ConstraintReduction {
    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn has_multi_point(&self) -> bool {
        !self.slaves.is_empty()
    }

    /// Expands free dof values to the full dof vector.
    pub fn expand(&self, x_free: &DVector<f64>) -> DVector<f64> {
        &self.matrix * x_free + &self.xbc
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DofState {
    Free,
    Prescribed,
    Slave,
}

impl BoundaryConditionList {
    /// Computes the dof reduction at time factor `t_fact`.
    ///
    /// With `t_fact_old`, Dirichlet values and constraint constants are the increments between
    /// the two time factors. Multi-point constraints whose independent dofs are themselves
    /// eliminated are resolved transitively; a cycle among constraints is an error.
    pub fn reduce(&self, mesh: &Mesh, t_fact: f64, t_fact_old: Option<f64>) -> eyre::Result<ConstraintReduction> {
        let space = self.space();
        let n_nodes = mesh.n_nodes();
        let n_dof = space.nvar() * n_nodes;
        let mut xbc = DVector::zeros(n_dof);
        let mut neumann = DVector::zeros(n_dof);
        let mut state = vec![DofState::Free; n_dof];
        let mut dependencies = CooMatrix::new(n_dof, n_dof);
        let duplicate = |dof: usize| ConfigurationError::DuplicateElimination {
            variable: space.variable_name(dof / n_nodes).to_string(),
            node: dof % n_nodes,
        };

        for constraint in self.constraints() {
            match constraint {
                Constraint::Boundary(bc) => {
                    let rank = space.variable_rank(&bc.variable)?;
                    let nodes = bc.nodes.resolve(mesh)?;
                    let values = bc.values(nodes.len(), t_fact, t_fact_old)?;
                    for (&node, &value) in nodes.iter().zip(values.iter()) {
                        let dof = rank * n_nodes + node;
                        match bc.kind {
                            BoundaryKind::Dirichlet => {
                                if state[dof] == DofState::Slave {
                                    return Err(duplicate(dof).into());
                                }
                                state[dof] = DofState::Prescribed;
                                xbc[dof] = value;
                            }
                            BoundaryKind::Neumann => neumann[dof] += value,
                        }
                    }
                }
                Constraint::MultiPoint(mpc) => {
                    let ranks = mpc
                        .variables
                        .iter()
                        .map(|v| space.variable_rank(v))
                        .collect::<eyre::Result<Vec<_>>>()?;
                    let node_sets = mpc
                        .nodes
                        .iter()
                        .map(|s| s.resolve(mesh))
                        .collect::<eyre::Result<Vec<_>>>()?;
                    let n = node_sets.iter().map(|s| s.len()).max().unwrap_or(0);
                    if let Some(set) = node_sets.iter().find(|s| s.len() != n && s.len() != 1) {
                        return Err(ConfigurationError::DimensionMismatch {
                            context: format!("node selection of constraint '{}'", mpc.name),
                            expected: n,
                            actual: set.len(),
                        }
                        .into());
                    }
                    let factors = mpc
                        .factors
                        .iter()
                        .map(|f| f.at_nodes(n))
                        .collect::<eyre::Result<Vec<_>>>()?;
                    let constants = mpc.constant_values(n, t_fact, t_fact_old)?;
                    let dof_of = |term: usize, k: usize| {
                        let set = node_sets[term];
                        ranks[term] * n_nodes + set[if set.len() == 1 { 0 } else { k }]
                    };

                    for k in 0..n {
                        let slave = dof_of(0, k);
                        let leading = factors[0][k];
                        if leading == 0.0 {
                            return Err(mpc.zero_factor_error().into());
                        }
                        if state[slave] != DofState::Free {
                            return Err(duplicate(slave).into());
                        }
                        state[slave] = DofState::Slave;
                        xbc[slave] = constants[k] / leading;
                        for term in 1..ranks.len() {
                            let master = dof_of(term, k);
                            if master == slave {
                                return Err(mpc.self_reference_error().into());
                            }
                            dependencies.push(slave, master, -factors[term][k] / leading);
                        }
                    }
                }
            }
        }

        let free: Vec<usize> = (0..n_dof).filter(|&i| state[i] == DofState::Free).collect();
        let prescribed: Vec<usize> = (0..n_dof).filter(|&i| state[i] == DofState::Prescribed).collect();
        let slaves: Vec<usize> = (0..n_dof).filter(|&i| state[i] == DofState::Slave).collect();

        let mut injection = CooMatrix::new(n_dof, free.len());
        for (j, &dof) in free.iter().enumerate() {
            injection.push(dof, j, 1.0);
        }
        let injection = CsrMatrix::from(&injection);
        let dependencies = CsrMatrix::from(&dependencies);

        // Resolve chains of constraints: with S the slave-to-master dependencies,
        // X = (I + S + S² + ...) (E X_free + X_bc), which terminates unless S has a cycle.
        let mut matrix = injection.clone();
        let mut power = dependencies.clone();
        let base = xbc.clone();
        let mut depth = 0;
        while power.nnz() > 0 {
            depth += 1;
            if depth > slaves.len() {
                let (slave, _, _) = power
                    .triplet_iter()
                    .next()
                    .expect("Must succeed since the matrix has nonzeros");
                return Err(ConfigurationError::CyclicConstraint {
                    variable: space.variable_name(slave / n_nodes).to_string(),
                    node: slave % n_nodes,
                }
                .into());
            }
            xbc += &power * &base;
            matrix = &matrix + &(&power * &injection);
            power = &dependencies * &power;
        }
        if depth > 1 {
            debug!("Resolved chained constraints over {depth} levels");
        }

        Ok(ConstraintReduction {
            xbc,
            neumann,
            matrix,
            free,
            prescribed,
            slaves,
        })
    }
}
