//! Dirichlet, Neumann and multi-point constraints, declared by variable and node set.
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::space::ModelingSpace;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Prescribed dof value.
    Dirichlet,
    /// Prescribed nodal force.
    Neumann,
}

/// Value of a condition: the same for every node, one per node, or one per vector component.
#[derive(Debug, Clone, PartialEq)]
pub enum BcValue {
    Uniform(f64),
    PerNode(DVector<f64>),
    /// One value per component, only valid when the condition targets a vector.
    PerComponent(Vec<f64>),
}

impl From<f64> for BcValue {
    fn from(value: f64) -> Self {
        BcValue::Uniform(value)
    }
}

impl From<DVector<f64>> for BcValue {
    fn from(values: DVector<f64>) -> Self {
        BcValue::PerNode(values)
    }
}

impl From<Vec<f64>> for BcValue {
    fn from(values: Vec<f64>) -> Self {
        BcValue::PerNode(DVector::from_vec(values))
    }
}

impl BcValue {
    /// Values at `n` nodes.
    pub fn at_nodes(&self, n: usize) -> eyre::Result<DVector<f64>> {
        match self {
            BcValue::Uniform(value) => Ok(DVector::repeat(n, *value)),
            BcValue::PerNode(values) if values.len() == n => Ok(values.clone()),
            BcValue::PerNode(values) if values.len() == 1 => Ok(DVector::repeat(n, values[0])),
            BcValue::PerNode(values) => Err(ConfigurationError::DimensionMismatch {
                context: "boundary condition values".to_string(),
                expected: n,
                actual: values.len(),
            }
            .into()),
            BcValue::PerComponent(_) => Err(ConfigurationError::InvalidSetting(
                "per-component values require a vector variable".to_string(),
            )
            .into()),
        }
    }
}

/// Nodes a condition applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSelection {
    Named(String),
    Indices(Vec<usize>),
}

impl From<&str> for NodeSelection {
    fn from(name: &str) -> Self {
        NodeSelection::Named(name.to_string())
    }
}

impl From<Vec<usize>> for NodeSelection {
    fn from(indices: Vec<usize>) -> Self {
        NodeSelection::Indices(indices)
    }
}

impl From<&[usize]> for NodeSelection {
    fn from(indices: &[usize]) -> Self {
        NodeSelection::Indices(indices.to_vec())
    }
}

impl NodeSelection {
    pub fn resolve<'a>(&'a self, mesh: &'a Mesh) -> eyre::Result<&'a [usize]> {
        let nodes = match self {
            NodeSelection::Named(name) => mesh.node_set(name)?,
            NodeSelection::Indices(indices) => indices.as_slice(),
        };
        if let Some(&node) = nodes.iter().find(|&&n| n >= mesh.n_nodes()) {
            return Err(ConfigurationError::NodeIndexOutOfBounds {
                node,
                n_nodes: mesh.n_nodes(),
            }
            .into());
        }
        Ok(nodes)
    }
}

/// Evolution of a condition over the normalized time `t ∈ [0, 1]` of a load step.
#[derive(Clone)]
pub struct TimeFunction(Arc<dyn Fn(f64) -> f64 + Send + Sync>);

impl TimeFunction {
    pub fn new(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Full value at the end of the step, none at the start.
    pub fn linear() -> Self {
        Self::new(|t| t)
    }

    /// Full value from the start of the step.
    pub fn constant() -> Self {
        Self::new(|_| 1.0)
    }

    pub fn eval(&self, t: f64) -> f64 {
        (self.0)(t)
    }
}

impl Default for TimeFunction {
    fn default() -> Self {
        Self::linear()
    }
}

impl fmt::Debug for TimeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeFunction")
    }
}

/// Scaling of a condition value between two time factors.
///
/// With `t_fact_old` the factor is the increment `f(t) - f(t_old)`, for Dirichlet conditions in
/// incremental problems. Neumann conditions always use the total factor `f(t)`.
fn time_factor(kind: Option<BoundaryKind>, f: &TimeFunction, t_fact: f64, t_fact_old: Option<f64>) -> f64 {
    match (kind, t_fact_old) {
        (Some(BoundaryKind::Neumann), _) | (_, None) => f.eval(t_fact),
        (_, Some(old)) => f.eval(t_fact) - f.eval(old),
    }
}

/// A Dirichlet or Neumann condition on a single variable.
#[derive(Debug, Clone)]
pub struct BoundaryCondition {
    pub kind: BoundaryKind,
    pub variable: String,
    pub value: BcValue,
    pub nodes: NodeSelection,
    pub time_function: TimeFunction,
    /// Value at the start of the load step. `None` means the state reached by the previous
    /// solve, see [`BoundaryConditionList::set_start_to_current`], or zero before any solve.
    pub start_value: Option<BcValue>,
    /// Per-node start taken from the current state, used when `start_value` is `None`.
    pub current_start: Option<DVector<f64>>,
    pub name: String,
}

impl BoundaryCondition {
    /// Replaces the target value. The previous target becomes the start value unless one is given.
    pub fn change_value(&mut self, value: impl Into<BcValue>, start_value: Option<BcValue>) {
        let previous = std::mem::replace(&mut self.value, value.into());
        self.start_value = Some(start_value.unwrap_or(previous));
    }

    /// Values at the given time factor, one per selected node.
    ///
    /// Dirichlet values are increments when `t_fact_old` is given.
    pub fn values(&self, n_nodes: usize, t_fact: f64, t_fact_old: Option<f64>) -> eyre::Result<DVector<f64>> {
        let factor = time_factor(Some(self.kind), &self.time_function, t_fact, t_fact_old);
        let value = self.value.at_nodes(n_nodes)?;
        let start = match (&self.start_value, &self.current_start) {
            (Some(start), _) => start.at_nodes(n_nodes)?,
            (None, Some(current)) if current.len() == n_nodes => current.clone(),
            (None, Some(current)) => {
                return Err(ConfigurationError::DimensionMismatch {
                    context: format!("start values of '{}'", self.name),
                    expected: n_nodes,
                    actual: current.len(),
                }
                .into())
            }
            (None, None) => return Ok(value * factor),
        };
        let delta = (value - &start) * factor;
        match (self.kind, t_fact_old) {
            (BoundaryKind::Dirichlet, Some(_)) => Ok(delta),
            _ => Ok(delta + start),
        }
    }
}

/// Linear relation `Σ factor_i · u_i(nodes_i) = constant` enforced node-wise.
///
/// The first term's dofs are eliminated (expressed in terms of the others), so the first factor
/// must be nonzero. Node selections of length one are broadcast to the length of the others.
#[derive(Debug, Clone)]
pub struct MultiPointConstraint {
    pub variables: Vec<String>,
    pub nodes: Vec<NodeSelection>,
    pub factors: Vec<BcValue>,
    pub constant: Option<BcValue>,
    pub time_function: TimeFunction,
    pub name: String,
}

impl MultiPointConstraint {
    pub fn new(variables: &[&str], nodes: Vec<NodeSelection>, factors: Vec<BcValue>) -> Self {
        Self {
            variables: variables.iter().map(|v| v.to_string()).collect(),
            nodes,
            factors,
            constant: None,
            time_function: TimeFunction::default(),
            name: "MPC".to_string(),
        }
    }

    pub fn with_constant(mut self, constant: impl Into<BcValue>) -> Self {
        self.constant = Some(constant.into());
        self
    }

    pub fn with_time_function(mut self, time_function: TimeFunction) -> Self {
        self.time_function = time_function;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Right-hand side values at the given time factor, one per constrained node group.
    pub fn constant_values(&self, n: usize, t_fact: f64, t_fact_old: Option<f64>) -> eyre::Result<DVector<f64>> {
        match &self.constant {
            None => Ok(DVector::zeros(n)),
            Some(constant) => {
                let factor = time_factor(None, &self.time_function, t_fact, t_fact_old);
                Ok(constant.at_nodes(n)? * factor)
            }
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::MalformedMpc {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self, space: &ModelingSpace) -> eyre::Result<()> {
        if self.variables.is_empty() {
            return Err(self.malformed("no terms").into());
        }
        if self.nodes.len() != self.variables.len() || self.factors.len() != self.variables.len() {
            return Err(self
                .malformed("one node selection and one factor per variable are required")
                .into());
        }
        for variable in &self.variables {
            space.variable_rank(variable)?;
        }
        if self.factors[0] == BcValue::Uniform(0.0) {
            return Err(self.malformed("the first factor must be nonzero").into());
        }
        Ok(())
    }

    pub(crate) fn zero_factor_error(&self) -> ConfigurationError {
        self.malformed("the first factor must be nonzero")
    }

    pub(crate) fn self_reference_error(&self) -> ConfigurationError {
        self.malformed("a dof can not be expressed in terms of itself")
    }
}

#[derive(Debug, Clone)]
pub enum Constraint {
    Boundary(BoundaryCondition),
    MultiPoint(MultiPointConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Boundary(bc) => &bc.name,
            Constraint::MultiPoint(mpc) => &mpc.name,
        }
    }
}

/// Optional settings of a boundary condition.
#[derive(Debug, Clone, Default)]
pub struct BcOptions {
    pub time_function: Option<TimeFunction>,
    pub start_value: Option<BcValue>,
    pub name: Option<String>,
}

/// Ordered list of constraints of a problem.
///
/// Constraints are applied in declaration order: a later Dirichlet value on the same dof
/// overrides an earlier one.
#[derive(Debug, Clone)]
pub struct BoundaryConditionList {
    space: Arc<ModelingSpace>,
    constraints: Vec<Constraint>,
}

impl BoundaryConditionList {
    pub fn new(space: Arc<ModelingSpace>) -> Self {
        Self {
            space,
            constraints: Vec::new(),
        }
    }

    pub fn space(&self) -> &Arc<ModelingSpace> {
        &self.space
    }

    /// Adds a condition on a variable, or on each component of a vector.
    pub fn add(
        &mut self,
        kind: BoundaryKind,
        variable: &str,
        value: impl Into<BcValue>,
        nodes: impl Into<NodeSelection>,
    ) -> eyre::Result<&mut Self> {
        self.add_with(kind, variable, value, nodes, BcOptions::default())
    }

    pub fn add_with(
        &mut self,
        kind: BoundaryKind,
        variable: &str,
        value: impl Into<BcValue>,
        nodes: impl Into<NodeSelection>,
        options: BcOptions,
    ) -> eyre::Result<&mut Self> {
        let value = value.into();
        let nodes = nodes.into();
        let components = self.space.expand_variable(variable)?;
        let values = match value {
            BcValue::PerComponent(values) if values.len() == components.len() => {
                values.into_iter().map(BcValue::Uniform).collect()
            }
            BcValue::PerComponent(values) => {
                return Err(ConfigurationError::DimensionMismatch {
                    context: format!("component values of '{variable}'"),
                    expected: components.len(),
                    actual: values.len(),
                }
                .into())
            }
            value => vec![value; components.len()],
        };
        let name = options
            .name
            .unwrap_or_else(|| format!("{kind:?} {variable}"));
        for (component, value) in components.into_iter().zip(values) {
            self.constraints.push(Constraint::Boundary(BoundaryCondition {
                kind,
                variable: component,
                value,
                nodes: nodes.clone(),
                time_function: options.time_function.clone().unwrap_or_default(),
                start_value: options.start_value.clone(),
                current_start: None,
                name: name.clone(),
            }));
        }
        Ok(self)
    }

    pub fn add_mpc(&mut self, mpc: MultiPointConstraint) -> eyre::Result<&mut Self> {
        mpc.validate(&self.space)?;
        self.constraints.push(Constraint::MultiPoint(mpc));
        Ok(self)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Boundary conditions with the given name (one per vector component).
    pub fn conditions_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut BoundaryCondition> + 'a {
        self.constraints.iter_mut().filter_map(move |c| match c {
            Constraint::Boundary(bc) if bc.name == name => Some(bc),
            _ => None,
        })
    }

    /// Starts every condition without an explicit start value from the current state.
    ///
    /// Dirichlet conditions start from the dof values `u`, Neumann conditions from the nodal
    /// forces `forces`, both in variable-major dof order.
    pub fn set_start_to_current(&mut self, mesh: &Mesh, u: &DVector<f64>, forces: &DVector<f64>) -> eyre::Result<()> {
        let n_nodes = mesh.n_nodes();
        for constraint in &mut self.constraints {
            let bc = match constraint {
                Constraint::Boundary(bc) if bc.start_value.is_none() => bc,
                _ => continue,
            };
            let rank = self.space.variable_rank(&bc.variable)?;
            let source = match bc.kind {
                BoundaryKind::Dirichlet => u,
                BoundaryKind::Neumann => forces,
            };
            let nodes = bc.nodes.resolve(mesh)?;
            let start = nodes
                .iter()
                .map(|&node| source.get(rank * n_nodes + node).copied())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| ConfigurationError::DimensionMismatch {
                    context: "current state".to_string(),
                    expected: self.space.nvar() * n_nodes,
                    actual: source.len(),
                })?;
            bc.current_start = Some(DVector::from_vec(start));
        }
        Ok(())
    }

    /// Forgets the start values taken from a previous state.
    pub fn clear_current_start(&mut self) {
        for constraint in &mut self.constraints {
            if let Constraint::Boundary(bc) = constraint {
                bc.current_start = None;
            }
        }
    }

    /// Removes all constraints with the given name and returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.constraints.len();
        self.constraints.retain(|c| c.name() != name);
        before - self.constraints.len()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn has_multi_point(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, Constraint::MultiPoint(_)))
    }
}
