//! Error types for configuration and convergence failures.
//!
//! Fallible functions in this crate return [`eyre::Result`]; the typed errors below are wrapped
//! in the report and can be recovered with [`eyre::Report::downcast_ref`].
use std::error::Error;
use std::fmt;

/// A fatal, non-retryable problem with how a model was set up.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigurationError {
    UnknownVariable(String),
    UnknownCoordinate(String),
    UnknownVector(String),
    UnknownNodeSet(String),
    NodeIndexOutOfBounds { node: usize, n_nodes: usize },
    /// A derivative operator that the element family cannot provide.
    OperatorUnavailable { variable: String, coordinate: String },
    UnsupportedElement { element: String, reason: String },
    DegenerateElement { element: usize },
    /// A term with two real or two virtual operators.
    MixingRule,
    /// A term without virtual operator reached the assembly.
    MissingVirtualOperator { variable: String },
    MalformedMpc { name: String, reason: String },
    /// The same dof was eliminated by two constraints.
    DuplicateElimination { variable: String, node: usize },
    CyclicConstraint { variable: String, node: usize },
    DimensionMismatch { context: String, expected: usize, actual: usize },
    InvalidSetting(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigurationError::*;
        match self {
            UnknownVariable(name) => write!(f, "unknown variable '{name}'"),
            UnknownCoordinate(name) => write!(f, "unknown coordinate '{name}'"),
            UnknownVector(name) => write!(f, "unknown vector '{name}'"),
            UnknownNodeSet(name) => write!(f, "unknown node set '{name}'"),
            NodeIndexOutOfBounds { node, n_nodes } => {
                write!(f, "node index {node} is out of bounds for a mesh with {n_nodes} nodes")
            }
            OperatorUnavailable { variable, coordinate } => write!(
                f,
                "operator unavailable: derivative of '{variable}' with respect to '{coordinate}'"
            ),
            UnsupportedElement { element, reason } => write!(f, "element '{element}': {reason}"),
            DegenerateElement { element } => write!(f, "element {element} has a singular Jacobian"),
            MixingRule => write!(
                f,
                "impossible operation: a term may hold at most one real and one virtual operator"
            ),
            MissingVirtualOperator { variable } => {
                write!(f, "term on '{variable}' has no virtual operator")
            }
            MalformedMpc { name, reason } => write!(f, "malformed multi-point constraint '{name}': {reason}"),
            DuplicateElimination { variable, node } => write!(
                f,
                "dof '{variable}' of node {node} is eliminated twice (a node can't be deleted twice)"
            ),
            CyclicConstraint { variable, node } => write!(
                f,
                "multi-point constraints form a cycle through dof '{variable}' of node {node}"
            ),
            DimensionMismatch {
                context,
                expected,
                actual,
            } => write!(f, "{context}: expected length {expected}, got {actual}"),
            InvalidSetting(message) => write!(f, "invalid setting: {message}"),
        }
    }
}

impl Error for ConfigurationError {}

/// Failure of the incremental Newton-Raphson procedure.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum NonConvergenceError {
    /// The time increment was shrunk below the allowed minimum.
    TimeStepBelowMinimum { time: f64, dt: f64, dt_min: f64 },
    /// The sub-iteration bound was exhausted and adaptive stepping is disabled.
    SubiterationsExhausted { time: f64, dt: f64, error: f64 },
}

impl fmt::Display for NonConvergenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeStepBelowMinimum { time, dt, dt_min } => write!(
                f,
                "increment starting at t = {time} did not converge: time step {dt:e} is below the minimum {dt_min:e}"
            ),
            Self::SubiterationsExhausted { time, dt, error } => write!(
                f,
                "increment starting at t = {time} with dt = {dt:e} did not converge (error = {error:e})"
            ),
        }
    }
}

impl Error for NonConvergenceError {}
