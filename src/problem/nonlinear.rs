use crate::assembly::{Compute, GlobalAssembly};
use crate::boundary_conditions::BoundaryConditionList;
use crate::error::{ConfigurationError, NonConvergenceError};
use crate::problem::{Problem, SystemMatrix};
use crate::solver::SolverKind;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use weakfem_sparse::sparse::gather;

/// Tolerance used to compare times.
const TIME_EPSILON: f64 = 1e-8;

/// Quantity monitored for Newton-Raphson convergence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceCriterion {
    /// Largest correction relative to the largest total displacement.
    Displacement,
    /// Largest residual force relative to the first residual of the increment.
    Force,
    /// Largest correction times residual relative to its first value in the increment.
    Work,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonRaphsonSettings {
    pub criterion: ConvergenceCriterion,
    pub tolerance: f64,
    /// Largest number of residual evaluations per increment.
    pub max_subiterations: usize,
    /// Fixed reference for the error. `None` uses the first evaluation of each increment.
    pub reference_error: Option<f64>,
}

impl Default for NewtonRaphsonSettings {
    fn default() -> Self {
        Self {
            criterion: ConvergenceCriterion::Displacement,
            tolerance: 5e-3,
            max_subiterations: 5,
            reference_error: None,
        }
    }
}

/// When solution snapshots are recorded during [`NonLinearProblem::nlsolve`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputInterval {
    /// At every multiple of the interval. Increments are shortened to hit these times exactly.
    Time(f64),
    /// After every `n` converged increments.
    Iterations(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlSolveOptions {
    pub t0: f64,
    pub tmax: f64,
    /// Initial time step.
    pub dt: f64,
    pub dt_min: f64,
    /// Grow the time step after fast convergence and shrink it after a failure.
    pub update_dt: bool,
    /// Snapshot schedule. `None` only records the final state.
    pub output: Option<OutputInterval>,
}

impl Default for NlSolveOptions {
    fn default() -> Self {
        Self {
            t0: 0.0,
            tmax: 1.0,
            dt: 0.1,
            dt_min: 1e-6,
            update_dt: true,
            output: None,
        }
    }
}

/// Result of a single time increment.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IncrementOutcome {
    pub converged: bool,
    /// Number of tangent corrections performed.
    pub subiterations: usize,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub time: f64,
    pub increment: usize,
    pub dof: DVector<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NlSolveReport {
    pub converged_increments: usize,
    pub rejected_increments: usize,
    /// `(increment, sub-iteration, error)` of every residual evaluation.
    pub history: Vec<(usize, usize, f64)>,
    pub snapshots: Vec<Snapshot>,
    pub final_time: f64,
}

/// Steps of the Newton-Raphson procedure within a time increment.
#[derive(Debug, Copy, Clone, PartialEq)]
enum NewtonStep {
    ElasticPrediction,
    ResidualCheck { subiteration: usize },
    TangentUpdate { subiteration: usize },
    Converged { subiteration: usize, error: f64 },
    Rejected { error: f64 },
}

/// Incremental nonlinear problem solved by Newton-Raphson iterations with adaptive time steps.
///
/// The committed displacement `U` is only updated when an increment converges. Within an
/// increment the trial correction `dU` accumulates the solutions of the linearized systems.
pub struct NonLinearProblem {
    problem: Problem,
    assembly: Box<dyn GlobalAssembly>,
    settings: NewtonRaphsonSettings,
    u: DVector<f64>,
    du: DVector<f64>,
    reference_error: Option<f64>,
    t0: f64,
    tmax: f64,
    initialized: bool,
    history: Vec<(usize, f64)>,
}

impl NonLinearProblem {
    pub fn new(assembly: impl GlobalAssembly + 'static) -> Self {
        Self::from_boxed(Box::new(assembly))
    }

    pub fn from_boxed(assembly: Box<dyn GlobalAssembly>) -> Self {
        let problem = Problem::new(Arc::clone(assembly.space()), Arc::clone(assembly.mesh()));
        let n_dof = problem.n_dof();
        Self {
            problem,
            assembly,
            settings: NewtonRaphsonSettings::default(),
            u: DVector::zeros(n_dof),
            du: DVector::zeros(n_dof),
            reference_error: None,
            t0: 0.0,
            tmax: 1.0,
            initialized: false,
            history: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: NewtonRaphsonSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &NewtonRaphsonSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: NewtonRaphsonSettings) {
        self.settings = settings;
    }

    pub fn set_solver(&mut self, solver: SolverKind) {
        self.problem.set_solver(solver);
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn assembly(&self) -> &dyn GlobalAssembly {
        self.assembly.as_ref()
    }

    pub fn assembly_mut(&mut self) -> &mut dyn GlobalAssembly {
        self.assembly.as_mut()
    }

    pub fn bc(&self) -> &BoundaryConditionList {
        self.problem.bc()
    }

    pub fn bc_mut(&mut self) -> &mut BoundaryConditionList {
        self.problem.bc_mut()
    }

    /// Committed displacement.
    pub fn u(&self) -> &DVector<f64> {
        &self.u
    }

    /// Trial correction of the current increment.
    pub fn du(&self) -> &DVector<f64> {
        &self.du
    }

    /// Time range used to normalize boundary condition time functions.
    pub fn set_time_range(&mut self, t0: f64, tmax: f64) {
        self.t0 = t0;
        self.tmax = tmax;
    }

    /// `(sub-iteration, error)` of each residual evaluation of the last increment.
    pub fn increment_history(&self) -> &[(usize, f64)] {
        &self.history
    }

    pub fn initialize(&mut self, t0: f64) -> eyre::Result<()> {
        self.assembly.initialize(t0)?;
        self.initialized = true;
        Ok(())
    }

    fn time_factor(&self, time: f64) -> f64 {
        (time - self.t0) / (self.tmax - self.t0)
    }

    fn update_a(&mut self) -> eyre::Result<()> {
        let a = self.assembly.global_matrix()?.clone();
        self.problem.set_a(SystemMatrix::Sparse(a));
        Ok(())
    }

    fn update_d(&mut self) -> eyre::Result<()> {
        let d = self.assembly.global_vector()?.clone();
        self.problem.set_d(d);
        Ok(())
    }

    /// Commits a pending correction and starts a new increment of length `dt`.
    pub fn set_start(&mut self, dt: f64) -> eyre::Result<()> {
        if self.du.iter().any(|&v| v != 0.0) {
            self.u += &self.du;
            self.du.fill(0.0);
        }
        self.reference_error = self.settings.reference_error;
        self.assembly.set_start(dt)
    }

    /// Discards the current increment.
    pub fn to_start(&mut self) -> eyre::Result<()> {
        self.du.fill(0.0);
        self.reference_error = self.settings.reference_error;
        self.assembly.to_start()
    }

    /// Returns to the initial state.
    pub fn reset(&mut self) -> eyre::Result<()> {
        self.assembly.reset()?;
        self.u.fill(0.0);
        self.du.fill(0.0);
        self.problem.bc_mut().clear_current_start();
        self.reference_error = self.settings.reference_error;
        self.initialized = false;
        Ok(())
    }

    /// First solve of an increment with the tangent at its start and the new boundary values.
    pub fn elastic_prediction(&mut self, time_start: f64, dt: f64) -> eyre::Result<()> {
        let t_fact = self.time_factor(time_start + dt);
        let t_fact_old = self.time_factor(time_start);
        self.problem
            .apply_boundary_conditions(t_fact, Some(t_fact_old))?;
        self.update_a()?;
        self.update_d()?;
        self.problem.solve()?;
        // Only the prediction carries the prescribed increment.
        self.problem.clear_prescribed_values();
        self.du += self.problem.x();
        self.reference_error = self.settings.reference_error;
        Ok(())
    }

    /// Solves the linearized system for a correction and adds it to `dU`.
    pub fn newton_raphson_increment(&mut self) -> eyre::Result<()> {
        self.problem.solve()?;
        self.du += self.problem.x();
        Ok(())
    }

    /// Updates the weak form from `U + dU` and refreshes the requested parts of the system.
    pub fn update(&mut self, dt: f64, compute: Compute, update_weak_form: bool) -> eyre::Result<()> {
        if update_weak_form {
            let trial = &self.u + &self.du;
            self.assembly.update(&trial, dt, compute)?;
        } else {
            self.assembly.assemble_global_mat(compute)?;
        }
        if compute.matrix() {
            self.update_a()?;
        }
        if compute.vector() {
            self.update_d()?;
        }
        Ok(())
    }

    /// Error of the current iterate according to the convergence criterion.
    ///
    /// The first evaluation after a prediction defines the reference of the increment.
    pub fn newton_raphson_error(&mut self) -> eyre::Result<f64> {
        let reduction = self.problem.reduction()?;
        let free = &reduction.free;
        let max_abs = |v: &DVector<f64>| v.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        let nonzero = |r: f64| if r == 0.0 { 1.0 } else { r };

        let value = match self.settings.criterion {
            ConvergenceCriterion::Displacement => {
                if self.reference_error.is_none() {
                    let total = &self.u + &self.du;
                    self.reference_error = Some(nonzero(max_abs(&gather(&total, free))));
                }
                max_abs(&gather(self.problem.x(), free))
            }
            ConvergenceCriterion::Force => max_abs(&self.problem.reduced_residual()?),
            ConvergenceCriterion::Work => {
                let residual = self.problem.reduced_residual()?;
                let x_free = self.problem.x_free();
                if x_free.len() == residual.len() {
                    max_abs(&x_free.component_mul(&residual))
                } else {
                    0.0
                }
            }
        };
        let reference = *self.reference_error.get_or_insert(nonzero(value));
        Ok(value / reference)
    }

    /// Runs the Newton-Raphson procedure for the increment `[time_start, time_start + dt]`.
    ///
    /// On failure the trial state is left as is; call [`NonLinearProblem::to_start`] to discard it.
    pub fn solve_time_increment(&mut self, time_start: f64, dt: f64) -> eyre::Result<IncrementOutcome> {
        self.history.clear();
        let mut step = NewtonStep::ElasticPrediction;
        loop {
            step = match step {
                NewtonStep::ElasticPrediction => {
                    self.elastic_prediction(time_start, dt)?;
                    NewtonStep::ResidualCheck { subiteration: 0 }
                }
                NewtonStep::ResidualCheck { subiteration } => {
                    self.update(dt, Compute::Vector, true)?;
                    let error = self.newton_raphson_error()?;
                    self.history.push((subiteration, error));
                    debug!("Sub-iteration {subiteration}: error {error:e}");
                    if error < self.settings.tolerance {
                        NewtonStep::Converged { subiteration, error }
                    } else if subiteration + 1 >= self.settings.max_subiterations {
                        NewtonStep::Rejected { error }
                    } else {
                        NewtonStep::TangentUpdate { subiteration }
                    }
                }
                NewtonStep::TangentUpdate { subiteration } => {
                    self.update(dt, Compute::Matrix, false)?;
                    self.newton_raphson_increment()?;
                    NewtonStep::ResidualCheck {
                        subiteration: subiteration + 1,
                    }
                }
                NewtonStep::Converged { subiteration, error } => {
                    return Ok(IncrementOutcome {
                        converged: true,
                        subiterations: subiteration,
                        error,
                    })
                }
                NewtonStep::Rejected { error } => {
                    return Ok(IncrementOutcome {
                        converged: false,
                        subiterations: self.settings.max_subiterations,
                        error,
                    })
                }
            }
        }
    }

    /// Solves the problem from `t0` to `tmax` with adaptive time stepping.
    ///
    /// After an increment converging in fewer than two corrections the time step grows by 25%;
    /// after a rejected increment it shrinks to a quarter. A time step below `dt_min` is fatal.
    pub fn nlsolve(&mut self, options: &NlSolveOptions) -> eyre::Result<NlSolveReport> {
        validate(options)?;
        self.set_time_range(options.t0, options.tmax);
        if !self.initialized {
            self.initialize(options.t0)?;
        }
        // A new load step continues from the state reached by the previous one.
        if self.u.iter().any(|&v| v != 0.0) {
            self.problem.set_bc_start_to_current(&self.u)?;
        }

        let mut report = NlSolveReport::default();
        let mut time = options.t0;
        let mut dt = options.dt;
        let mut increment = 0;
        let mut next_output = match options.output {
            Some(OutputInterval::Time(interval)) => (options.t0 + interval).min(options.tmax),
            _ => options.tmax,
        };

        self.set_start(dt)?;
        while time < options.tmax - TIME_EPSILON {
            let (current_dt, clipped) = if time + dt > next_output - TIME_EPSILON {
                (next_output - time, true)
            } else {
                (dt, false)
            };

            let outcome = self.solve_time_increment(time, current_dt)?;
            report
                .history
                .extend(self.history.iter().map(|&(sub, error)| (increment + 1, sub, error)));

            if outcome.converged {
                time += current_dt;
                increment += 1;
                report.converged_increments += 1;
                self.set_start(current_dt)?;
                info!(
                    "Iter {increment} - Time: {time:.5} - dt {current_dt:.5} - NR iter: {} - Err: {:.5}",
                    outcome.subiterations, outcome.error
                );

                if options.update_dt && outcome.subiterations < 2 && !clipped {
                    dt *= 1.25;
                }
                match options.output {
                    Some(OutputInterval::Time(interval)) => {
                        if (time - next_output).abs() < TIME_EPSILON {
                            report.snapshots.push(self.snapshot(time, increment));
                            next_output = (next_output + interval).min(options.tmax);
                        }
                    }
                    Some(OutputInterval::Iterations(n)) => {
                        if n > 0 && increment % n == 0 {
                            report.snapshots.push(self.snapshot(time, increment));
                        }
                    }
                    None => {}
                }
            } else {
                report.rejected_increments += 1;
                if !options.update_dt {
                    return Err(NonConvergenceError::SubiterationsExhausted {
                        time,
                        dt: current_dt,
                        error: outcome.error,
                    }
                    .into());
                }
                dt = current_dt * 0.25;
                warn!("No convergence at t = {time:.5} (error {:e}), reducing time step to {dt:e}", outcome.error);
                if dt < options.dt_min {
                    return Err(NonConvergenceError::TimeStepBelowMinimum {
                        time,
                        dt,
                        dt_min: options.dt_min,
                    }
                    .into());
                }
                self.to_start()?;
            }
        }

        let last_recorded = report.snapshots.last().map(|s| s.time);
        if last_recorded.map_or(true, |t| (t - time).abs() >= TIME_EPSILON) {
            report.snapshots.push(self.snapshot(time, increment));
        }
        report.final_time = time;
        Ok(report)
    }

    fn snapshot(&self, time: f64, increment: usize) -> Snapshot {
        Snapshot {
            time,
            increment,
            dof: self.u.clone(),
        }
    }

    pub fn dof_solution(&self, variable: &str) -> eyre::Result<DVector<f64>> {
        let rank = self.problem.space().variable_rank(variable)?;
        let n = self.problem.mesh().n_nodes();
        Ok(self.u.rows(rank * n, n).into_owned())
    }

    pub fn disp(&self) -> eyre::Result<DMatrix<f64>> {
        let names = self.problem.space().expand_variable("Disp")?;
        let columns = names
            .iter()
            .map(|name| self.dof_solution(name))
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(DMatrix::from_columns(&columns))
    }

    /// Forces of the weak form in the current state, `-D`.
    pub fn ext_forces(&mut self) -> eyre::Result<DVector<f64>> {
        let vector: &DVector<f64> = self.assembly.global_vector()?;
        Ok(-vector)
    }
}

fn validate(options: &NlSolveOptions) -> eyre::Result<()> {
    let invalid = |message: &str| -> eyre::Result<()> {
        Err(ConfigurationError::InvalidSetting(message.to_string()).into())
    };
    if !(options.tmax > options.t0) {
        return invalid("tmax must be greater than t0");
    }
    if !(options.dt > 0.0) || !(options.dt_min > 0.0) {
        return invalid("time steps must be positive");
    }
    if let Some(OutputInterval::Time(interval)) = options.output {
        if !(interval > 0.0) {
            return invalid("the output interval must be positive");
        }
    }
    Ok(())
}
