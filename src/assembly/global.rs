use crate::assembly::block::BlockAccumulator;
use crate::assembly::cache::{DataLocation, ElementOperators, SharedOperatorCache};
use crate::assembly::{AssemblyOptions, Compute, Discretization, GlobalAssembly};
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::operator::{DiffOp, Term, TermKind};
use crate::space::ModelingSpace;
use crate::weakform::WeakForm;
use itertools::Itertools;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;
use weakfem_sparse::sparse::scale_rows;

/// Assembly of a single weak form over a single mesh.
pub struct Assembly {
    name: String,
    weak_form: Box<dyn WeakForm>,
    discretization: Discretization,
    options: AssemblyOptions,
    global_matrix: Option<CsrMatrix<f64>>,
    global_vector: Option<DVector<f64>>,
    // Node coordinates before any displacement and at the start of the current increment.
    reference_nodes: Option<DMatrix<f64>>,
    start_nodes: Option<DMatrix<f64>>,
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly")
            .field("name", &self.name)
            .field("weak_form", &self.weak_form.name())
            .field("discretization", &self.discretization)
            .field("options", &self.options)
            .finish()
    }
}

impl Assembly {
    /// Creates an assembly with the options preferred by the weak form.
    pub fn new(
        name: &str,
        weak_form: impl WeakForm + 'static,
        mesh: Arc<Mesh>,
        space: Arc<ModelingSpace>,
        cache: SharedOperatorCache,
    ) -> Self {
        let options = weak_form.assembly_options();
        Self::with_options(name, weak_form, mesh, space, cache, options)
    }

    pub fn with_options(
        name: &str,
        weak_form: impl WeakForm + 'static,
        mesh: Arc<Mesh>,
        space: Arc<ModelingSpace>,
        cache: SharedOperatorCache,
        options: AssemblyOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            weak_form: Box::new(weak_form),
            discretization: Discretization::new(space, mesh, options.n_gauss, cache),
            options,
            global_matrix: None,
            global_vector: None,
            reference_nodes: None,
            start_nodes: None,
        }
    }

    pub fn options(&self) -> &AssemblyOptions {
        &self.options
    }

    pub fn discretization(&self) -> &Discretization {
        &self.discretization
    }

    pub fn weak_form(&self) -> &dyn WeakForm {
        self.weak_form.as_ref()
    }

    pub fn weak_form_mut(&mut self) -> &mut dyn WeakForm {
        self.weak_form.as_mut()
    }

    /// Evaluates a real-only operator at the integration points.
    pub fn gauss_point_results(&self, op: &DiffOp, dof: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        self.discretization.evaluate(op, dof)
    }

    /// Element means of a real-only operator.
    pub fn element_results(&self, op: &DiffOp, dof: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let values = self.gauss_point_results(op, dof)?;
        self.discretization
            .convert_data(&values, DataLocation::GaussPoint, DataLocation::Element)
    }

    /// A real-only operator extrapolated to the nodes.
    pub fn node_results(&self, op: &DiffOp, dof: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let values = self.gauss_point_results(op, dof)?;
        self.discretization
            .convert_data(&values, DataLocation::GaussPoint, DataLocation::Node)
    }

    /// Places the mesh nodes at their reference position plus the `Disp` components of `dof`.
    ///
    /// The mesh generation changes, so element operators are rebuilt on the next assembly. A mesh
    /// shared with other owners is copied first.
    pub fn set_disp(&mut self, dof: &DVector<f64>) -> eyre::Result<()> {
        let space = self.discretization.space().clone();
        let ranks = space
            .vector("Disp")
            .ok_or_else(|| ConfigurationError::UnknownVector("Disp".to_string()))?;
        let n_dof = self.discretization.n_dof();
        if dof.len() != n_dof {
            return Err(ConfigurationError::DimensionMismatch {
                context: format!("displacement of assembly '{}'", self.name),
                expected: n_dof,
                actual: dof.len(),
            }
            .into());
        }
        let reference = self.reference_nodes().clone();
        let n = reference.nrows();
        let nodes = DMatrix::from_fn(n, reference.ncols(), |i, j| {
            reference[(i, j)] + ranks.get(j).map_or(0.0, |&rank| dof[rank * n + i])
        });
        self.discretization.mesh_mut().set_nodes(nodes)?;
        self.delete_global_mat();
        Ok(())
    }

    fn reference_nodes(&mut self) -> &DMatrix<f64> {
        let mesh = self.discretization.mesh();
        self.reference_nodes.get_or_insert_with(|| mesh.nodes().clone())
    }

    fn restore_nodes(&mut self, nodes: DMatrix<f64>) -> eyre::Result<()> {
        if self.discretization.mesh().nodes() != &nodes {
            self.discretization.mesh_mut().set_nodes(nodes)?;
        }
        Ok(())
    }

    /// Integrates point values over the mesh.
    pub fn integrate_field(&self, values: &DVector<f64>) -> eyre::Result<f64> {
        self.discretization.integrate(values)
    }

    /// Sum of the coefficients of terms sharing the same operators, at the Gauss points.
    fn weights_at_points<'a>(
        &self,
        terms: impl Iterator<Item = &'a &'a Term>,
        operators: &ElementOperators,
    ) -> eyre::Result<DVector<f64>> {
        let mut sum = DVector::zeros(operators.n_points());
        for term in terms {
            sum += operators.coefficient_at_points(&term.coefficient)?;
        }
        Ok(sum)
    }

    fn assemble_matrix(&self, terms: &[&Term], operators: &ElementOperators) -> eyre::Result<CsrMatrix<f64>> {
        let nvar = self.discretization.space().nvar();
        let mut accumulator = BlockAccumulator::new(nvar, operators.n_columns());
        let quadrature = operators.quadrature();

        // Terms are sorted by virtual operator, so the transposed virtual blocks are shared
        // by every term of a group.
        for (vir, group) in &terms.iter().group_by(|term| term.vir) {
            let vir = vir.expect("Must succeed since bilinear terms have a virtual operator");
            let vir_blocks = self.discretization.elementary(operators, &vir)?;
            let vir_transposed: Vec<_> = vir_blocks.iter().map(|b| b.matrix.transpose()).collect();

            // Terms left unmerged by `sort` (fields at different locations) share their
            // operators and are summed once located at the Gauss points.
            for (real, same_real) in &group.group_by(|term| term.real) {
                let real = real.expect("Must succeed since bilinear terms have a real operator");
                if self.options.assume_sym && real.variable < vir.variable {
                    continue;
                }
                let mirror = self.options.assume_sym && real.variable > vir.variable;
                let weights = self
                    .weights_at_points(same_real, operators)?
                    .component_mul(quadrature);
                for real_block in self.discretization.elementary(operators, &real)? {
                    let mut weighted = real_block.matrix.clone();
                    scale_rows(&mut weighted, &weights);
                    for (vir_block, transposed) in vir_blocks.iter().zip(&vir_transposed) {
                        let mut product = transposed * &weighted;
                        let factor = vir_block.factor * real_block.factor;
                        if factor != 1.0 {
                            product *= factor;
                        }
                        accumulator.add(
                            vir_block.variable,
                            real_block.variable,
                            &product,
                            self.options.lumped,
                            mirror,
                        );
                    }
                }
            }
        }
        Ok(accumulator.into_csr())
    }

    fn assemble_vector(&self, terms: &[&Term], operators: &ElementOperators) -> eyre::Result<DVector<f64>> {
        let nvar = self.discretization.space().nvar();
        let n_columns = operators.n_columns();
        let mut vector = DVector::zeros(nvar * n_columns);
        for (vir, same_vir) in &terms.iter().group_by(|term| term.vir) {
            let vir = vir.expect("Must succeed since load terms have a virtual operator");
            let weights = self
                .weights_at_points(same_vir, operators)?
                .component_mul(operators.quadrature());
            for block in self.discretization.elementary(operators, &vir)? {
                let contribution = &block.matrix.transpose() * &weights;
                let mut rows = vector.rows_mut(block.variable * n_columns, n_columns);
                rows.axpy(-block.factor, &contribution, 1.0);
            }
        }
        Ok(vector)
    }
}

impl GlobalAssembly for Assembly {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Arc<ModelingSpace> {
        self.discretization.space()
    }

    fn mesh(&self) -> &Arc<Mesh> {
        self.discretization.mesh()
    }

    fn assemble_global_mat(&mut self, compute: Compute) -> eyre::Result<()> {
        if compute == Compute::None {
            return Ok(());
        }
        let op = self
            .weak_form
            .differential_operator(&self.discretization)?
            .sorted();
        if let Some(term) = op.terms().iter().find(|t| t.kind() == TermKind::RealOnly) {
            let variable = term
                .real
                .map(|r| self.discretization.space().variable_name(r.variable).to_string())
                .unwrap_or_else(|| "constant".to_string());
            return Err(ConfigurationError::MissingVirtualOperator { variable }.into());
        }
        let operators = self.discretization.operators()?;
        let basis = self.discretization.change_of_basis(&operators)?;
        debug!(
            "Assembling '{}' ({} terms, {} points, compute {:?})",
            self.name,
            op.len(),
            operators.n_points(),
            compute
        );

        if compute.matrix() {
            let bilinear: Vec<_> = op.terms().iter().filter(|t| t.kind() == TermKind::Bilinear).collect();
            let matrix = self.assemble_matrix(&bilinear, &operators)?;
            self.global_matrix = Some(match &basis {
                Some(p) => {
                    let pt = p.transpose();
                    &(&pt * &matrix) * p.as_ref()
                }
                None => matrix,
            });
        }
        if compute.vector() {
            let load: Vec<_> = op.terms().iter().filter(|t| t.kind() == TermKind::Load).collect();
            let vector = self.assemble_vector(&load, &operators)?;
            self.global_vector = Some(match &basis {
                Some(p) => &p.transpose() * &vector,
                None => vector,
            });
        }
        Ok(())
    }

    fn global_matrix(&mut self) -> eyre::Result<&CsrMatrix<f64>> {
        if self.global_matrix.is_none() {
            self.assemble_global_mat(Compute::Matrix)?;
        }
        self.global_matrix
            .as_ref()
            .ok_or_else(|| eyre::eyre!("assembly '{}' has no global matrix", self.name))
    }

    fn global_vector(&mut self) -> eyre::Result<&DVector<f64>> {
        if self.global_vector.is_none() {
            self.assemble_global_mat(Compute::Vector)?;
        }
        self.global_vector
            .as_ref()
            .ok_or_else(|| eyre::eyre!("assembly '{}' has no global vector", self.name))
    }

    fn delete_global_mat(&mut self) {
        self.global_matrix = None;
        self.global_vector = None;
    }

    fn initialize(&mut self, t0: f64) -> eyre::Result<()> {
        let n_points = self.discretization.n_points()?;
        if let Some(law) = self.weak_form.constitutive_law_mut() {
            law.initialize(n_points)?;
        }
        self.weak_form.initialize(&self.discretization, t0)?;
        self.delete_global_mat();
        Ok(())
    }

    fn set_start(&mut self, dt: f64) -> eyre::Result<()> {
        if let Some(law) = self.weak_form.constitutive_law_mut() {
            law.set_start();
        }
        self.weak_form.set_start(&self.discretization, dt)?;
        if self.options.updated_lagrangian {
            self.reference_nodes();
            self.start_nodes = Some(self.discretization.mesh().nodes().clone());
        }
        self.assemble_global_mat(Compute::All)
    }

    fn update(&mut self, dof: &DVector<f64>, dt: f64, compute: Compute) -> eyre::Result<()> {
        if self.options.updated_lagrangian {
            self.set_disp(dof)?;
        }
        self.weak_form.update(&self.discretization, dof, dt)?;
        self.delete_global_mat();
        self.assemble_global_mat(compute)
    }

    fn to_start(&mut self) -> eyre::Result<()> {
        if let Some(law) = self.weak_form.constitutive_law_mut() {
            law.to_start();
        }
        self.weak_form.to_start();
        if let Some(nodes) = self.start_nodes.clone().or_else(|| self.reference_nodes.clone()) {
            self.restore_nodes(nodes)?;
        }
        self.delete_global_mat();
        Ok(())
    }

    fn reset(&mut self) -> eyre::Result<()> {
        if let Some(law) = self.weak_form.constitutive_law_mut() {
            law.reset();
        }
        self.weak_form.reset();
        self.start_nodes = None;
        if let Some(nodes) = self.reference_nodes.take() {
            self.restore_nodes(nodes)?;
        }
        self.delete_global_mat();
        Ok(())
    }
}
