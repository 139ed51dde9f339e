use crate::assembly::{Compute, GlobalAssembly};
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::space::ModelingSpace;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Sum of several assemblies sharing the same space and node count.
///
/// Meshes may differ (e.g. a solid mesh and a point mesh of virtual nodes) as long as they have
/// the same number of nodes.
pub struct AssemblySum {
    name: String,
    assemblies: Vec<Box<dyn GlobalAssembly>>,
    global_matrix: Option<CsrMatrix<f64>>,
    global_vector: Option<DVector<f64>>,
}

impl AssemblySum {
    pub fn new(name: &str, assemblies: Vec<Box<dyn GlobalAssembly>>) -> eyre::Result<Self> {
        let first = assemblies
            .first()
            .ok_or_else(|| ConfigurationError::InvalidSetting("an assembly sum needs at least one assembly".to_string()))?;
        let n_dof = first.n_dof();
        if let Some(other) = assemblies.iter().find(|a| a.n_dof() != n_dof) {
            return Err(ConfigurationError::DimensionMismatch {
                context: format!("dofs of assembly '{}'", other.name()),
                expected: n_dof,
                actual: other.n_dof(),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            assemblies,
            global_matrix: None,
            global_vector: None,
        })
    }

    pub fn assemblies(&self) -> &[Box<dyn GlobalAssembly>] {
        &self.assemblies
    }

    pub fn assemblies_mut(&mut self) -> &mut [Box<dyn GlobalAssembly>] {
        &mut self.assemblies
    }

    fn sum_parts(&mut self, compute: Compute) -> eyre::Result<()> {
        let n = self.n_dof();
        if compute.matrix() {
            let mut sum = CsrMatrix::zeros(n, n);
            for assembly in &mut self.assemblies {
                sum = &sum + assembly.global_matrix()?;
            }
            self.global_matrix = Some(sum);
        }
        if compute.vector() {
            let mut sum = DVector::zeros(n);
            for assembly in &mut self.assemblies {
                sum += assembly.global_vector()?;
            }
            self.global_vector = Some(sum);
        }
        Ok(())
    }
}

impl GlobalAssembly for AssemblySum {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Arc<ModelingSpace> {
        self.assemblies[0].space()
    }

    fn mesh(&self) -> &Arc<Mesh> {
        self.assemblies[0].mesh()
    }

    fn assemble_global_mat(&mut self, compute: Compute) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.assemble_global_mat(compute)?;
        }
        self.sum_parts(compute)
    }

    fn global_matrix(&mut self) -> eyre::Result<&CsrMatrix<f64>> {
        if self.global_matrix.is_none() {
            self.sum_parts(Compute::Matrix)?;
        }
        self.global_matrix
            .as_ref()
            .ok_or_else(|| eyre::eyre!("assembly '{}' has no global matrix", self.name))
    }

    fn global_vector(&mut self) -> eyre::Result<&DVector<f64>> {
        if self.global_vector.is_none() {
            self.sum_parts(Compute::Vector)?;
        }
        self.global_vector
            .as_ref()
            .ok_or_else(|| eyre::eyre!("assembly '{}' has no global vector", self.name))
    }

    fn delete_global_mat(&mut self) {
        for assembly in &mut self.assemblies {
            assembly.delete_global_mat();
        }
        self.global_matrix = None;
        self.global_vector = None;
    }

    fn initialize(&mut self, t0: f64) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.initialize(t0)?;
        }
        self.global_matrix = None;
        self.global_vector = None;
        Ok(())
    }

    fn set_start(&mut self, dt: f64) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.set_start(dt)?;
        }
        self.sum_parts(Compute::All)
    }

    fn update(&mut self, dof: &DVector<f64>, dt: f64, compute: Compute) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.update(dof, dt, compute)?;
        }
        self.global_matrix = None;
        self.global_vector = None;
        if compute != Compute::None {
            self.sum_parts(compute)?;
        }
        Ok(())
    }

    fn to_start(&mut self) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.to_start()?;
        }
        self.global_matrix = None;
        self.global_vector = None;
        Ok(())
    }

    fn reset(&mut self) -> eyre::Result<()> {
        for assembly in &mut self.assemblies {
            assembly.reset()?;
        }
        self.global_matrix = None;
        self.global_vector = None;
        Ok(())
    }
}
