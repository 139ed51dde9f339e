use crate::element::ElementType;
use crate::error::ConfigurationError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub mod procedural;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a mesh, used to key cached element operators.
///
/// Every constructed or cloned mesh receives a new id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Nodes and single-type element connectivity.
///
/// Node coordinates are stored row-wise in an `n_nodes x ndim` matrix. Any change to the node
/// coordinates increments the mesh generation, which invalidates cached element operators.
#[derive(Debug, Serialize, Deserialize)]
pub struct Mesh {
    nodes: DMatrix<f64>,
    connectivity: Vec<usize>,
    element_type: ElementType,
    coordinate_names: Vec<String>,
    node_sets: BTreeMap<String, Vec<usize>>,
    element_sets: BTreeMap<String, Vec<usize>>,
    #[serde(skip, default = "MeshId::next")]
    id: MeshId,
    #[serde(skip)]
    generation: u64,
    // Dropped together with the mesh, so caches can tell which of their meshes still exist.
    #[serde(skip)]
    alive: Arc<()>,
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            connectivity: self.connectivity.clone(),
            element_type: self.element_type,
            coordinate_names: self.coordinate_names.clone(),
            node_sets: self.node_sets.clone(),
            element_sets: self.element_sets.clone(),
            id: MeshId::next(),
            generation: 0,
            alive: Arc::new(()),
        }
    }
}

impl Mesh {
    /// Construct a mesh from row-wise node coordinates and flat element connectivity.
    ///
    /// Coordinate names default to `X`, `Y`, `Z` truncated to the node dimension.
    pub fn from_nodes_and_connectivity(
        nodes: DMatrix<f64>,
        connectivity: Vec<usize>,
        element_type: ElementType,
    ) -> eyre::Result<Self> {
        let names = ["X", "Y", "Z"]
            .iter()
            .take(nodes.ncols())
            .map(|s| s.to_string())
            .collect();
        Self::with_coordinate_names(nodes, connectivity, element_type, names)
    }

    pub fn with_coordinate_names(
        nodes: DMatrix<f64>,
        connectivity: Vec<usize>,
        element_type: ElementType,
        coordinate_names: Vec<String>,
    ) -> eyre::Result<Self> {
        let npe = element_type.nodes_per_element();
        if connectivity.len() % npe != 0 {
            return Err(ConfigurationError::DimensionMismatch {
                context: format!("connectivity of {} elements", element_type.name()),
                expected: (connectivity.len() / npe + 1) * npe,
                actual: connectivity.len(),
            }
            .into());
        }
        if coordinate_names.len() != nodes.ncols() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "coordinate names".to_string(),
                expected: nodes.ncols(),
                actual: coordinate_names.len(),
            }
            .into());
        }
        if let Some(&node) = connectivity.iter().find(|&&n| n >= nodes.nrows()) {
            return Err(ConfigurationError::NodeIndexOutOfBounds {
                node,
                n_nodes: nodes.nrows(),
            }
            .into());
        }
        Ok(Self {
            nodes,
            connectivity,
            element_type,
            coordinate_names,
            node_sets: BTreeMap::new(),
            element_sets: BTreeMap::new(),
            id: MeshId::next(),
            generation: 0,
            alive: Arc::new(()),
        })
    }

    /// A mesh of `Node` elements, one per node.
    pub fn point_cloud(nodes: DMatrix<f64>) -> eyre::Result<Self> {
        let connectivity = (0..nodes.nrows()).collect();
        Self::from_nodes_and_connectivity(nodes, connectivity, ElementType::Node)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A handle that stops upgrading once this mesh is dropped.
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn ndim(&self) -> usize {
        self.nodes.ncols()
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn n_elements(&self) -> usize {
        self.connectivity.len() / self.element_type.nodes_per_element()
    }

    pub fn nodes(&self) -> &DMatrix<f64> {
        &self.nodes
    }

    pub fn coordinate_names(&self) -> &[String] {
        &self.coordinate_names
    }

    /// Index of a coordinate name among the mesh coordinates.
    pub fn coordinate_index(&self, name: &str) -> Option<usize> {
        self.coordinate_names.iter().position(|n| n == name)
    }

    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    pub fn element(&self, index: usize) -> &[usize] {
        let npe = self.element_type.nodes_per_element();
        &self.connectivity[npe * index..npe * (index + 1)]
    }

    pub fn elements(&self) -> impl Iterator<Item = &[usize]> {
        self.connectivity
            .chunks_exact(self.element_type.nodes_per_element())
    }

    /// Replaces the node coordinates. The number of nodes and the dimension must be preserved.
    pub fn set_nodes(&mut self, nodes: DMatrix<f64>) -> eyre::Result<()> {
        if nodes.shape() != self.nodes.shape() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "node coordinates".to_string(),
                expected: self.nodes.len(),
                actual: nodes.len(),
            }
            .into());
        }
        self.nodes = nodes;
        self.generation += 1;
        Ok(())
    }

    /// Moves every node by the same offset.
    pub fn translate_nodes(&mut self, offset: &[f64]) -> eyre::Result<()> {
        if offset.len() != self.ndim() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "translation".to_string(),
                expected: self.ndim(),
                actual: offset.len(),
            }
            .into());
        }
        for (j, shift) in offset.iter().enumerate() {
            self.nodes.column_mut(j).add_scalar_mut(*shift);
        }
        self.generation += 1;
        Ok(())
    }

    /// Moves the nodes by a displacement field stored variable-major (`[u_x..., u_y..., ...]`).
    pub fn displace_nodes(&mut self, displacement: &DVector<f64>) -> eyre::Result<()> {
        let n = self.n_nodes();
        if displacement.len() < n * self.ndim() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "node displacement".to_string(),
                expected: n * self.ndim(),
                actual: displacement.len(),
            }
            .into());
        }
        for j in 0..self.ndim() {
            for i in 0..n {
                self.nodes[(i, j)] += displacement[j * n + i];
            }
        }
        self.generation += 1;
        Ok(())
    }

    /// Appends nodes that belong to no element and returns their indices.
    ///
    /// Such nodes carry extra global unknowns, e.g. the macroscopic strain of a periodic cell.
    pub fn add_nodes(&mut self, coordinates: &DMatrix<f64>) -> eyre::Result<Vec<usize>> {
        if coordinates.ncols() != self.ndim() {
            return Err(ConfigurationError::DimensionMismatch {
                context: "added node coordinates".to_string(),
                expected: self.ndim(),
                actual: coordinates.ncols(),
            }
            .into());
        }
        let first = self.n_nodes();
        let mut nodes = DMatrix::zeros(first + coordinates.nrows(), self.ndim());
        nodes.rows_mut(0, first).copy_from(&self.nodes);
        nodes
            .rows_mut(first, coordinates.nrows())
            .copy_from(coordinates);
        self.nodes = nodes;
        self.generation += 1;
        Ok((first..self.n_nodes()).collect())
    }

    pub fn add_node_set(&mut self, name: &str, nodes: Vec<usize>) -> eyre::Result<()> {
        if let Some(&node) = nodes.iter().find(|&&n| n >= self.n_nodes()) {
            return Err(ConfigurationError::NodeIndexOutOfBounds {
                node,
                n_nodes: self.n_nodes(),
            }
            .into());
        }
        self.node_sets.insert(name.to_string(), nodes);
        Ok(())
    }

    pub fn add_element_set(&mut self, name: &str, elements: Vec<usize>) {
        self.element_sets.insert(name.to_string(), elements);
    }

    pub fn node_set(&self, name: &str) -> eyre::Result<&[usize]> {
        self.node_sets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigurationError::UnknownNodeSet(name.to_string()).into())
    }

    pub fn element_set(&self, name: &str) -> Option<&[usize]> {
        self.element_sets.get(name).map(Vec::as_slice)
    }

    pub fn node_sets(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.node_sets
    }

    /// Nodes whose coordinate `axis` lies within `tol` of `value`, in increasing order.
    pub fn find_nodes(&self, axis: usize, value: f64, tol: f64) -> Vec<usize> {
        (0..self.n_nodes())
            .filter(|&i| (self.nodes[(i, axis)] - value).abs() <= tol)
            .collect()
    }

    /// Minimum and maximum node coordinates.
    pub fn bounding_box(&self) -> (DVector<f64>, DVector<f64>) {
        let ndim = self.ndim();
        let min = DVector::from_fn(ndim, |j, _| self.nodes.column(j).min());
        let max = DVector::from_fn(ndim, |j, _| self.nodes.column(j).max());
        (min, max)
    }

    /// Number of elements referencing each node.
    pub fn elements_per_node(&self) -> Vec<usize> {
        let mut count = vec![0; self.n_nodes()];
        for &node in &self.connectivity {
            count[node] += 1;
        }
        count
    }

    /// Nodes referenced by at least one element, in increasing order.
    pub fn active_nodes(&self) -> Vec<usize> {
        self.elements_per_node()
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(i, _)| i)
            .collect()
    }
}
