//! Per-mesh cache of elementary operators.
//!
//! Building the Gauss-point operators of a mesh is the expensive part of assembly, so they are
//! computed once per (mesh, element type, Gauss point count) and shared by every assembly that
//! uses the same discretization. Entries remember the mesh generation they were built from and
//! are rebuilt when the mesh has been modified since.
use crate::element::{line_local_frame, ElementType, GeometricMap, HermiteBasis, Interpolation};
use crate::error::ConfigurationError;
use crate::mesh::{Mesh, MeshId};
use crate::operator::Coefficient;
use crate::space::ModelingSpace;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Weak;

/// Cache handle shared by all assemblies of a context.
pub type SharedOperatorCache = Rc<RefCell<OperatorCache>>;

pub fn new_shared_cache() -> SharedOperatorCache {
    Rc::new(RefCell::new(OperatorCache::default()))
}

/// Where the values of a field live.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataLocation {
    Node,
    Element,
    GaussPoint,
}

/// Which evaluation of an interpolation an operator holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperatorSlot {
    Value,
    /// First derivative along the given physical direction of the mesh.
    Derivative(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    mesh: MeshId,
    element: ElementType,
    n_gauss: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BasisKey {
    entry: EntryKey,
    generation: u64,
    nvar: usize,
    vectors: Vec<Vec<usize>>,
}

#[derive(Debug)]
struct CacheEntry {
    mesh: Weak<()>,
    operators: Rc<ElementOperators>,
}

/// Element operators and change-of-basis matrices keyed by mesh.
///
/// Entries of dropped meshes are evicted on the next miss, and a rebuilt entry evicts the
/// change-of-basis matrices of the previous mesh generation.
#[derive(Debug, Default)]
pub struct OperatorCache {
    entries: FxHashMap<EntryKey, CacheEntry>,
    bases: FxHashMap<BasisKey, Rc<CsrMatrix<f64>>>,
}

impl OperatorCache {
    /// Operators of `mesh` with `n_gauss` points per element, computed on first use.
    pub fn element_operators(&mut self, mesh: &Mesh, n_gauss: usize) -> eyre::Result<Rc<ElementOperators>> {
        let key = EntryKey {
            mesh: mesh.id(),
            element: mesh.element_type(),
            n_gauss,
        };
        if let Some(entry) = self.entries.get(&key) {
            if entry.operators.generation == mesh.generation() {
                return Ok(Rc::clone(&entry.operators));
            }
            debug!("Mesh {:?} changed since its operators were computed, rebuilding", mesh.id());
            let generation = mesh.generation();
            self.bases
                .retain(|basis, _| basis.entry != key || basis.generation == generation);
        }
        self.evict_dropped_meshes();
        debug!(
            "Computing {} operators with {} Gauss points for {} elements",
            mesh.element_type().name(),
            n_gauss,
            mesh.n_elements()
        );
        let operators = Rc::new(ElementOperators::compute(mesh, n_gauss)?);
        self.entries.insert(
            key,
            CacheEntry {
                mesh: mesh.liveness(),
                operators: Rc::clone(&operators),
            },
        );
        Ok(operators)
    }

    /// Matrix rotating global nodal dofs into the element-local dofs of `operators`.
    pub fn change_of_basis(
        &mut self,
        mesh: &Mesh,
        space: &ModelingSpace,
        operators: &ElementOperators,
    ) -> eyre::Result<Rc<CsrMatrix<f64>>> {
        let key = BasisKey {
            entry: EntryKey {
                mesh: mesh.id(),
                element: mesh.element_type(),
                n_gauss: operators.n_gauss_per_element,
            },
            generation: mesh.generation(),
            nvar: space.nvar(),
            vectors: space.vectors().map(|(_, ranks)| ranks.to_vec()).collect(),
        };
        if let Some(basis) = self.bases.get(&key) {
            return Ok(Rc::clone(basis));
        }
        self.bases
            .retain(|basis, _| basis.entry != key.entry || basis.generation == key.generation);
        let basis = Rc::new(operators.change_of_basis(mesh, space)?);
        self.bases.insert(key, Rc::clone(&basis));
        Ok(basis)
    }

    /// Drops the entries of meshes that no longer exist, with their change-of-basis matrices.
    pub fn evict_dropped_meshes(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.mesh.strong_count() > 0);
        let entries = &self.entries;
        self.bases.retain(|basis, _| entries.contains_key(&basis.entry));
        if self.entries.len() < before {
            debug!("Evicted operators of {} dropped meshes", before - self.entries.len());
        }
    }

    /// Number of cached element operator sets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of cached change-of-basis matrices.
    pub fn basis_len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bases.clear();
    }
}

/// Gauss-point operators of every element of a mesh, stacked into sparse matrices.
///
/// Row `g * n_elements + e` corresponds to Gauss point `g` of element `e`. Columns are global
/// nodes, or for element families with local frames, element-local node slots
/// `e + local_node * n_elements`.
#[derive(Debug, Clone)]
pub struct ElementOperators {
    generation: u64,
    n_elements: usize,
    n_gauss_per_element: usize,
    n_nodes: usize,
    n_columns: usize,
    quadrature: DVector<f64>,
    node_to_gauss: CsrMatrix<f64>,
    gauss_to_node: CsrMatrix<f64>,
    operators: FxHashMap<(Interpolation, OperatorSlot), Vec<CsrMatrix<f64>>>,
    local_frames: Option<Vec<DMatrix<f64>>>,
}

impl ElementOperators {
    /// Computes the operators of a mesh. `n_gauss == 0` selects point-wise evaluation at the nodes
    /// used by the elements, where only values (no derivatives) are available.
    pub fn compute(mesh: &Mesh, n_gauss: usize) -> eyre::Result<Self> {
        if n_gauss == 0 {
            Ok(Self::compute_pointwise(mesh))
        } else {
            Self::compute_gauss(mesh, n_gauss)
        }
    }

    fn compute_pointwise(mesh: &Mesh) -> Self {
        let points = mesh.active_nodes();
        let mut coo = CooMatrix::new(points.len(), mesh.n_nodes());
        for (row, &node) in points.iter().enumerate() {
            coo.push(row, node, 1.0);
        }
        let selection = CsrMatrix::from(&coo);
        let shape = mesh.element_type().geometry();
        let mut operators = FxHashMap::default();
        operators.insert(
            (Interpolation::Lagrange(shape), OperatorSlot::Value),
            vec![selection.clone()],
        );
        Self {
            generation: mesh.generation(),
            n_elements: points.len(),
            n_gauss_per_element: 0,
            n_nodes: mesh.n_nodes(),
            n_columns: mesh.n_nodes(),
            quadrature: DVector::repeat(points.len(), 1.0),
            gauss_to_node: selection.transpose(),
            node_to_gauss: selection,
            operators,
            local_frames: None,
        }
    }

    fn compute_gauss(mesh: &Mesh, n_gauss: usize) -> eyre::Result<Self> {
        let element = mesh.element_type();
        let shape = element.geometry();
        let npe = shape.num_nodes();
        let n_el = mesh.n_elements();
        let dim = mesh.ndim();
        let ref_dim = shape.reference_dim();
        let n_rows = n_gauss * n_el;
        let local = element.has_local_frame();
        let n_columns = if local { n_el * npe } else { mesh.n_nodes() };
        let n_directions = if ref_dim == dim {
            dim
        } else if ref_dim == 1 {
            1
        } else {
            0
        };

        let (weights, points) = element.quadrature(n_gauss)?;
        let interpolations = element.interpolations();

        let mut builders: FxHashMap<(Interpolation, OperatorSlot), Vec<CooMatrix<f64>>> = FxHashMap::default();
        for &interpolation in &interpolations {
            let slots = std::iter::once(OperatorSlot::Value).chain((0..n_directions).map(OperatorSlot::Derivative));
            for slot in slots {
                let blocks = (0..interpolation.num_blocks())
                    .map(|_| CooMatrix::new(n_rows, n_columns))
                    .collect();
                builders.insert((interpolation, slot), blocks);
            }
        }

        let mut quadrature = DVector::zeros(n_rows);
        let mut node_to_gauss = CooMatrix::new(n_rows, mesh.n_nodes());
        let mut local_frames = Vec::with_capacity(if local { n_el } else { 0 });
        let reference_basis: Vec<_> = points.iter().map(|xi| shape.evaluate_basis(xi)).collect();
        let reference_gradients: Vec<_> = points.iter().map(|xi| shape.gradients(xi)).collect();

        for e in 0..n_el {
            let nodes = mesh.element(e);
            let x = DMatrix::from_fn(npe, dim, |n, j| mesh.nodes()[(nodes[n], j)]);
            if local {
                let tangent: Vec<f64> = (0..dim).map(|j| x[(1, j)] - x[(0, j)]).collect();
                local_frames.push(line_local_frame(&tangent));
            }
            let column = |n: usize| if local { e + n * n_el } else { nodes[n] };

            for (g, (w, xi)) in weights.iter().zip(&points).enumerate() {
                let row = g * n_el + e;
                let basis = &reference_basis[g];
                let gradients = &reference_gradients[g];
                let jacobian = gradients * &x;
                let map = GeometricMap::from_jacobian(&jacobian, e)?;
                quadrature[row] = w * map.measure;
                for n in 0..npe {
                    node_to_gauss.push(row, nodes[n], basis[n]);
                }
                let physical = &map.derivative_transform * gradients;

                for &interpolation in &interpolations {
                    match interpolation {
                        Interpolation::Lagrange(_) => {
                            for n in 0..npe {
                                push(&mut builders, interpolation, OperatorSlot::Value, 0, row, column(n), basis[n]);
                                for d in 0..n_directions {
                                    let value = physical[(d, n)];
                                    push(&mut builders, interpolation, OperatorSlot::Derivative(d), 0, row, column(n), value);
                                }
                            }
                        }
                        _ => {
                            let hermite = HermiteBasis::at(xi[0]);
                            let slots = [(OperatorSlot::Value, 0), (OperatorSlot::Derivative(0), 1)];
                            for (slot, order) in slots.into_iter().take(1 + n_directions.min(1)) {
                                if let Some((own, associated)) = hermite.coefficients(interpolation, order, map.length_scale) {
                                    for n in 0..2 {
                                        push(&mut builders, interpolation, slot, 0, row, column(n), own[n]);
                                        push(&mut builders, interpolation, slot, 1, row, column(n), associated[n]);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let reference_values = DMatrix::from_fn(n_gauss, npe, |g, n| reference_basis[g][n]);
        let extrapolation = reference_values
            .pseudo_inverse(1e-12)
            .map_err(|err| eyre::eyre!("failed to invert the Gauss point interpolation: {err}"))?;
        let elements_per_node = mesh.elements_per_node();
        let mut gauss_to_node = CooMatrix::new(mesh.n_nodes(), n_rows);
        for e in 0..n_el {
            for (n, &node) in mesh.element(e).iter().enumerate() {
                for g in 0..n_gauss {
                    let value = extrapolation[(n, g)] / elements_per_node[node] as f64;
                    gauss_to_node.push(node, g * n_el + e, value);
                }
            }
        }

        let operators = builders
            .into_iter()
            .map(|(key, blocks)| (key, blocks.iter().map(CsrMatrix::from).collect()))
            .collect();

        Ok(Self {
            generation: mesh.generation(),
            n_elements: n_el,
            n_gauss_per_element: n_gauss,
            n_nodes: mesh.n_nodes(),
            n_columns,
            quadrature,
            node_to_gauss: CsrMatrix::from(&node_to_gauss),
            gauss_to_node: CsrMatrix::from(&gauss_to_node),
            operators,
            local_frames: local.then_some(local_frames),
        })
    }

    fn change_of_basis(&self, mesh: &Mesh, space: &ModelingSpace) -> eyre::Result<CsrMatrix<f64>> {
        let frames = self.local_frames.as_ref().ok_or_else(|| ConfigurationError::UnsupportedElement {
            element: mesh.element_type().name().to_string(),
            reason: "the element has no local frame".to_string(),
        })?;
        let nvar = space.nvar();
        let frame_dim = mesh.ndim();
        let mut membership: Vec<Option<(&[usize], usize)>> = vec![None; nvar];
        for (name, ranks) in space.vectors() {
            if ranks.len() != frame_dim {
                return Err(ConfigurationError::DimensionMismatch {
                    context: format!("vector '{name}' rotated into element frames"),
                    expected: frame_dim,
                    actual: ranks.len(),
                }
                .into());
            }
            for (i, &rank) in ranks.iter().enumerate() {
                membership[rank].get_or_insert((ranks, i));
            }
        }

        let n_el = self.n_elements;
        let mut coo = CooMatrix::new(nvar * self.n_columns, nvar * self.n_nodes);
        for (e, frame) in frames.iter().enumerate() {
            for (n, &node) in mesh.element(e).iter().enumerate() {
                let slot = e + n * n_el;
                for var in 0..nvar {
                    let row = var * self.n_columns + slot;
                    match membership[var] {
                        None => coo.push(row, var * self.n_nodes + node, 1.0),
                        Some((ranks, i)) => {
                            for (j, &component) in ranks.iter().enumerate() {
                                coo.push(row, component * self.n_nodes + node, frame[(i, j)]);
                            }
                        }
                    }
                }
            }
        }
        Ok(CsrMatrix::from(&coo))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    /// Gauss points per element, zero for point-wise operators.
    pub fn n_gauss_per_element(&self) -> usize {
        self.n_gauss_per_element
    }

    /// Total number of evaluation points (rows of every operator).
    pub fn n_points(&self) -> usize {
        self.quadrature.len()
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn is_pointwise(&self) -> bool {
        self.n_gauss_per_element == 0
    }

    pub fn has_local_frames(&self) -> bool {
        self.local_frames.is_some()
    }

    pub fn local_frames(&self) -> Option<&[DMatrix<f64>]> {
        self.local_frames.as_deref()
    }

    /// Quadrature weights scaled by the element measure.
    pub fn quadrature(&self) -> &DVector<f64> {
        &self.quadrature
    }

    /// Interpolates nodal values at the evaluation points.
    pub fn node_to_gauss(&self) -> &CsrMatrix<f64> {
        &self.node_to_gauss
    }

    /// Extrapolates point values to nodes, averaged over the elements sharing each node.
    pub fn gauss_to_node(&self) -> &CsrMatrix<f64> {
        &self.gauss_to_node
    }

    pub fn operator(&self, interpolation: Interpolation, slot: OperatorSlot) -> Option<&[CsrMatrix<f64>]> {
        self.operators.get(&(interpolation, slot)).map(Vec::as_slice)
    }

    /// Values of a coefficient at the evaluation points.
    ///
    /// Fields are located by their length, checked in the order evaluation points, nodes,
    /// elements.
    pub fn coefficient_at_points(&self, coefficient: &Coefficient) -> eyre::Result<DVector<f64>> {
        match coefficient {
            Coefficient::Scalar(value) => Ok(DVector::repeat(self.n_points(), *value)),
            Coefficient::Field(values) => self.field_at_points(values),
            Coefficient::Product(factors) => {
                let mut product = DVector::repeat(self.n_points(), 1.0);
                for factor in factors {
                    product.component_mul_assign(&self.field_at_points(factor)?);
                }
                Ok(product)
            }
        }
    }

    fn field_at_points(&self, values: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let n_points = self.n_points();
        match values.len() {
            n if n == n_points => Ok(values.clone()),
            n if n == self.n_nodes => Ok(&self.node_to_gauss * values),
            n if n == self.n_elements && !self.is_pointwise() => {
                Ok(DVector::from_fn(n_points, |row, _| values[row % self.n_elements]))
            }
            n => Err(ConfigurationError::DimensionMismatch {
                context: "coefficient field (points, nodes or elements)".to_string(),
                expected: n_points,
                actual: n,
            }
            .into()),
        }
    }

    /// Extrapolates values at the evaluation points to the nodes.
    pub fn points_to_nodes(&self, values: &DVector<f64>) -> DVector<f64> {
        &self.gauss_to_node * values
    }

    fn location_len(&self, location: DataLocation) -> eyre::Result<usize> {
        match location {
            DataLocation::Node => Ok(self.n_nodes),
            DataLocation::GaussPoint => Ok(self.n_points()),
            DataLocation::Element if self.is_pointwise() => Err(ConfigurationError::InvalidSetting(
                "element values are not defined for point-wise operators".to_string(),
            )
            .into()),
            DataLocation::Element => Ok(self.n_elements),
        }
    }

    /// Moves a field between nodes, elements and evaluation points.
    ///
    /// Element values are spread to every point of the element, and point values are reduced to
    /// elements by their measure-weighted mean.
    pub fn convert_data(&self, values: &DVector<f64>, from: DataLocation, to: DataLocation) -> eyre::Result<DVector<f64>> {
        let expected = self.location_len(from)?;
        if values.len() != expected {
            return Err(ConfigurationError::DimensionMismatch {
                context: format!("field located at {from:?}"),
                expected,
                actual: values.len(),
            }
            .into());
        }
        self.location_len(to)?;
        use DataLocation::*;
        let converted = match (from, to) {
            (Node, Node) | (Element, Element) | (GaussPoint, GaussPoint) => values.clone(),
            (Node, GaussPoint) => &self.node_to_gauss * values,
            (GaussPoint, Node) => &self.gauss_to_node * values,
            (Element, GaussPoint) => DVector::from_fn(self.n_points(), |row, _| values[row % self.n_elements]),
            (GaussPoint, Element) => {
                let mut integral = DVector::<f64>::zeros(self.n_elements);
                let mut measure = DVector::<f64>::zeros(self.n_elements);
                for (row, (value, weight)) in values.iter().zip(self.quadrature.iter()).enumerate() {
                    let element = row % self.n_elements;
                    integral[element] += weight * value;
                    measure[element] += weight;
                }
                integral.zip_map(&measure, |v, m| if m > 0.0 { v / m } else { 0.0 })
            }
            (Node, Element) => self.convert_data(&(&self.node_to_gauss * values), GaussPoint, Element)?,
            (Element, Node) => self.convert_data(&self.convert_data(values, Element, GaussPoint)?, GaussPoint, Node)?,
        };
        Ok(converted)
    }
}

fn push(
    builders: &mut FxHashMap<(Interpolation, OperatorSlot), Vec<CooMatrix<f64>>>,
    interpolation: Interpolation,
    slot: OperatorSlot,
    block: usize,
    row: usize,
    col: usize,
    value: f64,
) {
    if let Some(blocks) = builders.get_mut(&(interpolation, slot)) {
        blocks[block].push(row, col, value);
    }
}
