//! Basic procedural mesh generation routines.
use crate::element::ElementType;
use crate::mesh::Mesh;
use nalgebra::DMatrix;

/// A straight line of `num_elements` two-node elements from `start` to `end`.
///
/// The node sets `"left"` and `"right"` hold the first and last node.
pub fn create_line_mesh(start: &[f64], end: &[f64], num_elements: usize, element_type: ElementType) -> eyre::Result<Mesh> {
    assert_eq!(start.len(), end.len(), "start and end must have the same dimension");
    let n_nodes = num_elements + 1;
    let ndim = start.len();
    let nodes = DMatrix::from_fn(n_nodes, ndim, |i, j| {
        let s = i as f64 / num_elements.max(1) as f64;
        start[j] + s * (end[j] - start[j])
    });
    let connectivity = (0..num_elements).flat_map(|e| [e, e + 1]).collect();
    let mut mesh = Mesh::from_nodes_and_connectivity(nodes, connectivity, element_type)?;
    mesh.add_node_set("left", vec![0])?;
    mesh.add_node_set("right", vec![num_elements])?;
    Ok(mesh)
}

/// An axis-aligned rectangle `[0, size_x] x [0, size_y]` meshed with `cells_x x cells_y` quads.
///
/// Nodes are numbered row by row starting at the origin. The node sets `"left"`, `"right"`,
/// `"bottom"` and `"top"` hold the nodes on each side, corners included.
pub fn create_rectangular_quad_mesh(size_x: f64, size_y: f64, cells_x: usize, cells_y: usize) -> eyre::Result<Mesh> {
    let num_vertices_x = cells_x + 1;
    let num_vertices_y = cells_y + 1;
    let to_global_vertex_index = |i: usize, j: usize| num_vertices_x * j + i;

    let nodes = DMatrix::from_fn(num_vertices_x * num_vertices_y, 2, |k, c| {
        let (i, j) = (k % num_vertices_x, k / num_vertices_x);
        match c {
            0 => size_x * i as f64 / cells_x.max(1) as f64,
            _ => size_y * j as f64 / cells_y.max(1) as f64,
        }
    });

    let mut connectivity = Vec::with_capacity(4 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            connectivity.extend_from_slice(&[
                to_global_vertex_index(i, j),
                to_global_vertex_index(i + 1, j),
                to_global_vertex_index(i + 1, j + 1),
                to_global_vertex_index(i, j + 1),
            ]);
        }
    }

    let mut mesh = Mesh::from_nodes_and_connectivity(nodes, connectivity, ElementType::Quad4)?;
    mesh.add_node_set("left", (0..num_vertices_y).map(|j| to_global_vertex_index(0, j)).collect())?;
    mesh.add_node_set(
        "right",
        (0..num_vertices_y)
            .map(|j| to_global_vertex_index(cells_x, j))
            .collect(),
    )?;
    mesh.add_node_set("bottom", (0..num_vertices_x).map(|i| to_global_vertex_index(i, 0)).collect())?;
    mesh.add_node_set(
        "top",
        (0..num_vertices_x)
            .map(|i| to_global_vertex_index(i, cells_y))
            .collect(),
    )?;
    Ok(mesh)
}

/// The rectangle of [`create_rectangular_quad_mesh`] with every quad split into two triangles.
pub fn create_rectangular_tri_mesh(size_x: f64, size_y: f64, cells_x: usize, cells_y: usize) -> eyre::Result<Mesh> {
    let quads = create_rectangular_quad_mesh(size_x, size_y, cells_x, cells_y)?;
    let connectivity = quads
        .elements()
        .flat_map(|q| [q[0], q[1], q[2], q[0], q[2], q[3]])
        .collect();
    let mut mesh = Mesh::from_nodes_and_connectivity(quads.nodes().clone(), connectivity, ElementType::Tri3)?;
    for (name, nodes) in quads.node_sets() {
        mesh.add_node_set(name, nodes.clone())?;
    }
    Ok(mesh)
}

/// A box `[0, size]^3` meshed with `cells^3` hexahedra, numbered with x varying fastest.
pub fn create_box_hex_mesh(size: [f64; 3], cells: [usize; 3]) -> eyre::Result<Mesh> {
    let [nx, ny, nz] = cells.map(|c| c + 1);
    let index = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
    let nodes = DMatrix::from_fn(nx * ny * nz, 3, |n, c| {
        let ijk = [n % nx, (n / nx) % ny, n / (nx * ny)];
        size[c] * ijk[c] as f64 / cells[c].max(1) as f64
    });
    let mut connectivity = Vec::new();
    for k in 0..cells[2] {
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                connectivity.extend_from_slice(&[
                    index(i, j, k),
                    index(i + 1, j, k),
                    index(i + 1, j + 1, k),
                    index(i, j + 1, k),
                    index(i, j, k + 1),
                    index(i + 1, j, k + 1),
                    index(i + 1, j + 1, k + 1),
                    index(i, j + 1, k + 1),
                ]);
            }
        }
    }
    let mut mesh = Mesh::from_nodes_and_connectivity(nodes, connectivity, ElementType::Hex8)?;
    for (axis, (low, high)) in [("left", "right"), ("bottom", "top"), ("back", "front")]
        .into_iter()
        .enumerate()
    {
        mesh.add_node_set(low, mesh.find_nodes(axis, 0.0, 1e-12))?;
        mesh.add_node_set(high, mesh.find_nodes(axis, size[axis], 1e-12 * size[axis].abs().max(1.0)))?;
    }
    Ok(mesh)
}
