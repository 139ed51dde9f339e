//! Periodic unit cells: macroscopic strain dofs, periodic constraints and averaged stress.
use nalgebra::{DMatrix, DVector};
use weakfem::assembly::Discretization;
use weakfem::boundary_conditions::{BcValue, MultiPointConstraint, NodeSelection};
use weakfem::error::ConfigurationError;
use weakfem::mesh::Mesh;

/// Dofs `(node, variable)` that hold the macroscopic strain components of a 2D cell.
///
/// `exy` is the tensor shear strain, half the engineering shear.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroStrainDofs {
    pub exx: (usize, String),
    pub eyy: (usize, String),
    pub exy: (usize, String),
}

impl MacroStrainDofs {
    /// `Exx` and `Eyy` on the displacements of the first node, `Exy` on `DispX` of the second.
    pub fn on_nodes(strain_nodes: [usize; 2]) -> Self {
        Self {
            exx: (strain_nodes[0], "DispX".to_string()),
            eyy: (strain_nodes[0], "DispY".to_string()),
            exy: (strain_nodes[1], "DispX".to_string()),
        }
    }
}

/// Appends two nodes at the center of the mesh to hold the macroscopic strain.
pub fn add_strain_nodes(mesh: &mut Mesh) -> eyre::Result<[usize; 2]> {
    let (min, max) = mesh.bounding_box();
    let center = (min + max) / 2.0;
    let coordinates = DMatrix::from_fn(2, mesh.ndim(), |_, j| center[j]);
    let nodes = mesh.add_nodes(&coordinates)?;
    Ok([nodes[0], nodes[1]])
}

/// Nodes on the boundary of a rectangular cell, sides without their corners.
struct CellBoundary {
    left: Vec<usize>,
    right: Vec<usize>,
    bottom: Vec<usize>,
    top: Vec<usize>,
    corners: [usize; 4],
    size: [f64; 2],
}

impl CellBoundary {
    fn find(mesh: &Mesh, tol: f64) -> eyre::Result<Self> {
        let used = mesh.active_nodes();
        let x = |n: usize| mesh.nodes()[(n, 0)];
        let y = |n: usize| mesh.nodes()[(n, 1)];
        let (xmin, xmax) = minmax(used.iter().map(|&n| x(n)));
        let (ymin, ymax) = minmax(used.iter().map(|&n| y(n)));
        let near = |a: f64, b: f64| (a - b).abs() < tol;

        let side = |on_side: &dyn Fn(usize) -> bool, key: &dyn Fn(usize) -> f64| {
            let mut nodes: Vec<usize> = used.iter().copied().filter(|&n| on_side(n)).collect();
            nodes.sort_by(|&a, &b| key(a).total_cmp(&key(b)));
            nodes
        };
        let interior_y = |n: usize| !near(y(n), ymin) && !near(y(n), ymax);
        let interior_x = |n: usize| !near(x(n), xmin) && !near(x(n), xmax);
        let left = side(&|n| near(x(n), xmin) && interior_y(n), &y);
        let right = side(&|n| near(x(n), xmax) && interior_y(n), &y);
        let bottom = side(&|n| near(y(n), ymin) && interior_x(n), &x);
        let top = side(&|n| near(y(n), ymax) && interior_x(n), &x);

        let corner = |cx: f64, cy: f64| {
            used.iter()
                .copied()
                .find(|&n| near(x(n), cx) && near(y(n), cy))
                .ok_or_else(|| ConfigurationError::InvalidSetting(format!("no node at the cell corner ({cx}, {cy})")))
        };
        let corners = [
            corner(xmin, ymin)?,
            corner(xmax, ymin)?,
            corner(xmax, ymax)?,
            corner(xmin, ymax)?,
        ];
        for (a, b, pair) in [(&left, &right, "left/right"), (&bottom, &top, "bottom/top")] {
            if a.len() != b.len() {
                return Err(ConfigurationError::DimensionMismatch {
                    context: format!("nodes on the {pair} sides of a periodic cell"),
                    expected: a.len(),
                    actual: b.len(),
                }
                .into());
            }
        }
        Ok(Self {
            left,
            right,
            bottom,
            top,
            corners,
            size: [xmax - xmin, ymax - ymin],
        })
    }
}

fn minmax(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Constraints making the displacement of a rectangular 2D cell periodic up to the macroscopic
/// strain: `u(right) - u(left) = E · (dx, 0)` and `u(top) - u(bottom) = E · (0, dy)`.
///
/// Corners are expressed relative to the bottom-left corner, which remains free.
pub fn periodic_constraints_2d(mesh: &Mesh, strain: &MacroStrainDofs, tol: f64) -> eyre::Result<Vec<MultiPointConstraint>> {
    let cell = CellBoundary::find(mesh, tol)?;
    let [dx, dy] = cell.size;
    let [bl, br, tr, tl] = cell.corners;
    let single = |n: usize| NodeSelection::Indices(vec![n]);
    let nodes = |v: &[usize]| NodeSelection::Indices(v.to_vec());

    // Strain component driving each displacement along each cell direction.
    let along_x = [&strain.exx, &strain.exy];
    let along_y = [&strain.exy, &strain.eyy];
    let mut constraints = Vec::new();
    for (component, variable) in ["DispX", "DispY"].into_iter().enumerate() {
        let (ex_node, ex_var) = (along_x[component].0, along_x[component].1.as_str());
        let (ey_node, ey_var) = (along_y[component].0, along_y[component].1.as_str());

        let mut relation = |slave: NodeSelection, master: NodeSelection, terms: Vec<(&str, usize, f64)>, name: String| {
            let mut variables = vec![variable, variable];
            let mut selections = vec![slave, master];
            let mut factors = vec![BcValue::Uniform(1.0), BcValue::Uniform(-1.0)];
            for (var, node, factor) in terms {
                variables.push(var);
                selections.push(single(node));
                factors.push(BcValue::Uniform(-factor));
            }
            constraints.push(MultiPointConstraint::new(&variables, selections, factors).with_name(&name));
        };

        if !cell.right.is_empty() {
            relation(nodes(&cell.right), nodes(&cell.left), vec![(ex_var, ex_node, dx)], format!("periodic {variable} right/left"));
        }
        if !cell.top.is_empty() {
            relation(nodes(&cell.top), nodes(&cell.bottom), vec![(ey_var, ey_node, dy)], format!("periodic {variable} top/bottom"));
        }
        relation(single(br), single(bl), vec![(ex_var, ex_node, dx)], format!("periodic {variable} corner br"));
        relation(single(tl), single(bl), vec![(ey_var, ey_node, dy)], format!("periodic {variable} corner tl"));
        relation(
            single(tr),
            single(bl),
            vec![(ex_var, ex_node, dx), (ey_var, ey_node, dy)],
            format!("periodic {variable} corner tr"),
        );
    }
    Ok(constraints)
}

/// Volume average of a field stored one column per integration point.
pub fn mean_field(discretization: &Discretization, field: &DMatrix<f64>) -> eyre::Result<DVector<f64>> {
    let operators = discretization.operators()?;
    let quadrature = operators.quadrature();
    let volume = quadrature.sum();
    if field.ncols() != quadrature.len() {
        return Err(ConfigurationError::DimensionMismatch {
            context: "averaged field".to_string(),
            expected: quadrature.len(),
            actual: field.ncols(),
        }
        .into());
    }
    Ok(field * quadrature / volume)
}
