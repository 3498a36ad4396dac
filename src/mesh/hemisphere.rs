//! Hemisphere surfaces and volumes interpolated through contour stacks.
use super::aha::calculate_aha_field;
use super::contours::{
    center_of, estimate_hemi_thickness, generate_apex_contours, get_contour_relative_dir, get_hemi_axis,
    get_hemisphere_controls, reinterpolate_circular_contour, sort_contours, CURVE_SAMPLES,
};
use super::procedural::{cart_to_polar_xi, generate_hemisphere};
use super::apply_basis_concurrent;
use crate::concurrency::WorkerPool;
use crate::dataset::{props, reduce_mesh, Dataset};
use crate::element::{element_type, ControlGrid};
use crate::error::{Error, Result};
use crate::geometry::util::rotation_about_axis;
use crate::geometry::Plane;
use crate::matrix::{IndexMatrix, Vec3Matrix};
use crate::util::frange;
use nalgebra::{Point3, Unit, Vector3};
use std::f64::consts::PI;

/// Tolerance for merging the coincident xi nodes of neighbouring prisms.
const MERGE_EPSILON: f64 = 1e-8;

/// Decomposition of a prism over a subdivided triangle into 14 tetrahedra.
///
/// Prism nodes 0-2 are the triangle's corners on the first surface and 3-5 on the second, 6-8 its
/// edge midpoints on the first surface and 9-11 on the second, 12-14 the corners half way between.
const PRISM_TETS: [[usize; 4]; 14] = [
    [0, 8, 6, 12],
    [6, 7, 1, 13],
    [7, 8, 2, 14],
    [6, 8, 7, 14],
    [12, 6, 13, 14],
    [12, 8, 6, 14],
    [13, 6, 7, 14],
    [3, 9, 11, 12],
    [9, 4, 10, 13],
    [10, 5, 11, 14],
    [9, 10, 11, 14],
    [12, 13, 9, 14],
    [12, 9, 11, 14],
    [13, 10, 9, 14],
];

/// A mesh generated over a control lattice: world space nodes, the xi of every node on the
/// lattice and the element indices.
#[derive(Debug)]
pub struct HemisphereMesh {
    pub nodes: Vec3Matrix,
    pub xis: Vec3Matrix,
    pub indices: IndexMatrix,
}

/// Options of the hemisphere pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereParams {
    /// Refinement of the generated topology.
    pub refine: usize,
    /// Position defining the start direction of the contours and the base plane of the AHA regions.
    pub start_pos: Option<Point3<f64>>,
    /// Apex position, extrapolated from the contours if absent.
    pub apex: Option<Point3<f64>>,
    /// Resample all contours to the length of the longest at evenly spaced angles.
    pub reinterpolate: bool,
    /// Add an `AHA` region field.
    pub calc_aha: bool,
}

impl Default for HemisphereParams {
    fn default() -> Self {
        Self {
            refine: 2,
            start_pos: None,
            apex: None,
            reinterpolate: true,
            calc_aha: true,
        }
    }
}

/// Checks that every row of the lattice has the same number of control points and flattens it,
/// first axis fastest.
fn flatten_lattice(layers: &[&[Vec<Point3<f64>>]]) -> Result<(usize, usize, Vec<Vector3<f64>>)> {
    let rows = layers.first().map_or(0, |l| l.len());
    let cols = layers
        .first()
        .and_then(|l| l.first())
        .map_or(0, |r| r.len());
    if rows == 0 || cols == 0 {
        return Err(Error::basis("Quad2PCR", "empty control lattice"));
    }
    for layer in layers {
        if layer.len() != rows || layer.iter().any(|r| r.len() != cols) {
            return Err(Error::basis(
                "Quad2PCR",
                format!("control lattice rows must all have {} points and every layer {} rows", cols, rows),
            ));
        }
    }
    let values = layers
        .iter()
        .flat_map(|l| l.iter())
        .flatten()
        .map(|p| p.coords)
        .collect();
    Ok((cols, rows, values))
}

/// Generates a triangle hemisphere interpolating a lattice of control rings with the `Quad2PCR`
/// basis.
///
/// Rows of `ctrls` run from the base to the apex, and the last three are expected to close the
/// lattice at the apex (see [`generate_apex_contours`]). The topology is
/// [`generate_hemisphere`] at `refine + 1`, with `10 * 4^(refine + 1)` triangles.
pub fn generate_pcr_tri_hemisphere(ctrls: &[Vec<Point3<f64>>], refine: usize) -> Result<HemisphereMesh> {
    let (cols, rows, values) = flatten_lattice(&[ctrls])?;
    let surface = generate_hemisphere(refine + 1);
    let xis: Vec<_> = surface
        .vertices
        .iter()
        .map(|v| cart_to_polar_xi(&v.coords))
        .collect();
    let xis = Vec3Matrix::from_vec("xis", 1, xis)?;
    let nodes = Vec3Matrix::new("nodes", xis.rows(), 1);

    let quad = element_type("Quad2PCR")?;
    let grid = ControlGrid::new([cols, rows, 1])
        .with_limits([(0, -1), (0, 1), (0, 0)])
        .with_circular([true, false, false]);
    apply_basis_concurrent(WorkerPool::global(), &xis, &nodes, &values, &quad, Some(&grid), None)?;

    let tris: Vec<Vec<usize>> = surface.triangles.iter().map(|t| t.to_vec()).collect();
    let mut indices = IndexMatrix::from_index_rows("inds", "Tri1NL", 3, &tris)?;
    indices.set_meta(props::IS_SPATIAL, "True");
    log::debug!(
        "Generated triangle hemisphere with {} nodes and {} triangles",
        nodes.rows(),
        indices.rows()
    );
    Ok(HemisphereMesh { nodes, xis, indices })
}

/// Generates a tetrahedral hemisphere shell interpolating two lattices of control rings with the
/// `Hex3PCR` basis, `ctrls[0]` at xi 0 through the shell and `ctrls[1]` at xi 1.
///
/// Every triangle of [`generate_hemisphere`] at `refine + 1` becomes a prism split into 14
/// tetrahedra.
pub fn generate_pcr_tet_hemisphere(ctrls: [&[Vec<Point3<f64>>]; 2], refine: usize) -> Result<HemisphereMesh> {
    let (cols, rows, values) = flatten_lattice(&ctrls)?;
    let surface = generate_hemisphere(refine + 1);

    let mut prism_xis = Vec::with_capacity(surface.triangles.len() * 15);
    let mut tets = Vec::with_capacity(surface.triangles.len() * PRISM_TETS.len() * 4);
    for &[a, b, c] in &surface.triangles {
        let corners = [a, b, c].map(|i| surface.vertices[i].coords);
        let mids = [(0, 1), (1, 2), (2, 0)].map(|(i, j)| (corners[i] + corners[j]).normalize());
        let corner_xis = corners.map(|v| cart_to_polar_xi(&v));
        let mid_xis = mids.map(|v| cart_to_polar_xi(&v));

        let base = prism_xis.len();
        let with_depth = |xi: &Vector3<f64>, depth: f64| Vector3::new(xi.x, xi.y, depth);
        prism_xis.extend(corner_xis.iter().map(|xi| with_depth(xi, 0.0)));
        prism_xis.extend(corner_xis.iter().map(|xi| with_depth(xi, 1.0)));
        prism_xis.extend(mid_xis.iter().map(|xi| with_depth(xi, 0.0)));
        prism_xis.extend(mid_xis.iter().map(|xi| with_depth(xi, 1.0)));
        prism_xis.extend(corner_xis.iter().map(|xi| with_depth(xi, 0.5)));
        tets.extend(PRISM_TETS.iter().flatten().map(|&i| (base + i) as i64));
    }

    let prism_xis = Vec3Matrix::from_vec("xis", 1, prism_xis)?;
    let mut tets = IndexMatrix::from_vec("inds", 4, tets)?;
    tets.set_type_code("Tet1NL");
    tets.set_meta(props::IS_SPATIAL, "True");
    let reduced = reduce_mesh(&prism_xis, &[tets], MERGE_EPSILON)?;
    let xis = reduced.nodes;
    let indices = reduced
        .indices
        .into_iter()
        .next()
        .ok_or_else(|| Error::geometry("inds", "tetrahedra lost in node merging"))?;
    let nodes = Vec3Matrix::new("nodes", xis.rows(), 1);

    let hex = element_type("Hex3PCR")?;
    let grid = ControlGrid::new([cols, rows, 2])
        .with_limits([(0, -1), (0, 1), (0, 0)])
        .with_circular([true, false, false]);
    apply_basis_concurrent(WorkerPool::global(), &xis, &nodes, &values, &hex, Some(&grid), None)?;

    log::debug!(
        "Generated tetrahedral hemisphere with {} nodes and {} tetrahedra",
        nodes.rows(),
        indices.rows()
    );
    Ok(HemisphereMesh { nodes, xis, indices })
}

/// Generates a tetrahedral hemisphere shell between two ellipsoidal surfaces around `center`,
/// opening upwards, with `num_rings` rings of `num_ctrls` control points from the rim to the pole.
pub fn generate_default_hemisphere_mesh(
    refine: usize,
    center: &Point3<f64>,
    scale: &Vector3<f64>,
    outer_radius: f64,
    inner_radius: f64,
    num_ctrls: usize,
    num_rings: usize,
) -> Result<HemisphereMesh> {
    if num_ctrls < 3 || num_rings < 2 {
        return Err(Error::geometry(
            "hemisphere",
            format!("{} rings of {} control points are too few", num_rings, num_ctrls),
        ));
    }
    let ring_step = 1.0 / num_rings as f64;
    let ctrl_step = 1.0 / num_ctrls as f64;
    let y_axis = Vector3::y_axis();
    let z_axis = Vector3::z_axis();

    let mut inner = Vec::with_capacity(num_rings + 2);
    let mut outer = Vec::with_capacity(num_rings + 2);
    for phi in frange(0.0, 1.0 + ring_step, ring_step) {
        let tilt = rotation_about_axis(&y_axis, phi * PI / 2.0);
        let ring = |radius: f64| -> Vec<Point3<f64>> {
            frange(0.0, 1.0, ctrl_step)
                .into_iter()
                .map(|theta| {
                    let rotation = rotation_about_axis(&z_axis, theta * 2.0 * PI) * tilt;
                    center + (rotation * Vector3::new(radius, 0.0, 0.0)).component_mul(scale)
                })
                .collect()
        };
        inner.push(ring(inner_radius));
        outer.push(ring(outer_radius));
    }

    let (_, inner_apex) = generate_apex_contours(&inner, 0.25, None)?;
    let (_, outer_apex) = generate_apex_contours(&outer, 0.5, None)?;
    inner.extend(inner_apex.into_iter().take(1));
    outer.extend(outer_apex.into_iter().take(1));

    generate_pcr_tet_hemisphere([&inner, &outer], refine)
}

/// Resamples every contour to `num_nodes` points at evenly spaced angles from `start_dir`.
fn reinterpolate_all(contours: &[Vec<Point3<f64>>], start_dir: &Vector3<f64>, num_nodes: usize) -> Result<Vec<Vec<Point3<f64>>>> {
    contours
        .iter()
        .map(|c| reinterpolate_circular_contour(c, start_dir, CURVE_SAMPLES, num_nodes))
        .collect()
}

fn max_len(contours: &[Vec<Point3<f64>>]) -> usize {
    contours.iter().map(|c| c.len()).max().unwrap_or(0)
}

/// The AHA base plane: through the center of the first ring, normal towards the apex.
fn aha_plane(ctrls: &[Vec<Point3<f64>>]) -> Result<Plane<f64>> {
    let first = ctrls
        .first()
        .ok_or_else(|| Error::geometry("contour", "no control rings"))?;
    Ok(Plane::from_point_and_normal(center_of(first)?, get_hemi_axis(ctrls)?))
}

/// Shifts `apex` half the wall thickness back towards the base.
fn inner_apex(apex: Option<Point3<f64>>, sorted: &[Vec<Point3<f64>>], axis: &Unit<Vector3<f64>>) -> Result<Option<Point3<f64>>> {
    match apex {
        Some(apex) => {
            let thickness = estimate_hemi_thickness(sorted)?;
            Ok(Some(apex - axis.as_ref() * thickness * 0.5))
        }
        None => Ok(None),
    }
}

/// Generates a triangle hemisphere surface through a stack of contours, returned as the dataset
/// `<name>DS`.
///
/// With `inner_surface` the smaller of each pair of coplanar contours is used and the apex is
/// moved inwards by half the estimated wall thickness, otherwise the larger.
pub fn generate_hemisphere_surface(
    name: &str,
    contours: &[Vec<Point3<f64>>],
    params: &HemisphereParams,
    inner_surface: bool,
) -> Result<Dataset> {
    let start_dir = get_contour_relative_dir(contours, params.start_pos.as_ref())?;
    let sorted = sort_contours(contours, Some(&start_dir))?;
    let mut ctrls = get_hemisphere_controls(&sorted, inner_surface)?;
    if params.reinterpolate {
        ctrls = reinterpolate_all(&ctrls, &start_dir, max_len(&ctrls))?;
    }

    let apex = if inner_surface {
        inner_apex(params.apex, &sorted, &get_hemi_axis(&ctrls)?)?
    } else {
        params.apex
    };
    let scale = if inner_surface { 0.25 } else { 0.5 };
    let (apex, apex_ctrls) = generate_apex_contours(&ctrls, scale, apex)?;
    ctrls.extend(apex_ctrls);

    let mesh = generate_pcr_tri_hemisphere(&ctrls, params.refine)?;
    let mut fields = Vec::new();
    if params.calc_aha {
        let top = aha_plane(&ctrls)?;
        let start = params.start_pos.unwrap_or(*top.point());
        fields.push(calculate_aha_field(
            &mesh.nodes,
            &mesh.xis,
            &mesh.indices,
            &top,
            &apex,
            &start,
            !inner_surface,
        )?);
    }

    Ok(Dataset::new(format!("{}DS", name), mesh.nodes, vec![mesh.indices], fields))
}

/// Generates a tetrahedral hemisphere volume through a stack of contours, returned as the dataset
/// `<name>DS`.
///
/// The volume spans from the outer to the inner contours of coplanar pairs. With `inner_only` it
/// fills the inner contours down to their centers instead, at one level of refinement more.
pub fn generate_hemisphere_volume(
    name: &str,
    contours: &[Vec<Point3<f64>>],
    params: &HemisphereParams,
    inner_only: bool,
) -> Result<Dataset> {
    let start_dir = get_contour_relative_dir(contours, params.start_pos.as_ref())?;
    let sorted = sort_contours(contours, Some(&start_dir))?;
    let mut inner = get_hemisphere_controls(&sorted, true)?;
    let mut outer = if inner_only {
        Vec::new()
    } else {
        get_hemisphere_controls(&sorted, false)?
    };

    // Both surfaces of a shell need lattices of the same size
    let num_nodes = max_len(&inner).max(max_len(&outer));
    let ragged = inner.iter().chain(&outer).any(|c| c.len() != num_nodes);
    if params.reinterpolate || (!inner_only && ragged) {
        inner = reinterpolate_all(&inner, &start_dir, num_nodes)?;
        outer = reinterpolate_all(&outer, &start_dir, num_nodes)?;
    }

    let inner_apex_pos = inner_apex(params.apex, &sorted, &get_hemi_axis(&inner)?)?;
    let (inner_apex, inner_apex_ctrls) = generate_apex_contours(&inner, 0.25, inner_apex_pos)?;
    inner.extend(inner_apex_ctrls);

    let (mesh, first_layer, apex) = if inner_only {
        let axial: Vec<_> = inner
            .iter()
            .map(|c| center_of(c).map(|center| vec![center; c.len()]))
            .collect::<Result<_>>()?;
        let mesh = generate_pcr_tet_hemisphere([&inner, &axial], params.refine + 1)?;
        (mesh, inner, inner_apex)
    } else {
        let (outer_apex, outer_apex_ctrls) = generate_apex_contours(&outer, 0.5, params.apex)?;
        outer.extend(outer_apex_ctrls);
        let mesh = generate_pcr_tet_hemisphere([&outer, &inner], params.refine)?;
        (mesh, outer, outer_apex)
    };

    let mut fields = Vec::new();
    if params.calc_aha {
        let top = aha_plane(&first_layer)?;
        let start = params.start_pos.unwrap_or(*top.point());
        fields.push(calculate_aha_field(
            &mesh.nodes,
            &mesh.xis,
            &mesh.indices,
            &top,
            &apex,
            &start,
            !inner_only,
        )?);
    }

    Ok(Dataset::new(format!("{}DS", name), mesh.nodes, vec![mesh.indices], fields))
}
