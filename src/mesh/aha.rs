//! Region labelling of hemisphere meshes.
//!
//! The left ventricle is divided into the 17 segments of the American Heart Association model:
//! basal and mid rings of six sectors (1-6 and 7-12), an apical ring of four (13-16) and the apical
//! cap (17). Elements above the base plane are labelled 18. Cavity meshes use regions 18-23, one
//! per sector of the circumferential xi.
use crate::dataset::props;
use crate::error::{Error, Result};
use crate::geometry::Plane;
use crate::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use crate::util::{clamp, lerp_xi};
use nalgebra::{Point3, Vector3};

/// Region labels of the basal, mid and apical rings, ordered by circumferential xi.
const AHA_RINGS: [&[u8]; 3] = [&[2, 3, 4, 5, 6, 1], &[8, 9, 10, 11, 12, 7], &[13, 14, 15, 16]];
const AHA_APEX: u8 = 17;
const AHA_OUTSIDE: u8 = 18;
const CAVITY_FIRST: u8 = 18;

/// Smallest circumferential xi of an element's surface nodes.
///
/// Nodes strictly between the inner and outer surface are ignored so that seam elements do not
/// pick up the xi of their mid layer. Elements with no surface node use all their nodes.
fn min_surface_xi(xis: &[Vector3<f64>], row: &[usize], surface: impl Fn(f64) -> bool) -> f64 {
    let on_surface = row
        .iter()
        .map(|&i| xis[i])
        .filter(|xi| surface(xi.z))
        .map(|xi| xi.x)
        .fold(f64::INFINITY, f64::min);
    if on_surface.is_finite() {
        on_surface
    } else {
        row.iter().map(|&i| xis[i].x).fold(f64::INFINITY, f64::min)
    }
}

fn check_rows(nodes: &Vec3Matrix, xis: &Vec3Matrix) -> Result<()> {
    if nodes.rows() != xis.rows() {
        return Err(Error::shape(
            xis.name(),
            format!("{} xi values given for {} nodes", xis.rows(), nodes.rows()),
        ));
    }
    Ok(())
}

/// Element rows of `inds`, checked against the number of nodes.
fn element_rows(inds: &IndexMatrix, num_nodes: usize) -> Result<Vec<Vec<usize>>> {
    let rows = inds.index_rows()?;
    if let Some(&bad) = rows.iter().flatten().find(|&&i| i >= num_nodes) {
        return Err(Error::geometry(
            inds.name(),
            format!("index {} out of range for {} nodes", bad, num_nodes),
        ));
    }
    Ok(rows)
}

fn region_field(name: &str, inds: &IndexMatrix, regions: Vec<f64>) -> Result<RealMatrix> {
    let mut field = RealMatrix::from_vec(name, 1, regions)?;
    field.set_meta(props::ELEMDATA, "True");
    field.set_meta(props::TOPOLOGY, inds.name());
    field.set_meta(props::SPATIAL, inds.name());
    Ok(field)
}

/// Labels every element of a hemisphere mesh with its AHA region, giving an element field named
/// `AHA`.
///
/// `top` is the base plane with its normal pointing towards the apex. Heights of nodes along the
/// normal are scaled so that `start` (clamped to the base plane) is 0 and the deepest node 1, and
/// the three rings split this range at thirds of the apex height. Without `include_17` the apical
/// ring extends to the apex and no element is labelled 17.
pub fn calculate_aha_field(
    nodes: &Vec3Matrix,
    xis: &Vec3Matrix,
    inds: &IndexMatrix,
    top: &Plane<f64>,
    apex: &Point3<f64>,
    start: &Point3<f64>,
    include_17: bool,
) -> Result<RealMatrix> {
    check_rows(nodes, xis)?;
    let xis = xis.to_vec();
    let heights: Vec<f64> = nodes.points().iter().map(|n| top.signed_distance(n)).collect();

    let max_height = heights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_height = top.signed_distance(start).max(0.0);
    let apex_height = if include_17 {
        lerp_xi(top.signed_distance(apex), min_height, max_height)
    } else {
        1.0
    };
    let thresholds = [apex_height / 3.0, apex_height * 2.0 / 3.0, apex_height];

    let mut regions = Vec::with_capacity(inds.rows());
    for row in element_rows(inds, xis.len())? {
        let min_x = min_surface_xi(&xis, &row, |z| !(0.0 < z && z < 1.0));
        let height = row.iter().map(|&i| heights[i]).fold(f64::NEG_INFINITY, f64::max);
        let y = lerp_xi(height, min_height, max_height);

        let region = if y < 0.0 {
            AHA_OUTSIDE
        } else if y < thresholds[0] {
            AHA_RINGS[0][clamp((min_x * 6.0) as usize, 0, 5)]
        } else if y < thresholds[1] {
            AHA_RINGS[1][clamp((min_x * 6.0) as usize, 0, 5)]
        } else if y < thresholds[2] || !include_17 {
            // The apical ring is rotated by half a sector against the basal rings
            AHA_RINGS[2][((min_x + (1.0 / 4.0 + 1.0 / 6.0) / 2.0) * 4.0) as usize % 4]
        } else {
            AHA_APEX
        };
        regions.push(region as f64);
    }

    region_field("AHA", inds, regions)
}

/// Labels every element of a cavity mesh with one of the regions 18 to 23 by its circumferential
/// xi, giving an element field named `cavity`.
pub fn calculate_cavity_field(xis: &Vec3Matrix, inds: &IndexMatrix) -> Result<RealMatrix> {
    let xis = xis.to_vec();
    let mut regions = Vec::with_capacity(inds.rows());
    for row in element_rows(inds, xis.len())? {
        let min_x = min_surface_xi(&xis, &row, |z| z == 0.0 || z == 1.0);
        let sector = clamp((min_x * 6.0) as usize, 0, 5) as u8;
        regions.push((CAVITY_FIRST + sector) as f64);
    }
    region_field("cavity", inds, regions)
}
