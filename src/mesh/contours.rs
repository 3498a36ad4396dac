//! Ordering, alignment and resampling of contour stacks.
use crate::element::{element_type, ControlGrid};
use crate::error::{Error, Result};
use crate::geometry::util::{angle_between, centroid, rotation_about_axis};
use crate::geometry::{
    contour_plane, contour_ray_intersections, contours_coplanar, plane_normal, plane_order, AxisAlignedBoundingBox3d,
    ContourError, Plane, Ray,
};
use crate::util::{avg, frange, lerp, rotate_indices};
use itertools::Itertools;
use nalgebra::{Point3, Unit, Vector3};
use ordered_float::OrderedFloat;
use std::f64::consts::PI;

/// Samples per control point taken along the curve through a contour before resampling it.
pub(crate) const CURVE_SAMPLES: usize = 10;

/// A closed planar contour observed at a timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point3<f64>>,
    pub timestep: f64,
}

impl Contour {
    pub fn new(points: Vec<Point3<f64>>, timestep: f64) -> Self {
        Self { points, timestep }
    }

    pub fn plane(&self) -> Result<Plane<f64>> {
        plane_of(&self.points)
    }
}

fn geometry_error(e: ContourError) -> Error {
    Error::geometry("contour", e.to_string())
}

pub(crate) fn plane_of(contour: &[Point3<f64>]) -> Result<Plane<f64>> {
    contour_plane(contour).map_err(geometry_error)
}

pub(crate) fn center_of(contour: &[Point3<f64>]) -> Result<Point3<f64>> {
    centroid(contour).ok_or_else(|| geometry_error(ContourError::TooFewPoints(0)))
}

fn radius_of(contour: &[Point3<f64>]) -> f64 {
    AxisAlignedBoundingBox3d::from_points(contour).map_or(0.0, |b| b.radius())
}

fn coplanar(c1: &[Point3<f64>], c2: &[Point3<f64>]) -> Result<bool> {
    contours_coplanar(c1, c2).map_err(geometry_error)
}

/// Sorts a stack of contours from base to apex and aligns their point order.
///
/// Every contour is rotated so that its first point is the one closest in angle to `start_dir`
/// as seen from its center, and reversed where needed so all contours wind the same way as the
/// first. The stack is then ordered along the first contour's normal, the end with the larger
/// contour coming first.
pub fn sort_contours(contours: &[Vec<Point3<f64>>], start_dir: Option<&Vector3<f64>>) -> Result<Vec<Vec<Point3<f64>>>> {
    let first = contours
        .first()
        .ok_or_else(|| geometry_error(ContourError::TooFewPoints(0)))?;
    if let Some(c) = contours.iter().find(|c| c.len() < 3) {
        return Err(geometry_error(ContourError::TooFewPoints(c.len())));
    }

    let first_center = center_of(first)?;
    let down = plane_normal(&first_center, &first[0], &first[1])
        .ok_or_else(|| geometry_error(ContourError::Colinear))?
        .into_inner();

    let mut reference_order = None;
    let mut aligned = Vec::with_capacity(contours.len());
    for contour in contours {
        let center = center_of(contour)?;
        let mut nodes: Vec<Point3<f64>> = match start_dir {
            Some(dir) => {
                let start = contour
                    .iter()
                    .position_min_by_key(|n| OrderedFloat(angle_between(dir, &(*n - center))))
                    .unwrap_or(0);
                rotate_indices(start, contour.len())
                    .into_iter()
                    .map(|i| contour[i])
                    .collect()
            }
            None => contour.clone(),
        };

        let order = plane_order(&center, &down, &nodes[0], &nodes[1]);
        match reference_order {
            None => reference_order = Some(order),
            Some(reference) if reference != order => nodes[1..].reverse(),
            _ => {}
        }
        aligned.push((center, nodes));
    }

    let max_dist = aligned
        .iter()
        .map(|(c, _)| (c - first_center).norm())
        .fold(0.0, f64::max);
    let far = first_center - down * max_dist * 2.0;
    aligned.sort_by_key(|(c, _)| OrderedFloat((c - far).norm()));

    let mut sorted: Vec<_> = aligned.into_iter().map(|(_, nodes)| nodes).collect();
    if let (Some(first), Some(last)) = (sorted.first(), sorted.last()) {
        if radius_of(first) < radius_of(last) {
            sorted.reverse();
        }
    }
    Ok(sorted)
}

/// The unit direction from the center of the largest contour towards `pos` projected onto its
/// plane, or towards its first point if no position is given.
pub fn get_contour_relative_dir(contours: &[Vec<Point3<f64>>], pos: Option<&Point3<f64>>) -> Result<Vector3<f64>> {
    let largest = contours
        .iter()
        .max_by_key(|c| OrderedFloat(radius_of(c)))
        .ok_or_else(|| geometry_error(ContourError::TooFewPoints(0)))?;
    let plane = plane_of(largest)?;
    let target = match pos {
        Some(pos) => plane.project_point(pos),
        None => largest[0],
    };
    (target - plane.point())
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| Error::geometry("contour", "relative position coincides with the contour center"))
}

/// Picks one contour of every pair of coplanar successive contours, the smaller one if `inner`
/// and the larger otherwise. Contours without a coplanar partner are kept.
pub fn get_hemisphere_controls(contours: &[Vec<Point3<f64>>], inner: bool) -> Result<Vec<Vec<Point3<f64>>>> {
    let mut result = Vec::with_capacity(contours.len());
    let mut i = 0;
    while i < contours.len() {
        let c1 = &contours[i];
        match contours.get(i + 1) {
            Some(c2) if coplanar(c1, c2)? => {
                let smaller_first = radius_of(c1) <= radius_of(c2);
                let chosen = if smaller_first == inner { c1 } else { c2 };
                result.push(chosen.clone());
                i += 2;
            }
            _ => {
                result.push(c1.clone());
                i += 1;
            }
        }
    }
    Ok(result)
}

/// Average radius difference between the coplanar contour pairs at the start of the stack, or 0
/// if the first two contours are not coplanar.
pub fn estimate_hemi_thickness(contours: &[Vec<Point3<f64>>]) -> Result<f64> {
    if contours.len() < 2 || !coplanar(&contours[0], &contours[1])? {
        return Ok(0.0);
    }

    let mut diffs = Vec::new();
    for pair in contours.chunks_exact(2) {
        if coplanar(&pair[0], &pair[1])? {
            diffs.push((radius_of(&pair[0]) - radius_of(&pair[1])).abs());
        }
    }
    Ok(avg(&diffs))
}

/// Normal of the first contour's plane, pointing from the first contour towards the last.
pub fn get_hemi_axis(contours: &[Vec<Point3<f64>>]) -> Result<Unit<Vector3<f64>>> {
    let (first, last) = match (contours.first(), contours.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(geometry_error(ContourError::TooFewPoints(0))),
    };
    let normal = *plane_of(first)?.normal();
    let real_axis = center_of(last)? - center_of(first)?;
    if angle_between(&normal.into_inner(), &real_axis) < PI / 2.0 {
        Ok(normal)
    } else {
        Ok(-normal)
    }
}

/// Builds the contours closing a stack off at its apex.
///
/// Without a given apex, it is extrapolated from the last two contours by `scale` times their
/// separation and shifted along the stack axis. Returns the apex with three contours: a ring half
/// way between the last contour and the apex, the apex repeated once per control point, and the
/// half ring rotated by half a turn so that interpolation continues smoothly over the pole.
pub fn generate_apex_contours(
    contours: &[Vec<Point3<f64>>],
    scale: f64,
    apex: Option<Point3<f64>>,
) -> Result<(Point3<f64>, Vec<Vec<Point3<f64>>>)> {
    if contours.len() < 2 {
        return Err(Error::geometry(
            "contour",
            format!("at least 2 contours are needed to close a stack, got {}", contours.len()),
        ));
    }
    let last = &contours[contours.len() - 1];
    let before = &contours[contours.len() - 2];
    if last.len() != before.len() {
        return Err(Error::geometry("contour", "last two contours differ in length"));
    }

    let axis = get_hemi_axis(contours)?;
    let plane_dist = (center_of(last)? - center_of(before)?).norm();
    let plane_shift = axis.into_inner() * plane_dist * 0.2;

    let extrapolated = centroid(
        &last
            .iter()
            .zip(before)
            .map(|(i, j)| i + (i - j) * scale)
            .collect_vec(),
    )
    .ok_or_else(|| geometry_error(ContourError::TooFewPoints(0)))?;
    let (initial_apex, final_apex) = match apex {
        Some(apex) => (apex, apex),
        None => (extrapolated, extrapolated + plane_shift),
    };

    let len = last.len();
    let mid_ring: Vec<_> = last
        .iter()
        .map(|i| Point3::from(lerp(0.5, i.coords, initial_apex.coords)) + plane_shift)
        .collect();
    let inverted_ring = (0..len).map(|i| mid_ring[(len / 2 + i) % len]).collect();

    Ok((final_apex, vec![mid_ring, vec![final_apex; len], inverted_ring]))
}

/// Samples the closed Catmull-Rom curve through `contour` at `samples_per_point` points per
/// control point.
fn sample_closed_curve(contour: &[Point3<f64>], samples_per_point: usize) -> Result<Vec<Point3<f64>>> {
    let line = element_type("Line1PCR")?;
    let grid = ControlGrid::new([contour.len(), 1, 1])
        .with_limits([(0, -1), (0, 0), (0, 0)])
        .with_circular([true, false, false]);
    let values: Vec<_> = contour.iter().map(|p| p.coords).collect();
    let step = 1.0 / (contour.len() * samples_per_point.max(1)) as f64;
    frange(0.0, 1.0, step)
        .into_iter()
        .map(|xi| {
            line.apply_piecewise_basis(&values, [xi, 0.0, 0.0], &grid)
                .map(Point3::from)
        })
        .collect()
}

/// Resamples a closed contour to `num_nodes` points evenly spaced by arc length along the curve
/// through its points, starting at its first point.
pub fn reinterpolate_contour(contour: &[Point3<f64>], refine: usize, num_nodes: usize) -> Result<Vec<Point3<f64>>> {
    if contour.len() < 3 {
        return Err(geometry_error(ContourError::TooFewPoints(contour.len())));
    }
    let curve = sample_closed_curve(contour, refine)?;
    let segments: Vec<_> = curve
        .iter()
        .circular_tuple_windows()
        .map(|(a, b)| (*a, *b, (b - a).norm()))
        .collect();
    let perimeter: f64 = segments.iter().map(|(_, _, len)| len).sum();
    let step = perimeter / num_nodes as f64;

    let mut result = Vec::with_capacity(num_nodes);
    let mut walked = 0.0;
    let mut segments = segments.into_iter().peekable();
    for k in 0..num_nodes {
        let target = k as f64 * step;
        while let Some(&(a, b, len)) = segments.peek() {
            if walked + len >= target {
                let t = if len > 0.0 { (target - walked) / len } else { 0.0 };
                result.push(Point3::from(lerp(t, a.coords, b.coords)));
                break;
            }
            walked += len;
            segments.next();
        }
    }

    if result.len() != num_nodes {
        return Err(Error::geometry("contour", "could not resample contour by arc length"));
    }
    Ok(result)
}

/// Resamples a closed star-shaped contour to `num_nodes` points at evenly spaced angles around
/// its center, the first lying in direction `start_dir`.
///
/// Each point is where a ray from the center crosses the curve through the contour's points,
/// projected onto the contour plane.
pub fn reinterpolate_circular_contour(
    contour: &[Point3<f64>],
    start_dir: &Vector3<f64>,
    refine: usize,
    num_nodes: usize,
) -> Result<Vec<Point3<f64>>> {
    let plane = plane_of(contour)?;
    let normal = plane.normal();
    let center = *plane.point();
    let start_dir = start_dir - normal.as_ref() * normal.dot(start_dir);
    if start_dir.norm() <= f64::EPSILON {
        return Err(Error::geometry("contour", "start direction is perpendicular to the contour plane"));
    }

    let curve: Vec<_> = sample_closed_curve(contour, refine)?
        .iter()
        .map(|p| plane.project_point(p))
        .collect();

    frange(0.0, 1.0, 1.0 / num_nodes as f64)
        .into_iter()
        .map(|i| {
            let dir = rotation_about_axis(normal, 2.0 * PI * i) * start_dir;
            let ray = Ray::new(center, dir).ok_or_else(|| geometry_error(ContourError::Colinear))?;
            contour_ray_intersections(&ray, &curve)
                .min_by_key(|p| OrderedFloat((p - center).norm()))
                .ok_or_else(|| {
                    Error::geometry(
                        "contour",
                        format!("no intersection with the contour at angle {:.3}", 2.0 * PI * i),
                    )
                })
        })
        .collect()
}

/// Groups contours lying on the same plane. Within a group contours are ordered by timestep.
pub fn map_contours_to_planes(contours: &[Contour]) -> Result<Vec<(Plane<f64>, Vec<&Contour>)>> {
    let mut groups: Vec<(Plane<f64>, Vec<&Contour>)> = Vec::new();
    for contour in contours {
        let plane = contour.plane()?;
        match groups.iter_mut().find(|(p, _)| p.coincides_with(&plane)) {
            Some((_, group)) => group.push(contour),
            None => groups.push((plane, vec![contour])),
        }
    }
    for (_, group) in &mut groups {
        group.sort_by_key(|c| OrderedFloat(c.timestep));
    }
    Ok(groups)
}
