//! Proptest strategies for element types, matrices and stencils.
use crate::element::{GeomType, Xi};
use ::proptest::prelude::*;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::PI;

pub fn point3() -> impl Strategy<Value = Point3<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range.clone()].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

/// Names of nodal Lagrange types of orders 1 to 3, up to order 2 for tetrahedra and hexahedra.
pub fn nodal_lagrange_type_name() -> impl Strategy<Value = String> {
    prop_oneof![
        (1..=3usize).prop_map(|o| format!("Line{}NL", o)),
        (1..=3usize).prop_map(|o| format!("Tri{}NL", o)),
        (1..=3usize).prop_map(|o| format!("Quad{}NL", o)),
        (1..=2usize).prop_map(|o| format!("Tet{}NL", o)),
        (1..=2usize).prop_map(|o| format!("Hex{}NL", o)),
    ]
}

/// A point of the reference cell of `geom`: the unit cube for tensor product cells and the unit
/// simplex otherwise. Unused components are zero.
pub fn reference_xi(geom: GeomType) -> impl Strategy<Value = Xi> {
    let unit = 0.0..=1.0;
    [unit.clone(), unit.clone(), unit].prop_map(move |[a, b, c]| {
        let dim = geom.dim();
        let mut xi = [a, b, c];
        for x in xi.iter_mut().skip(dim) {
            *x = 0.0;
        }
        if geom.is_simplex() {
            // Fold the cube into the simplex
            let sum: f64 = xi.iter().sum();
            if sum > 1.0 {
                let scale = 1.0 / sum;
                for x in xi.iter_mut() {
                    *x *= scale;
                }
            }
        }
        xi
    })
}

/// A row count and a part count no larger than it.
pub fn partition_args(max_total: usize) -> impl Strategy<Value = (usize, usize)> {
    (1..=max_total.max(1)).prop_flat_map(|total| (Just(total), 1..=total))
}

/// A rotation about a random axis followed by a translation.
pub fn rigid_motion() -> impl Strategy<Value = Isometry3<f64>> {
    ([-1.0..1.0, -1.0..1.0, -1.0..1.0], -PI..PI, [-10.0..10.0, -10.0..10.0, -10.0..10.0])
        .prop_filter("Axis must not be near zero", |(axis, _, _)| {
            axis.iter().map(|a| a * a).sum::<f64>() > 1e-2
        })
        .prop_map(|([x, y, z], angle, [tx, ty, tz])| {
            let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(x, y, z).normalize() * angle);
            Isometry3::from_parts(Translation3::new(tx, ty, tz), rotation)
        })
}

/// A star-shaped polygon in the xy plane, counter-clockwise, with vertices at jittered angles and
/// radii around the origin.
pub fn star_polygon(num_vertices: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Point3<f64>>> {
    num_vertices
        .prop_flat_map(|n| proptest::collection::vec((-0.3..0.3, 0.5..2.0), n))
        .prop_map(|params| {
            let n = params.len() as f64;
            params
                .iter()
                .enumerate()
                .map(|(i, (jitter, radius))| {
                    let theta: f64 = (i as f64 + jitter) * 2.0 * PI / n;
                    Point3::new(radius * theta.cos(), radius * theta.sin(), 0.0)
                })
                .collect()
        })
}
