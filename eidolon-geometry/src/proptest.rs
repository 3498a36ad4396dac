//! Proptest strategies for geometric primitives.
use crate::util::compute_orthonormal_vectors_3d;
use nalgebra::{Point3, Unit, Vector3};
use proptest::prelude::*;
use std::f64::consts::PI;

fn point3() -> impl Strategy<Value = Point3<f64>> {
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range.clone()].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

fn unit_vector3() -> impl Strategy<Value = Unit<Vector3<f64>>> {
    [-1.0..1.0, -1.0..1.0, -1.0..1.0]
        .prop_filter("Vector must not be near zero", |[x, y, z]| x * x + y * y + z * z > 1e-2)
        .prop_map(|[x, y, z]| Unit::new_normalize(Vector3::new(x, y, z)))
}

/// A convex polygon with vertices on a circle of random radius, lying on a random plane.
///
/// Vertex angles are jittered around equal spacing so that the polygon stays strictly convex.
pub fn convex_polygon3d(num_vertices: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Point3<f64>>> {
    (num_vertices, point3(), unit_vector3(), 0.5..5.0, 0.0..2.0 * PI)
        .prop_flat_map(|(n, center, normal, radius, phase)| {
            let jitter = proptest::collection::vec(-0.3..0.3, n);
            (Just((center, normal, radius, phase)), jitter)
        })
        .prop_map(|((center, normal, radius, phase), jitter)| {
            let [u, v] = compute_orthonormal_vectors_3d(&normal);
            let n = jitter.len() as f64;
            jitter
                .iter()
                .enumerate()
                .map(|(i, j)| {
                    let theta: f64 = phase + (i as f64 + j) * 2.0 * PI / n;
                    center + (u.as_ref() * theta.cos() + v.as_ref() * theta.sin()) * radius
                })
                .collect()
        })
}
