//! Test helpers shared by the crates in this workspace.
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// `n` points on a circle around `center` in the plane spanned by `u` and `v`, counter-clockwise
/// about `u x v` and starting at `center + radius * u`.
pub fn circle_contour(center: Point3<f64>, u: Vector3<f64>, v: Vector3<f64>, radius: f64, n: usize) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / n as f64;
            center + (u * theta.cos() + v * theta.sin()) * radius
        })
        .collect()
}

/// A circle in the XY plane at height `z`.
pub fn xy_circle_contour(center: Point3<f64>, radius: f64, n: usize) -> Vec<Point3<f64>> {
    circle_contour(center, Vector3::x(), Vector3::y(), radius, n)
}
