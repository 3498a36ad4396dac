use eidolon_geometry::{plane_normal, LineSegment3d, Plane, Ray, Tetrahedron, Triangle3d};
use matrixcompare::assert_scalar_eq;
use nalgebra::{point, vector, Unit, Vector3};
use std::cmp::Ordering;
use util::assert_approx_matrix_eq;

#[test]
fn ray_segment_intersection() {
    let ray = Ray::new(point![0.0, 0.0, 0.0], vector![2.0, 0.0, 0.0]).unwrap();

    let crossing = LineSegment3d::new(point![3.0, -1.0, 0.0], point![3.0, 1.0, 0.0]);
    let t = ray.intersect_segment(&crossing).unwrap();
    assert_scalar_eq!(t, 3.0, comp = abs, tol = 1e-12);

    // Endpoints count
    let touching = LineSegment3d::new(point![1.0, 0.0, 0.0], point![1.0, 1.0, 0.0]);
    assert!(ray.intersect_segment(&touching).is_some());

    let behind = LineSegment3d::new(point![-1.0, -1.0, 0.0], point![-1.0, 1.0, 0.0]);
    assert!(ray.intersect_segment(&behind).is_none());

    let skew = LineSegment3d::new(point![3.0, -1.0, 1.0], point![3.0, 1.0, 1.0]);
    assert!(ray.intersect_segment(&skew).is_none());

    let parallel = LineSegment3d::new(point![0.0, 1.0, 0.0], point![5.0, 1.0, 0.0]);
    assert!(ray.intersect_segment(&parallel).is_none());
}

#[test]
fn ray_triangle_intersection() {
    let (a, b, c) = (point![0.0, 0.0, 1.0], point![2.0, 0.0, 1.0], point![0.0, 2.0, 1.0]);

    let ray = Ray::new(point![0.5, 0.5, -1.0], vector![0.0, 0.0, 1.0]).unwrap();
    let hit = ray.intersect_triangle(&a, &b, &c).unwrap();
    assert_scalar_eq!(hit.t, 2.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(hit.u, 0.25, comp = abs, tol = 1e-12);
    assert_scalar_eq!(hit.v, 0.25, comp = abs, tol = 1e-12);

    let away = Ray::new(point![0.5, 0.5, -1.0], vector![0.0, 0.0, -1.0]).unwrap();
    assert!(away.intersect_triangle(&a, &b, &c).is_none());

    let miss = Ray::new(point![1.5, 1.5, -1.0], vector![0.0, 0.0, 1.0]).unwrap();
    assert!(miss.intersect_triangle(&a, &b, &c).is_none());
}

#[test]
fn ray_plane_intersection() {
    let plane = Plane::from_point_and_normal(point![0.0, 0.0, 2.0], Vector3::z_axis());
    let ray = Ray::new(point![1.0, 1.0, 0.0], vector![0.0, 1.0, 1.0]).unwrap();
    let t = ray.intersect_plane(&plane).unwrap();
    assert_approx_matrix_eq!(ray.point_at(t), point![1.0, 3.0, 2.0], abstol = 1e-12);

    let parallel = Ray::new(point![1.0, 1.0, 0.0], vector![1.0, 0.0, 0.0]).unwrap();
    assert!(parallel.intersect_plane(&plane).is_none());
    assert!(Ray::new(point![0.0, 0.0, 0.0], Vector3::zeros()).is_none());
}

#[test]
fn plane_from_points_and_order() {
    let (a, b, c) = (point![0.0, 0.0, 1.0], point![1.0, 0.0, 1.0], point![0.0, 1.0, 1.0]);
    let plane = Plane::from_points(&a, &b, &c).unwrap();
    assert_approx_matrix_eq!(plane.normal().into_inner(), vector![0.0, 0.0, 1.0], abstol = 1e-12);
    assert_scalar_eq!(plane.signed_distance(&point![3.0, 4.0, 3.0]), 2.0, comp = abs, tol = 1e-12);
    assert_approx_matrix_eq!(plane.project_point(&point![3.0, 4.0, 3.0]), point![3.0, 4.0, 1.0], abstol = 1e-12);

    let center = point![0.0, 0.0, 1.0];
    let plane = Plane::from_point_and_normal(center, Vector3::z_axis());
    assert_eq!(plane.order(&b, &c), Ordering::Greater);
    assert_eq!(plane.order(&c, &b), Ordering::Less);
    assert_eq!(plane.flipped().order(&b, &c), Ordering::Less);

    assert!(plane_normal(&a, &b, &point![2.0, 0.0, 1.0]).is_none());
}

#[test]
fn coinciding_planes() {
    let p1 = Plane::from_point_and_normal(point![0.0, 0.0, 1.0], Vector3::z_axis());
    let p2 = Plane::from_point_and_normal(point![4.0, -2.0, 1.0], Unit::new_normalize(vector![0.0, 0.0, -3.0]));
    let p3 = Plane::from_point_and_normal(point![0.0, 0.0, 1.5], Vector3::z_axis());

    assert!(p1.coincides_with(&p2));
    assert!(!p1.coincides_with(&p3));
}

#[test]
fn line_segment_projection() {
    let segment = LineSegment3d::new(point![0.0, 0.0, 0.0], point![2.0, 0.0, 0.0]);
    assert_scalar_eq!(segment.length(), 2.0, comp = abs, tol = 1e-12);
    assert_approx_matrix_eq!(segment.midpoint(), point![1.0, 0.0, 0.0], abstol = 1e-12);
    assert_approx_matrix_eq!(
        segment.project_point(&point![0.5, 3.0, 0.0]),
        point![0.5, 0.0, 0.0],
        abstol = 1e-12
    );
    assert_scalar_eq!(segment.distance_to_point(&point![3.0, 0.0, 0.0]), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn tetrahedron_and_triangle_measures() {
    let tet = Tetrahedron::from_vertices([
        point![0.0, 0.0, 0.0],
        point![1.0, 0.0, 0.0],
        point![0.0, 1.0, 0.0],
        point![0.0, 0.0, 1.0],
    ]);
    assert_scalar_eq!(tet.signed_volume(), 1.0 / 6.0, comp = abs, tol = 1e-12);

    let [a, b, c, d] = *tet.vertices();
    let inverted = Tetrahedron::from_vertices([a, c, b, d]);
    assert_scalar_eq!(inverted.signed_volume(), -1.0 / 6.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(inverted.volume(), 1.0 / 6.0, comp = abs, tol = 1e-12);

    let tri = Triangle3d([a, b, c]);
    assert_scalar_eq!(tri.area(), 0.5, comp = abs, tol = 1e-12);
    assert_approx_matrix_eq!(tri.normal().unwrap().into_inner(), vector![0.0, 0.0, 1.0], abstol = 1e-12);
    assert_approx_matrix_eq!(tri.centroid(), point![1.0 / 3.0, 1.0 / 3.0, 0.0], abstol = 1e-12);
}
