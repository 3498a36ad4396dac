use eidolon_geometry::proptest::convex_polygon3d;
use eidolon_geometry::{
    contour_plane, contour_ray_intersections, contours_coplanar, point_in_contour, triangulate_contour, ContourError,
    PlanarContour, Ray, Triangle3d,
};
use matrixcompare::assert_scalar_eq;
use nalgebra::{point, vector, Point3};
use proptest::prelude::*;
use std::collections::HashSet;
use util::xy_circle_contour;

fn triangulated_area(contour: &[Point3<f64>], triangles: &[[usize; 3]]) -> f64 {
    triangles
        .iter()
        .map(|&[a, b, c]| Triangle3d([contour[a], contour[b], contour[c]]).area())
        .sum()
}

#[test]
fn three_point_contour_plane_is_triangle_plane() {
    let contour = [point![1.0, 0.0, 2.0], point![0.0, 3.0, 2.0], point![-1.0, -1.0, 2.5]];
    let plane = contour_plane(&contour).unwrap();
    let expected = Triangle3d(contour).normal().unwrap();

    // Up to sign
    let cos = plane.normal().dot(&expected);
    assert_scalar_eq!(cos.abs(), 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(plane.signed_distance(&contour[2]), 0.0, comp = abs, tol = 1e-12);
}

#[test]
fn colinear_contour_has_no_plane() {
    let contour = [point![0.0, 0.0, 0.0], point![1.0, 0.0, 0.0], point![2.0, 0.0, 0.0]];
    assert_eq!(contour_plane(&contour), Err(ContourError::Colinear));
    assert_eq!(contour_plane(&contour[..2]), Err(ContourError::TooFewPoints(2)));
}

#[test]
fn point_in_circular_contour() {
    let contour = xy_circle_contour(point![5.0, 5.0, 1.0], 2.0, 32);

    assert!(point_in_contour(&point![5.0, 5.0, 1.0], &contour));
    assert!(point_in_contour(&point![6.5, 5.2, 1.0], &contour));
    assert!(point_in_contour(&point![4.0, 4.0, 1.0], &contour));
    assert!(!point_in_contour(&point![7.5, 5.0, 1.0], &contour));
    assert!(!point_in_contour(&point![6.8, 6.8, 1.0], &contour));

    // Off the contour plane
    assert!(!point_in_contour(&point![5.5, 5.0, 1.1], &contour));
}

#[test]
fn point_in_concave_contour() {
    let contour = vec![
        point![0.0, 0.0, 0.0],
        point![2.0, 0.0, 0.0],
        point![2.0, 1.0, 0.0],
        point![1.0, 1.0, 0.0],
        point![1.0, 2.0, 0.0],
        point![0.0, 2.0, 0.0],
    ];
    let planar = PlanarContour::new(contour).unwrap();

    assert!(planar.contains_point(&point![1.0, 0.5, 0.0]));
    assert!(planar.contains_point(&point![0.5, 1.5, 0.0]));
    assert!(planar.contains_point(&point![1.5, 0.5, 0.0]));
    assert!(!planar.contains_point(&point![1.5, 1.5, 0.0]));
}

#[test]
fn ray_contour_intersections() {
    let contour = xy_circle_contour(point![0.0, 0.0, 0.0], 1.0, 64);
    let ray = Ray::new(point![0.0, 0.0, 0.0], vector![1.0, 1.0, 0.0]).unwrap();
    let hits: Vec<_> = contour_ray_intersections(&ray, &contour).collect();

    assert_eq!(hits.len(), 1);
    assert_scalar_eq!(hits[0].coords.norm(), 1.0, comp = abs, tol = 2e-3);
    assert!(hits[0].x > 0.0 && hits[0].y > 0.0);
}

#[test]
fn coplanar_contours() {
    let c1 = xy_circle_contour(point![0.0, 0.0, 0.0], 1.0, 8);
    let c2 = xy_circle_contour(point![0.5, 0.0, 0.0], 3.0, 12);
    let c3 = xy_circle_contour(point![0.0, 0.0, -1.0], 1.0, 8);

    assert!(contours_coplanar(&c1, &c2).unwrap());
    assert!(!contours_coplanar(&c1, &c3).unwrap());
}

#[test]
fn triangulate_unit_square() {
    let square = [
        point![0.0, 0.0, 0.0],
        point![1.0, 0.0, 0.0],
        point![1.0, 1.0, 0.0],
        point![0.0, 1.0, 0.0],
    ];
    let triangles = triangulate_contour(&square, false).unwrap();

    assert_eq!(triangles.len(), 2);
    assert_scalar_eq!(triangulated_area(&square, &triangles), 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn triangulate_concave_contour() {
    let contour = [
        point![0.0, 0.0, 0.0],
        point![2.0, 0.0, 0.0],
        point![2.0, 1.0, 0.0],
        point![1.0, 1.0, 0.0],
        point![1.0, 2.0, 0.0],
        point![0.0, 2.0, 0.0],
    ];
    let triangles = triangulate_contour(&contour, false).unwrap();

    assert_eq!(triangles.len(), 4);
    assert_scalar_eq!(triangulated_area(&contour, &triangles), 3.0, comp = abs, tol = 1e-12);
}

proptest! {
    #[test]
    fn triangulation_of_convex_polygons_covers_polygon(polygon in convex_polygon3d(3..24)) {
        let triangles = triangulate_contour(&polygon, false).unwrap();
        prop_assert_eq!(triangles.len(), polygon.len() - 2);

        for tri in &triangles {
            let distinct: HashSet<_> = tri.iter().collect();
            prop_assert_eq!(distinct.len(), 3);
            prop_assert!(tri.iter().all(|&i| i < polygon.len()));
        }

        // Fan triangulation of a convex polygon gives its area
        let fan: Vec<[usize; 3]> = (1..polygon.len() - 1).map(|i| [0, i, i + 1]).collect();
        let expected = triangulated_area(&polygon, &fan);
        let area = triangulated_area(&polygon, &triangles);
        prop_assert!((area - expected).abs() <= 1e-9 * expected.max(1.0));
    }
}
