use eidolon_geometry::AxisAlignedBoundingBox3d;
use nalgebra::{point, vector};

#[test]
fn aabb_radius_and_margin_containment() {
    let points = [point![0.0, 0.0, 0.0], point![2.0, 0.0, 0.0], point![2.0, 2.0, 1.0]];
    let aabb = AxisAlignedBoundingBox3d::from_points(&points).unwrap();

    assert_eq!(aabb.min(), &vector![0.0, 0.0, 0.0]);
    assert_eq!(aabb.extents(), vector![2.0, 2.0, 1.0]);
    assert_eq!(aabb.center(), point![1.0, 1.0, 0.5]);
    assert!((aabb.radius() - 1.5).abs() < 1e-12);

    // Faces count as inside
    let on_face = point![2.0, 1.0, 0.5];
    assert!(aabb.contains_point_with_margin(&on_face, 0.0));
    assert!(aabb.contains_point_with_margin(&point![2.05, 1.0, 0.5], 0.1));
    assert!(!aabb.contains_point_with_margin(&point![2.5, 1.0, 0.5], 0.1));
}

#[test]
fn aabb_from_no_points_is_none() {
    let points: [nalgebra::Point3<f64>; 0] = [];
    assert!(AxisAlignedBoundingBox3d::from_points(&points).is_none());
}
