use eidolon::concurrency::WorkerPool;
use eidolon::image::{
    create_isotropic_object, generate_contours_from_mask, generate_image_mask, generate_image_stack,
    generate_test_image_stack, merge_colinear_images, resample_image, ImageObject, ImagePlane, StackGeometry,
};
use eidolon::mesh::Contour;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};
use util::xy_circle_contour;

/// Geometry of `slices` planes of 40x40 unit pixels covering `[0, 40]` in x and y.
fn square_stack(slices: usize) -> StackGeometry {
    StackGeometry {
        dims: [40, 40],
        slices,
        timesteps: vec![0.0],
        position: Point3::new(0.0, 40.0, 0.0),
        orientation: UnitQuaternion::identity(),
        spacing: Vector3::new(1.0, 1.0, 1.0),
    }
}

fn circle_mask(pool: &WorkerPool) -> ImageObject {
    let template = generate_image_stack("template", &square_stack(1)).unwrap();
    let contour = Contour::new(xy_circle_contour(Point3::new(20.0, 20.0, 0.0), 10.0, 64), 0.0);
    generate_image_mask(pool, "mask", &template, &[contour], |_, _, _| 1.0).unwrap()
}

#[test]
fn plane_maps_pixels_to_world() {
    let plane = ImagePlane::new(
        "plane",
        Point3::new(0.0, 40.0, 0.0),
        UnitQuaternion::identity(),
        [40, 20],
        Vector2::new(1.0, 2.0),
        0.0,
    )
    .unwrap();
    assert_eq!(plane.pixels().rows(), 20);
    assert_eq!(plane.pixels().cols(), 40);

    let center = plane.pixel_center(0, 0);
    assert_scalar_eq!(center.x, 0.5, comp = abs, tol = 1e-12);
    assert_scalar_eq!(center.y, 39.0, comp = abs, tol = 1e-12);

    let pos = plane.plane_pos(&Point3::new(10.0, 30.0, 0.25), true);
    assert_scalar_eq!(pos.x, 10.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(pos.y, 5.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(pos.z, 0.25, comp = abs, tol = 1e-12);

    assert!(ImagePlane::new("bad", Point3::origin(), UnitQuaternion::identity(), [0, 4], Vector2::repeat(1.0), 0.0).is_err());
}

#[test]
fn stacks_group_planes_by_timestep() {
    let mut geometry = square_stack(3);
    geometry.timesteps = vec![10.0, 0.0];
    let obj = generate_image_stack("stack", &geometry).unwrap();
    assert!(obj.is_time_dependent());
    assert_eq!(obj.timestep_list(), vec![0.0, 10.0]);
    assert_eq!(obj.volume_stacks(), vec![vec![3, 4, 5], vec![0, 1, 2]]);
    assert_eq!(obj.voxel_size().unwrap(), Vector3::new(1.0, 1.0, 1.0));

    let corner = obj.volume_transform().unwrap() * Point3::new(1.0, 1.0, 1.0);
    assert!((corner - Point3::new(40.0, 0.0, 2.0)).norm() <= 1e-12);
}

#[test]
fn circle_mask_covers_circle_area() {
    let pool = WorkerPool::new(2);
    let mask = circle_mask(&pool);
    assert_eq!(mask.images().len(), 1);
    let plane = &mask.images()[0];
    assert_eq!(plane.min_max(), (0.0, 1.0));

    let area = plane.pixels().sum();
    assert!((area - 314.0).abs() <= 20.0, "mask covers {} pixels", area);
    // Row 20 runs through the middle of the circle at y = 19.5
    assert_eq!(plane.pixels().get(20, 20).unwrap(), 1.0);
    assert_eq!(plane.pixels().get(0, 0).unwrap(), 0.0);
}

#[test]
fn contours_lying_off_the_plane_are_ignored() {
    let pool = WorkerPool::new(1);
    let template = generate_image_stack("template", &square_stack(1)).unwrap();
    let contour = Contour::new(xy_circle_contour(Point3::new(20.0, 20.0, 3.0), 10.0, 32), 0.0);
    let mask = generate_image_mask(&pool, "mask", &template, &[contour], |_, _, _| 1.0).unwrap();
    assert_eq!(mask.images()[0].pixels().sum(), 0.0);
}

#[test]
fn mask_contours_follow_the_circle() {
    let pool = WorkerPool::new(2);
    let mask = circle_mask(&pool);
    let contours = generate_contours_from_mask(&mask, 16, 0.2, false).unwrap();
    assert_eq!(contours.len(), 1);
    let contour = &contours[0];
    assert_eq!(contour.points.len(), 16);
    for p in &contour.points {
        let radius = (p - Point3::new(20.0, 20.0, 0.0)).norm();
        assert!((8.5..=10.5).contains(&radius), "contour point {} at radius {}", p, radius);
    }
    assert!(generate_contours_from_mask(&mask, 2, 0.2, false).is_err());
}

#[test]
fn resampling_onto_the_same_grid_keeps_values() {
    let mut geometry = square_stack(4);
    geometry.dims = [8, 8];
    geometry.position = Point3::new(0.0, 8.0, 0.0);
    let src = generate_test_image_stack("src", &geometry).unwrap();
    let dest = generate_image_stack("dest", &geometry).unwrap();
    resample_image(&src, &dest).unwrap();

    for (a, b) in src.images().iter().zip(dest.images()) {
        for (x, y) in a.pixels().to_vec().iter().zip(b.pixels().to_vec()) {
            assert_scalar_eq!(*x, y, comp = abs, tol = 1e-9);
        }
    }
}

#[test]
fn isotropic_object_uses_smallest_voxel_dimension() {
    let plane = ImagePlane::new(
        "plane",
        Point3::new(0.0, 8.0, 0.0),
        UnitQuaternion::identity(),
        [8, 4],
        Vector2::new(1.0, 2.0),
        0.0,
    )
    .unwrap();
    plane.pixels().fill(2.0);
    let obj = ImageObject::new("obj", vec![plane]);

    let iso = create_isotropic_object(&obj, "iso").unwrap();
    let voxel = iso.voxel_size().unwrap();
    assert_eq!(voxel, Vector3::repeat(1.0));
    let resampled = &iso.images()[0];
    assert_eq!((resampled.width(), resampled.height()), (8, 8));
    assert_scalar_eq!(resampled.pixels().get(4, 4).unwrap(), 2.0, comp = abs, tol = 1e-9);
}

#[test]
fn colinear_planes_merge() {
    let a = generate_image_stack("a", &square_stack(1)).unwrap();
    let b = generate_image_stack("b", &square_stack(1)).unwrap();
    let mut shifted = square_stack(1);
    shifted.position.x = 5.0;
    let c = generate_image_stack("c", &shifted).unwrap();
    a.images()[0].pixels().set(1.0, 0, 0).unwrap();
    b.images()[0].pixels().set(2.0, 1, 1).unwrap();
    b.images()[0].pixels().set(3.0, 0, 0).unwrap();

    let merged = merge_colinear_images("merged", &[&a, &b, &c], None).unwrap();
    assert_eq!(merged.images().len(), 2);
    let pixels = merged.images()[0].pixels();
    assert_eq!(pixels.get(0, 0).unwrap(), 3.0);
    assert_eq!(pixels.get(1, 1).unwrap(), 2.0);
    assert_eq!(a.images()[0].pixels().get(1, 1).unwrap(), 0.0);

    let add = |x: f64, y: f64| x + y;
    let summed = merge_colinear_images("summed", &[&a, &b], Some(&add)).unwrap();
    assert_eq!(summed.images()[0].pixels().get(0, 0).unwrap(), 4.0);
}
