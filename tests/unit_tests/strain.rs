use eidolon::dataset::{props, Dataset};
use eidolon::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use eidolon::proptest::{point3, rigid_motion};
use eidolon::strain::{
    calculate_lv_directional_fields, calculate_strain_tensors, calculate_tensor_indicator_eigen, calculate_tensor_mul,
    create_strain_field, create_strain_grid, STENCIL_COLS,
};
use eidolon::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Affine3, Matrix4, Point3, Vector3};
use proptest::prelude::*;
use std::f64::consts::PI;

fn identity() -> Affine3<f64> {
    Affine3::identity()
}

fn stretch_x(s: f64) -> Affine3<f64> {
    Affine3::from_matrix_unchecked(Matrix4::new_nonuniform_scaling(&Vector3::new(s, 1.0, 1.0)))
}

fn sample_nodes() -> Vec3Matrix {
    Vec3Matrix::from_points(
        "nodes",
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, -2.0, 0.5),
            Point3::new(4.0, 3.0, -1.0),
        ],
    )
}

#[test]
fn strain_grid_rows_follow_image_axes() {
    let nodes = Vec3Matrix::from_points("nodes", &[Point3::new(1.0, 2.0, 3.0)]);
    // Image scaling changes positions but not the stencil offsets
    let grid = create_strain_grid(&nodes, &identity(), &stretch_x(2.0), 0.5).unwrap();
    assert_eq!(grid.name(), "straingrid");
    assert_eq!((grid.rows(), grid.cols()), (1, STENCIL_COLS));

    let row = grid.row(0).unwrap();
    assert_eq!(row[0], Vector3::new(2.0, 2.0, 3.0));
    assert_eq!(row[1] - row[0], Vector3::new(0.5, 0.0, 0.0));
    assert_eq!(row[2] - row[0], Vector3::new(-0.5, 0.0, 0.0));
    assert_eq!(row[3] - row[0], Vector3::new(0.0, 0.5, 0.0));
    assert_eq!(row[6] - row[0], Vector3::new(0.0, 0.0, -0.5));
}

#[test]
fn uniform_stretch_gives_known_strain() {
    let h = 0.1;
    let grid = create_strain_grid(&sample_nodes(), &identity(), &identity(), h).unwrap();
    grid.transform(&stretch_x(1.1));

    let tensors = calculate_strain_tensors(&grid, h).unwrap();
    assert_eq!(tensors.name(), "straintensors");
    assert_eq!((tensors.rows(), tensors.cols()), (3, 9));
    for n in 0..3 {
        let row = tensors.row(n).unwrap();
        assert_scalar_eq!(row[0], 0.105, comp = abs, tol = 1e-12);
        for value in &row[1..] {
            assert_scalar_eq!(*value, 0.0, comp = abs, tol = 1e-12);
        }
    }

    let (max, min) = calculate_tensor_indicator_eigen(&tensors).unwrap();
    assert_eq!((max.name(), min.name()), ("maxstrain", "minstrain"));
    for n in 0..3 {
        assert_scalar_eq!(max.get(n, 0).unwrap(), 0.105, comp = abs, tol = 1e-12);
        assert_scalar_eq!(min.get(n, 0).unwrap(), 0.0, comp = abs, tol = 1e-12);
    }

    let along_x = Vec3Matrix::from_vec("dirs", 1, vec![Vector3::x(); 3]).unwrap();
    let along_y = Vec3Matrix::from_vec("dirs", 1, vec![Vector3::y(); 3]).unwrap();
    let xx = calculate_tensor_mul(&tensors, &along_x, "xstrain").unwrap();
    let yy = calculate_tensor_mul(&tensors, &along_y, "ystrain").unwrap();
    assert_eq!(xx.name(), "xstrain");
    assert_scalar_eq!(xx.get(1, 0).unwrap(), 0.105, comp = abs, tol = 1e-12);
    assert_scalar_eq!(yy.get(1, 0).unwrap(), 0.0, comp = abs, tol = 1e-12);
}

#[test]
fn diagonal_shear_has_opposite_principal_strains() {
    // x' = x + k y gives F = [[1, k], [0, 1]] in the xy plane
    let k = 0.2;
    let shear = Affine3::from_matrix_unchecked(Matrix4::new(
        1.0, k, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ));
    let grid = create_strain_grid(&sample_nodes(), &identity(), &identity(), 0.25).unwrap();
    grid.transform(&shear);
    let tensors = calculate_strain_tensors(&grid, 0.25).unwrap();

    let row = tensors.row(0).unwrap();
    assert_scalar_eq!(row[1], k / 2.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(row[3], k / 2.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(row[4], k * k / 2.0, comp = abs, tol = 1e-12);

    // Eigenvalues of [[0, k/2], [k/2, k^2/2]]
    let mid = k * k / 4.0;
    let radius = (mid * mid + k * k / 4.0).sqrt();
    let (max, min) = calculate_tensor_indicator_eigen(&tensors).unwrap();
    assert_scalar_eq!(max.get(0, 0).unwrap(), mid + radius, comp = abs, tol = 1e-12);
    assert_scalar_eq!(min.get(0, 0).unwrap(), mid - radius, comp = abs, tol = 1e-12);
}

#[test]
fn stencil_shape_and_size_are_checked() {
    let wide = Vec3Matrix::new("wide", 2, 6);
    assert!(matches!(calculate_strain_tensors(&wide, 0.1), Err(Error::Shape { .. })));

    let grid = create_strain_grid(&sample_nodes(), &identity(), &identity(), 0.1).unwrap();
    assert!(matches!(calculate_strain_tensors(&grid, 0.0), Err(Error::Geometry { .. })));
    assert!(matches!(calculate_strain_tensors(&grid, -1.0), Err(Error::Geometry { .. })));

    let tensors = calculate_strain_tensors(&grid, 0.1).unwrap();
    let too_few = Vec3Matrix::from_vec("dirs", 1, vec![Vector3::x(); 2]).unwrap();
    assert!(matches!(
        calculate_tensor_mul(&tensors, &too_few, "strain"),
        Err(Error::Shape { .. })
    ));
    let not_tensors = RealMatrix::new("flat", 3, 3);
    assert!(calculate_tensor_indicator_eigen(&not_tensors).is_err());
}

#[test]
fn strain_field_uses_scaled_directions() {
    let nodes = Vec3Matrix::from_points("nodes", &[Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)]);
    let radial = Vec3Matrix::from_vec("radial", 1, vec![Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 3.0, 0.0)]).unwrap();
    let circumferential =
        Vec3Matrix::from_vec("circumferential", 1, vec![Vector3::y(), -Vector3::x()]).unwrap();
    let longitudinal = Vec3Matrix::from_vec("longitudinal", 1, vec![Vector3::z() * 5.0; 2]).unwrap();

    let field = create_strain_field(&nodes, &radial, &longitudinal, &circumferential, 0.1).unwrap();
    assert_eq!(field.name(), "strainfield");
    assert_eq!((field.rows(), field.cols()), (2, STENCIL_COLS));
    let row = field.row(1).unwrap();
    assert!((row[1] - Vector3::new(0.0, 1.1, 0.0)).norm() <= 1e-12);
    assert!((row[4] - Vector3::new(0.1, 1.0, 0.0)).norm() <= 1e-12);
    assert!((row[5] - Vector3::new(0.0, 1.0, 0.1)).norm() <= 1e-12);

    let short = Vec3Matrix::from_vec("radial", 1, vec![Vector3::x()]).unwrap();
    assert!(matches!(
        create_strain_field(&nodes, &short, &longitudinal, &circumferential, 0.1),
        Err(Error::Shape { .. })
    ));
}

/// Three rings tapering from radius 2 at z = 0 to radius 0.3 at z = -3.
fn tapering_shell() -> Dataset {
    let mut points = Vec::new();
    for (z, radius) in [(0.0, 2.0), (-1.5, 1.0), (-3.0, 0.3)] {
        for i in 0..8 {
            let theta = i as f64 * PI / 4.0;
            points.push(Point3::new(radius * theta.cos(), radius * theta.sin(), z));
        }
    }
    let mut tris = IndexMatrix::from_rows("inds", &[[0, 1, 8], [8, 9, 16]]);
    tris.set_type_code("Tri1NL");
    Dataset::new("shell", Vec3Matrix::from_points("nodes", &points), vec![tris], vec![])
}

#[test]
fn directional_fields_point_away_from_the_wide_end() {
    let ds = tapering_shell();
    let fields = calculate_lv_directional_fields(&ds, &Vector3::new(0.0, 0.0, 2.0)).unwrap();

    for field in [&fields.radial, &fields.longitudinal, &fields.circumferential] {
        assert_eq!(field.rows(), 24);
        assert_eq!(field.meta(props::TOPOLOGY), Some("inds"));
        assert!(field.meta_flag(props::TIMECOPY));
    }
    assert_eq!(fields.longitudinal.name(), "longitudinal");

    // The wide ring is the base, so the longitudinal direction runs down towards the narrow end
    let longitudinal = fields.longitudinal.point(0).unwrap();
    assert!((longitudinal - Point3::new(0.0, 0.0, -1.0)).norm() <= 1e-9);

    let radial = fields.radial.point(0).unwrap();
    assert!((radial - Point3::new(1.0, 0.0, 0.0)).norm() <= 1e-9);
    let circumferential = fields.circumferential.point(0).unwrap();
    assert!((circumferential - Point3::new(0.0, -1.0, 0.0)).norm() <= 1e-9);

    // Node 10 sits at theta = pi/2 on the middle ring
    let radial = fields.radial.point(10).unwrap();
    assert!((radial - Point3::new(0.0, 1.0, 0.0)).norm() <= 1e-9);
}

#[test]
fn directional_fields_need_a_topology_and_an_axis() {
    let ds = tapering_shell();
    assert!(calculate_lv_directional_fields(&ds, &Vector3::zeros()).is_err());

    let bare = Dataset::new("bare", ds.nodes().clone_named("nodes"), vec![], vec![]);
    assert!(matches!(
        calculate_lv_directional_fields(&bare, &Vector3::z()),
        Err(Error::Geometry { .. })
    ));
}

proptest! {
    #[test]
    fn rigid_motion_gives_no_strain(motion in rigid_motion(), node in point3()) {
        let h = 0.1;
        let nodes = Vec3Matrix::from_points("nodes", &[node]);
        let grid = create_strain_grid(&nodes, &identity(), &identity(), h).unwrap();
        grid.transform(&Affine3::from_matrix_unchecked(motion.to_homogeneous()));

        let tensors = calculate_strain_tensors(&grid, h).unwrap();
        for value in tensors.to_vec() {
            prop_assert!(value.abs() <= 1e-9, "rigid motion gave strain {}", value);
        }
    }
}
