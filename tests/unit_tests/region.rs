use eidolon::concurrency::WorkerPool;
use eidolon::dataset::{props, Dataset};
use eidolon::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use eidolon::region::{
    calculate_avg_displacement, calculate_lin_tet_volume, calculate_region_thicknesses,
    calculate_region_volume_summary, surface_triangles,
};
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point3, Vector3};

fn labels(name: &str, topology: &str, values: Vec<f64>) -> RealMatrix {
    let mut field = RealMatrix::from_vec(name, 1, values).unwrap();
    field.set_meta(props::TOPOLOGY, topology);
    field.set_meta(props::ELEMDATA, "True");
    field
}

/// Two tetrahedra sharing a face, scaled by `scale`, with the far vertex of the second one at
/// `k * (1, 1, 1)`. Their volumes are `scale³ / 6` and `scale³ * |3k - 1| / 6`.
fn two_tets(scale: f64, k: f64) -> Dataset {
    let points: Vec<Point3<f64>> = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(k, k, k),
    ]
    .iter()
    .map(|p| p * scale)
    .collect();
    let mut tets = IndexMatrix::from_rows("tets", &[[0, 1, 2, 3], [1, 2, 3, 4]]);
    tets.set_type_code("Tet1NL");
    Dataset::new(
        "tets",
        Vec3Matrix::from_points("nodes", &points),
        vec![tets],
        vec![labels("regions", "tets", vec![1.0, 2.0])],
    )
}

/// A slab of 4x4x1 hexahedra of height `height` over `[0, 4]²`, all in region 1.
fn hex_slab(height: f64) -> Dataset {
    let mut points = Vec::new();
    for z in 0..2 {
        for y in 0..5 {
            for x in 0..5 {
                points.push(Point3::new(x as f64, y as f64, z as f64 * height));
            }
        }
    }
    let n = |x: i64, y: i64, z: i64| x + 5 * y + 25 * z;
    let mut rows = Vec::new();
    for j in 0..4 {
        for i in 0..4 {
            rows.push([
                n(i, j, 0),
                n(i + 1, j, 0),
                n(i, j + 1, 0),
                n(i + 1, j + 1, 0),
                n(i, j, 1),
                n(i + 1, j, 1),
                n(i, j + 1, 1),
                n(i + 1, j + 1, 1),
            ]);
        }
    }
    let mut hexes = IndexMatrix::from_rows("hexes", &rows);
    hexes.set_type_code("Hex1NL");
    Dataset::new(
        "slab",
        Vec3Matrix::from_points("nodes", &points),
        vec![hexes],
        vec![labels("regions", "hexes", vec![1.0; 16])],
    )
}

#[test]
fn surface_triangles_drop_shared_faces_and_face_outwards() {
    let ds = two_tets(1.0, 1.0);
    let surface = surface_triangles(ds.nodes(), ds.index_set("tets").unwrap()).unwrap();
    assert_eq!(surface.triangles.len(), 6);
    assert_eq!(surface.elements.iter().filter(|&&e| e == 0).count(), 3);

    let slab = hex_slab(0.2);
    let surface = surface_triangles(slab.nodes(), slab.index_set("hexes").unwrap()).unwrap();
    // 16 quads on top and bottom, 4 on each side, two triangles each
    assert_eq!(surface.triangles.len(), 96);
    let points = slab.nodes().points();
    let center = Point3::new(2.0, 2.0, 0.1);
    for [a, b, c] in &surface.triangles {
        let (a, b, c) = (points[*a], points[*b], points[*c]);
        let normal = (b - a).cross(&(c - a));
        let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
        assert!(normal.dot(&(centroid - center)) > 0.0);
    }
}

#[test]
fn slab_thickness_ignores_the_sides() {
    let pool = WorkerPool::new(2);
    let thicker = hex_slab(0.4);
    let mut series = vec![hex_slab(0.2), thicker];
    let field = series[0].data_field("regions").unwrap().clone_named("regions");

    let thicknesses = calculate_region_thicknesses(&pool, &mut series, &field, &[1], 1.0).unwrap();
    assert_eq!(thicknesses.len(), 2);
    assert_scalar_eq!(thicknesses[0][0], 0.2, comp = abs, tol = 1e-9);
    assert_scalar_eq!(thicknesses[1][0], 0.4, comp = abs, tol = 1e-9);

    let field = series[1].data_field("RegionThickness").unwrap();
    assert!(series[1].is_element_field(field));
    assert!(field.to_vec().iter().all(|&t| (t - 0.4).abs() <= 1e-9));
}

#[test]
fn region_fields_need_a_topology() {
    let pool = WorkerPool::new(1);
    let mut series = vec![hex_slab(0.2)];
    let orphan = RealMatrix::from_vec("orphan", 1, vec![1.0; 16]).unwrap();
    assert!(calculate_region_thicknesses(&pool, &mut series, &orphan, &[1], 1.0).is_err());
    let short = labels("short", "hexes", vec![1.0; 3]);
    assert!(calculate_avg_displacement(&mut series, &short, &[1], 1.0).is_err());
}

#[test]
fn translated_surfaces_are_displaced_uniformly() {
    let moved = two_tets(1.0, 1.0);
    moved.nodes().add(Vector3::new(0.0, 0.0, 1.0)).unwrap();
    let mut series = vec![two_tets(1.0, 1.0), moved];
    let field = series[0].data_field("regions").unwrap().clone_named("regions");

    let displacements = calculate_avg_displacement(&mut series, &field, &[1, 2], 1.0).unwrap();
    assert_eq!(displacements[0], vec![0.0, 0.0]);
    assert_scalar_eq!(displacements[1][0], 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(displacements[1][1], 1.0, comp = abs, tol = 1e-12);
    assert!(series[1].data_field("RegionDisplacement").is_some());
}

#[test]
fn tet_volumes_per_region() {
    let mut series = vec![two_tets(1.0, 1.0), two_tets(2.0, 1.0)];
    let field = series[0].data_field("regions").unwrap().clone_named("regions");
    let volumes = calculate_lin_tet_volume(&mut series, &field, &[2, 1]).unwrap();
    assert_scalar_eq!(volumes[0][0], 1.0 / 3.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(volumes[0][1], 1.0 / 6.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(volumes[1][0], 8.0 / 3.0, comp = abs, tol = 1e-12);

    let per_element = series[1].data_field("volumes").unwrap();
    assert!(series[1].is_element_field(per_element));
    let per_element = per_element.to_vec();
    assert_scalar_eq!(per_element[0], 8.0 / 6.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(per_element[1], 8.0 / 3.0, comp = abs, tol = 1e-12);

    let mut slab = vec![hex_slab(0.2)];
    let field = slab[0].data_field("regions").unwrap().clone_named("regions");
    assert!(calculate_lin_tet_volume(&mut slab, &field, &[1]).is_err());
}

#[test]
fn volume_summary_of_a_contracting_cavity() {
    // Region 1 is smallest at 100 ms, region 2 at 200 ms
    let mut series = vec![two_tets(10.0, 1.0), two_tets(8.0, 1.0), two_tets(9.0, 0.6)];
    let field = series[0].data_field("regions").unwrap().clone_named("regions");
    let timesteps = [0.0, 100.0, 200.0];

    let summary = calculate_region_volume_summary(&mut series, &field, &[1, 2], &timesteps, None).unwrap();
    let expected = [0.5, 0.256, (729.0 / 6.0 + 729.0 * 0.8 / 6.0) / 1000.0];
    for (v, e) in summary.timestep_volumes.iter().zip(expected) {
        assert_scalar_eq!(*v, e, comp = abs, tol = 1e-9);
    }
    assert_scalar_eq!(summary.edv, 0.5, comp = abs, tol = 1e-9);
    assert_scalar_eq!(summary.esv, expected[2], comp = abs, tol = 1e-9);
    assert_scalar_eq!(summary.stroke_volume, 0.5 - expected[2], comp = abs, tol = 1e-9);
    assert_scalar_eq!(summary.ejection_fraction, (0.5 - expected[2]) * 200.0, comp = abs, tol = 1e-9);

    let sdi = 50.0 * 2f64.sqrt();
    assert_scalar_eq!(summary.sdi_time, sdi, comp = abs, tol = 1e-9);
    assert_scalar_eq!(summary.sdi_percent, sdi / 2.0, comp = abs, tol = 1e-9);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["timestep_volumes"].as_array().map(Vec::len), Some(3));
    assert!(json["ejection_fraction"].is_f64());

    let at_60_bpm = calculate_region_volume_summary(&mut series, &field, &[1, 2], &timesteps, Some(60.0)).unwrap();
    assert_scalar_eq!(at_60_bpm.sdi_percent, sdi / 10.0, comp = abs, tol = 1e-9);

    let mut still = vec![two_tets(1.0, 1.0), two_tets(1.0, 1.0)];
    assert!(calculate_region_volume_summary(&mut still, &field, &[1, 2], &[0.0, 1.0], None).is_err());
    assert!(calculate_region_volume_summary(&mut series, &field, &[1, 2], &[0.0, 1.0], None).is_err());
}
