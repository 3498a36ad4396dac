use eidolon::geometry::triangulate_contour;
use eidolon::mesh::{
    calculate_cavity_field, cart_to_polar_xi, generate_apex_contours, generate_default_hemisphere_mesh,
    generate_hemisphere, generate_hemisphere_surface, generate_hemisphere_volume, generate_sphere, get_hemi_axis,
    HemisphereParams,
};
use eidolon::proptest::star_polygon;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use util::xy_circle_contour;

/// Circles of 16 points at z = 0, -1, -2 with radii 1, 0.9 and 0.6.
fn tapering_stack() -> Vec<Vec<Point3<f64>>> {
    [(0.0, 1.0), (-1.0, 0.9), (-2.0, 0.6)]
        .iter()
        .map(|&(z, r)| xy_circle_contour(Point3::new(0.0, 0.0, z), r, 16))
        .collect()
}

#[test]
fn procedural_spheres_are_subdivided_icosahedra() {
    let sphere = generate_sphere(1);
    assert_eq!(sphere.triangles.len(), 80);
    assert_eq!(sphere.vertices.len(), 42);
    assert!(sphere.vertices.iter().all(|v| (v.coords.norm() - 1.0).abs() <= 1e-12));

    let hemisphere = generate_hemisphere(2);
    assert_eq!(hemisphere.triangles.len(), 160);
    assert!(hemisphere.vertices.iter().all(|v| v.z >= -1e-12));
    for &[a, b, c] in &hemisphere.triangles {
        let (a, b, c) = (hemisphere.vertices[a], hemisphere.vertices[b], hemisphere.vertices[c]);
        let normal = (b - a).cross(&(c - a));
        assert!(normal.dot(&(a.coords + b.coords + c.coords)) > 0.0, "triangle faces inwards");
    }
}

#[test]
fn polar_xi_of_pole_and_equator() {
    let pole = cart_to_polar_xi(&Vector3::new(0.0, 0.0, 1.0));
    assert_scalar_eq!(pole.y, 1.0, comp = abs, tol = 1e-12);
    let east = cart_to_polar_xi(&Vector3::new(1.0, 0.0, 0.0));
    assert_scalar_eq!(east.x, 0.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(east.y, 0.0, comp = abs, tol = 1e-12);
    let south = cart_to_polar_xi(&Vector3::new(0.0, -1.0, 0.0));
    assert_scalar_eq!(south.x, 0.75, comp = abs, tol = 1e-12);
}

#[test]
fn hemi_axis_points_from_base_to_apex() {
    let stack = tapering_stack();
    let axis = get_hemi_axis(&stack).unwrap();
    assert_scalar_eq!(axis.z, -1.0, comp = abs, tol = 1e-9);

    let (apex, closing) = generate_apex_contours(&stack, 0.5, None).unwrap();
    assert_eq!(closing.len(), 3);
    assert!(closing.iter().all(|c| c.len() == 16));
    assert_scalar_eq!(apex.z, -2.7, comp = abs, tol = 1e-9);
    assert!(closing[1].iter().all(|p| *p == apex));

    let given = Point3::new(0.0, 0.0, -3.0);
    let (apex, _) = generate_apex_contours(&stack, 0.5, Some(given)).unwrap();
    assert_eq!(apex, given);
    assert!(generate_apex_contours(&stack[..1], 0.5, None).is_err());
}

#[test]
fn hemisphere_surface_through_tapering_circles() {
    let params = HemisphereParams {
        start_pos: Some(Point3::new(1.0, 0.0, 0.0)),
        ..HemisphereParams::default()
    };
    let ds = generate_hemisphere_surface("lv", &tapering_stack(), &params, false).unwrap();
    assert_eq!(ds.name(), "lvDS");
    ds.validate().unwrap();

    let inds = ds.index_set("inds").unwrap();
    assert_eq!(inds.type_code(), "Tri1NL");
    assert_eq!(inds.rows(), 640);

    let lowest = ds
        .nodes()
        .points()
        .iter()
        .map(|p| p.z)
        .fold(f64::INFINITY, f64::min);
    assert!((-2.8..=-2.4).contains(&lowest), "apex at z = {}", lowest);
    let highest = ds
        .nodes()
        .points()
        .iter()
        .map(|p| p.z)
        .fold(f64::NEG_INFINITY, f64::max);
    assert_scalar_eq!(highest, 0.0, comp = abs, tol = 1e-9);

    let aha = ds.data_field("AHA").unwrap();
    assert_eq!(aha.rows(), 640);
    assert!(ds.is_element_field(aha));
    let regions = aha.to_vec();
    assert!(regions.iter().all(|&r| (1.0..=17.0).contains(&r) && r.fract() == 0.0));
    assert!(regions.contains(&17.0));
    assert!(regions.contains(&1.0));
}

#[test]
fn hemisphere_surface_without_aha_has_no_fields() {
    let params = HemisphereParams {
        refine: 0,
        calc_aha: false,
        ..HemisphereParams::default()
    };
    let ds = generate_hemisphere_surface("plain", &tapering_stack(), &params, false).unwrap();
    assert_eq!(ds.index_set("inds").unwrap().rows(), 40);
    assert!(ds.data_fields().is_empty());
}

#[test]
fn hemisphere_volume_through_paired_circles() {
    let mut contours = Vec::new();
    for (z, r) in [(0.0, 1.0), (-1.0, 0.9), (-2.0, 0.6)] {
        contours.push(xy_circle_contour(Point3::new(0.0, 0.0, z), r, 12));
        contours.push(xy_circle_contour(Point3::new(0.0, 0.0, z), r * 0.7, 12));
    }
    let params = HemisphereParams {
        refine: 0,
        start_pos: Some(Point3::new(1.0, 0.0, 0.0)),
        ..HemisphereParams::default()
    };
    let ds = generate_hemisphere_volume("wall", &contours, &params, false).unwrap();
    ds.validate().unwrap();
    let inds = ds.index_set("inds").unwrap();
    assert_eq!(inds.type_code(), "Tet1NL");
    assert_eq!(inds.rows(), 40 * 14);
    let regions = ds.data_field("AHA").unwrap().to_vec();
    assert!(regions.iter().all(|&r| (1.0..=17.0).contains(&r)));
}

#[test]
fn default_hemisphere_mesh_has_shell_topology() {
    let mesh =
        generate_default_hemisphere_mesh(0, &Point3::origin(), &Vector3::repeat(1.0), 1.0, 0.8, 8, 4).unwrap();
    assert_eq!(mesh.indices.rows(), 40 * 14);
    assert_eq!(mesh.nodes.rows(), mesh.xis.rows());
    let num_nodes = mesh.nodes.rows();
    assert!(mesh.indices.to_vec().iter().all(|&i| i >= 0 && (i as usize) < num_nodes));
    assert!(mesh.xis.read().iter().all(|xi| (0.0..=1.0).contains(&xi.z)));

    let cavity = calculate_cavity_field(&mesh.xis, &mesh.indices).unwrap();
    assert_eq!(cavity.name(), "cavity");
    assert!(cavity.to_vec().iter().all(|&r| (18.0..=23.0).contains(&r)));

    assert!(generate_default_hemisphere_mesh(0, &Point3::origin(), &Vector3::repeat(1.0), 1.0, 0.8, 2, 4).is_err());
}

proptest! {
    #[test]
    fn star_polygons_triangulate_into_n_minus_2_triangles(polygon in star_polygon(3..24)) {
        let triangles = triangulate_contour(&polygon, true).unwrap();
        prop_assert_eq!(triangles.len(), polygon.len() - 2);
        for [a, b, c] in triangles {
            prop_assert!(a != b && b != c && a != c);
            prop_assert!(a < polygon.len() && b < polygon.len() && c < polygon.len());
        }
    }
}
