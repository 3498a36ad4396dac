use eidolon::dataset::{divide_mesh_by_elem_func, is_spatial_index, props, reduce_mesh, Dataset};
use eidolon::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use eidolon::Error;
use nalgebra::Point3;

/// Two triangles of a unit square with a node and an element field.
fn square() -> Dataset {
    let nodes = Vec3Matrix::from_points(
        "nodes",
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ],
    );
    let mut tris = IndexMatrix::from_rows("tris", &[[0, 1, 2], [1, 3, 2]]);
    tris.set_type_code("Tri1NL");
    let heights = RealMatrix::from_vec("heights", 1, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
    let mut labels = RealMatrix::from_vec("labels", 1, vec![1.0, 2.0]).unwrap();
    labels.set_meta(props::TOPOLOGY, "tris");
    labels.set_meta(props::ELEMDATA, "True");
    Dataset::new("square", nodes, vec![tris], vec![heights, labels])
}

#[test]
fn spatial_index_defaults_to_element_dimension() {
    let mut inds = IndexMatrix::with_type("inds", "Tri1NL", 0, 3);
    assert!(is_spatial_index(&inds));
    inds.set_meta(props::IS_SPATIAL, "False");
    assert!(!is_spatial_index(&inds));

    let lookup = IndexMatrix::with_type("lookup", "", 0, 2);
    assert!(!is_spatial_index(&lookup));
    let points = IndexMatrix::with_type("points", "Point", 0, 1);
    assert!(!is_spatial_index(&points));
}

#[test]
fn field_topology_follows_metadata() {
    let ds = square();
    ds.validate().unwrap();

    let labels = ds.data_field("labels").unwrap();
    assert_eq!(ds.field_topology(labels).map(|t| t.name()), Some("tris"));
    assert!(ds.is_element_field(labels));

    let heights = ds.data_field("heights").unwrap();
    assert!(!ds.is_element_field(heights));
    assert_eq!(ds.spatial_index_sets().count(), 1);
}

#[test]
fn validate_rejects_bad_indices_and_field_lengths() {
    let mut ds = square();
    ds.set_data_field(RealMatrix::new("odd", 3, 1));
    assert!(matches!(ds.validate(), Err(Error::Shape { .. })));
    ds.remove_data_field("odd").unwrap();

    ds.set_index_set(IndexMatrix::with_type("tris", "Tri1NL", 1, 3));
    ds.validate().unwrap_err();
    ds.index_set("tris").unwrap().set(4, 0, 2).unwrap();
    assert!(matches!(ds.validate(), Err(Error::Geometry { .. })));
}

#[test]
fn shallow_clones_share_nodes() {
    let ds = square();
    let shallow = ds.clone_with("shallow", false, false, false);
    let deep = ds.clone_with("deep", true, true, true);

    ds.nodes().fill(nalgebra::Vector3::repeat(5.0));
    assert_eq!(shallow.nodes().point(0).unwrap(), Point3::new(5.0, 5.0, 5.0));
    assert_eq!(deep.nodes().point(0).unwrap(), Point3::origin());
    assert_eq!(deep.name(), "deep");
    assert_eq!(deep.data_field("labels").unwrap().meta(props::TOPOLOGY), Some("tris"));
}

#[test]
fn reduce_mesh_merges_coincident_nodes() {
    let nodes = Vec3Matrix::from_points(
        "nodes",
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 1e-9),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ],
    );
    let mut tris = IndexMatrix::from_rows("tris", &[[0, 1, 2], [3, 4, 5]]);
    tris.set_type_code("Tri1NL");

    let reduced = reduce_mesh(&nodes, &[tris], 1e-6).unwrap();
    assert_eq!(reduced.nodes.rows(), 4);
    assert_eq!(reduced.node_map, vec![0, 1, 2, 1, 3, 2]);
    assert_eq!(reduced.indices[0].to_vec(), vec![0, 1, 2, 1, 3, 2]);
    assert_eq!(reduced.indices[0].type_code(), "Tri1NL");
}

#[test]
fn divide_mesh_extracts_chosen_elements() {
    let ds = square();
    let later = ds.clone_with("later", true, false, false);
    later.nodes().add(nalgebra::Vector3::new(0.0, 0.0, 1.0)).unwrap();
    let series = [ds, later];

    let labels = series[0].data_field("labels").unwrap().to_vec();
    let tris = series[0].index_set("tris").unwrap();
    let divided = divide_mesh_by_elem_func(&series, tris, |n| labels[n] == 2.0).unwrap();

    assert_eq!(divided.chosen, vec![1]);
    assert_eq!(divided.datasets.len(), 2);
    let first = &divided.datasets[0];
    assert_eq!(first.nodes().rows(), 3);
    assert_eq!(first.index_set("tris").unwrap().to_vec(), vec![0, 1, 2]);
    assert_eq!(first.data_field("heights").unwrap().to_vec(), vec![0.0, 1.0, 1.0]);
    assert_eq!(first.data_field("labels").unwrap().to_vec(), vec![2.0]);
    assert_eq!(divided.datasets[1].nodes().point(0).unwrap(), Point3::new(1.0, 0.0, 1.0));
}
