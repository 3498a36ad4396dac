use crate::test_dir;
use eidolon::dataset::{props, Dataset};
use eidolon::io::vtk::{read_dataset, read_poly_nodes, write_dataset_legacy, write_dataset_xml, write_poly_nodes};
use eidolon::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use matrixcompare::assert_scalar_eq;
use nalgebra::Point3;

/// Two tetrahedra sharing a face, with a node field and an element field.
fn two_tets() -> Dataset {
    let nodes = Vec3Matrix::from_points(
        "nodes",
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ],
    );
    let mut tets = IndexMatrix::from_rows("tets", &[[0, 1, 2, 3], [1, 2, 3, 4]]);
    tets.set_type_code("Tet1NL");
    let heights = RealMatrix::from_vec("heights", 1, vec![0.0, 0.0, 0.0, 1.0, 1.0]).unwrap();
    let mut labels = RealMatrix::from_vec("labels", 1, vec![3.0, 7.0]).unwrap();
    labels.set_meta(props::TOPOLOGY, "tets");
    labels.set_meta(props::ELEMDATA, "True");
    Dataset::new("twotets", nodes, vec![tets], vec![heights, labels])
}

fn assert_same_mesh(read: &Dataset, written: &Dataset) {
    assert_eq!(read.nodes().rows(), written.nodes().rows());
    for i in 0..read.nodes().rows() {
        let (a, b) = (read.nodes().point(i).unwrap(), written.nodes().point(i).unwrap());
        assert!((a - b).norm() <= 1e-6, "node {} moved from {} to {}", i, b, a);
    }
    let tets = read.index_set("tets").unwrap();
    assert_eq!(tets.type_code(), "Tet1NL");
    assert_eq!(tets.to_vec(), written.index_set("tets").unwrap().to_vec());

    let heights = read.data_field("heights").unwrap();
    assert_eq!(heights.to_vec(), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    let labels = read.data_field("labels").unwrap();
    assert!(read.is_element_field(labels));
    assert_eq!(labels.to_vec(), vec![3.0, 7.0]);
}

#[test]
fn legacy_files_round_trip() {
    let ds = two_tets();
    let path = test_dir("legacy_files_round_trip").join("twotets.vtk");
    write_dataset_legacy(&path, &ds).unwrap();

    let read = read_dataset(&path).unwrap();
    assert_eq!(read.name(), "twotets");
    assert_same_mesh(&read, &ds);
    read.validate().unwrap();
}

#[test]
fn xml_files_round_trip() {
    let ds = two_tets();
    let path = test_dir("xml_files_round_trip").join("twotets.vtu");
    write_dataset_xml(&path, &ds).unwrap();
    assert_same_mesh(&read_dataset(&path).unwrap(), &ds);
}

#[test]
fn hexahedra_keep_lattice_order() {
    let mut points = Vec::new();
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                points.push(Point3::new(i as f64, j as f64, k as f64));
            }
        }
    }
    let nodes = Vec3Matrix::from_points("nodes", &points);
    let mut hexes = IndexMatrix::from_rows("hexes", &[[0, 1, 2, 3, 4, 5, 6, 7]]);
    hexes.set_type_code("Hex1NL");
    let ds = Dataset::new("cube", nodes, vec![hexes], Vec::new());

    let path = test_dir("hexahedra_keep_lattice_order").join("cube.vtk");
    write_dataset_legacy(&path, &ds).unwrap();
    let read = read_dataset(&path).unwrap();
    assert_eq!(read.index_set("hexes").unwrap().to_vec(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn poly_nodes_round_trip() {
    let nodes = Vec3Matrix::from_points("contour", &[Point3::new(0.5, -1.0, 2.0), Point3::new(3.0, 4.0, 5.25)]);
    let path = test_dir("poly_nodes_round_trip").join("contour.vtk");
    write_poly_nodes(&path, &nodes).unwrap();

    let read = read_poly_nodes(&path, "track").unwrap();
    assert_eq!(read.name(), "track");
    assert_eq!(read.rows(), 2);
    assert_scalar_eq!(read.point(1).unwrap().z, 5.25, comp = abs, tol = 1e-6);
    assert!(read_poly_nodes(path.with_file_name("missing.vtk"), "track").is_err());
}
