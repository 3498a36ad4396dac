//! Region-wise analysis of time series of meshes labelled with an element field.
//!
//! The datasets of a series share their topology and differ only in node positions. A region field
//! holds one label per element of the spatial topology, such as the AHA fields of
//! [`calculate_aha_field`](crate::mesh::calculate_aha_field).
use crate::concurrency::{sum_result_map, WorkerPool};
use crate::dataset::{props, Dataset};
use crate::element::{element_type, GeomType};
use crate::error::{Error, Result};
use crate::geometry::{Ray, Tetrahedron, Triangle3d};
use crate::matrix::{IndexMatrix, RealMatrix, Vec3Matrix};
use crate::util::{avg_dev_range, min_max, stddev};
use nalgebra::Point3;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Below this many triangles region thicknesses are computed serially.
const THICKNESS_THRESHOLD: usize = 2000;

/// Triangles on the boundary of a mesh, each with the element it is a face of.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceTriangles {
    /// Node indices, wound so that normals point out of the element.
    pub triangles: Vec<[usize; 3]>,
    pub elements: Vec<usize>,
}

/// Orients `tri` so that its normal points away from `far`.
fn orient_away(nodes: &[Point3<f64>], tri: [usize; 3], far: usize) -> [usize; 3] {
    let t = Triangle3d([nodes[tri[0]], nodes[tri[1]], nodes[tri[2]]]);
    if t.area_vector().dot(&(t.centroid() - nodes[far])) < 0.0 {
        [tri[0], tri[2], tri[1]]
    } else {
        tri
    }
}

/// Splits a face given by its vertices in lattice order into triangles.
fn face_triangles(vertices: &[usize]) -> Vec<[usize; 3]> {
    match *vertices {
        [a, b, c] => vec![[a, b, c]],
        [a, b, c, d] => vec![[a, b, d], [a, d, c]],
        _ => Vec::new(),
    }
}

/// Finds the boundary triangles of a linear triangle, quad, tetrahedron or hexahedron topology.
///
/// Every element of a 2D topology is part of the surface. For 3D topologies faces shared by two
/// elements are internal and dropped. Quad faces are split in two triangles.
pub fn surface_triangles(nodes: &Vec3Matrix, inds: &IndexMatrix) -> Result<SurfaceTriangles> {
    let et = element_type(inds.type_code())?;
    let rows = inds.index_rows()?;
    let points = nodes.points();
    if let Some(&bad) = rows.iter().flatten().find(|&&i| i >= points.len()) {
        return Err(Error::geometry(
            inds.name(),
            format!("index {} out of range for {} nodes", bad, points.len()),
        ));
    }

    let mut result = SurfaceTriangles::default();
    match et.geom() {
        GeomType::Tri | GeomType::Quad => {
            for (n, row) in rows.iter().enumerate() {
                let vertices: Vec<usize> = et.vertices().iter().map(|&v| row[v]).collect();
                for tri in face_triangles(&vertices) {
                    result.triangles.push(tri);
                    result.elements.push(n);
                }
            }
        }
        GeomType::Tet | GeomType::Hex => {
            // Sorted face vertices to (count, vertices, element, far vertex)
            let mut faces: FxHashMap<Vec<usize>, (usize, Vec<usize>, usize, usize)> = FxHashMap::default();
            let mut order = Vec::new();
            for (n, row) in rows.iter().enumerate() {
                for face in 0..et.num_faces() {
                    let vertices: Vec<usize> = et.face_vertex_indices(face).iter().map(|&v| row[v]).collect();
                    let far = et
                        .face_far_index(face)
                        .map(|v| row[v])
                        .ok_or_else(|| Error::basis(et.name(), "face without far vertex"))?;
                    let mut key = vertices.clone();
                    key.sort_unstable();
                    match faces.get_mut(&key) {
                        Some(entry) => entry.0 += 1,
                        None => {
                            order.push(key.clone());
                            faces.insert(key, (1, vertices, n, far));
                        }
                    }
                }
            }
            for key in order {
                let (count, vertices, n, far) = &faces[&key];
                if *count != 1 {
                    continue;
                }
                for tri in face_triangles(vertices) {
                    result.triangles.push(orient_away(&points, tri, *far));
                    result.elements.push(*n);
                }
            }
        }
        _ => {
            return Err(Error::basis(
                et.name(),
                "surface triangles need a triangle, quad, tetrahedron or hexahedron topology",
            ))
        }
    }
    Ok(result)
}

/// Splits `surface` by the region label of each triangle's element, giving one triangle list per
/// value of `choose` in the same order.
pub fn divide_tris_by_elem_val(
    surface: &SurfaceTriangles,
    region_field: &RealMatrix,
    choose: &[i64],
) -> Result<Vec<(i64, Vec<[usize; 3]>)>> {
    let labels = region_field.to_vec();
    let mut regions: Vec<(i64, Vec<[usize; 3]>)> = choose.iter().map(|&c| (c, Vec::new())).collect();
    for (tri, &elem) in surface.triangles.iter().zip(&surface.elements) {
        let label = labels.get(elem).ok_or_else(|| {
            Error::shape(
                region_field.name(),
                format!("no region label for element {}", elem),
            )
        })?;
        if let Some((_, tris)) = regions.iter_mut().find(|(c, _)| *c as f64 == label.round()) {
            tris.push(*tri);
        }
    }
    Ok(regions)
}

/// The index matrix a region field labels: its `spatial` metadata, then its `topology`.
fn region_topology<'a>(ds: &'a Dataset, region_field: &RealMatrix) -> Result<&'a IndexMatrix> {
    let inds = [props::SPATIAL, props::TOPOLOGY]
        .iter()
        .filter_map(|key| region_field.meta(key))
        .find_map(|name| ds.index_set(name))
        .ok_or_else(|| Error::geometry(region_field.name(), "cannot find the topology of the region field"))?;
    if inds.rows() != region_field.rows() {
        return Err(Error::shape(
            region_field.name(),
            format!("{} labels for {} elements of {:?}", region_field.rows(), inds.rows(), inds.name()),
        ));
    }
    Ok(inds)
}

fn check_series(datasets: &[Dataset], region_field: &RealMatrix) -> Result<()> {
    let first = datasets
        .first()
        .ok_or_else(|| Error::geometry(region_field.name(), "no datasets given"))?;
    let num_nodes = first.nodes().rows();
    if let Some(ds) = datasets.iter().find(|ds| ds.nodes().rows() != num_nodes) {
        return Err(Error::shape(
            ds.name(),
            format!("dataset has {} nodes, expected {}", ds.nodes().rows(), num_nodes),
        ));
    }
    Ok(())
}

/// An element field holding, for each element, the value of its region or 0.
fn region_value_field(name: &str, region_field: &RealMatrix, choose: &[i64], values: &[f64]) -> Result<RealMatrix> {
    let data = region_field
        .to_vec()
        .iter()
        .map(|label| {
            choose
                .iter()
                .position(|&c| c as f64 == label.round())
                .map_or(0.0, |i| values[i])
        })
        .collect();
    let mut field = RealMatrix::from_vec(name, 1, data)?;
    for key in [props::SPATIAL, props::TOPOLOGY] {
        if let Some(value) = region_field.meta(key) {
            field.set_meta(key, value);
        }
    }
    field.set_meta(props::ELEMDATA, "True");
    Ok(field)
}

/// Thickness of a surface region: rays cast inwards from every triangle center to the first other
/// triangle hit, averaged within `stddev_range` standard deviations.
fn region_thickness(nodes: &[Point3<f64>], tris: &[[usize; 3]], stddev_range: f64) -> f64 {
    let triangles: Vec<Triangle3d<f64>> = tris
        .iter()
        .map(|t| Triangle3d([nodes[t[0]], nodes[t[1]], nodes[t[2]]]))
        .collect();

    let lengths: Vec<f64> = triangles
        .iter()
        .enumerate()
        .filter_map(|(i, tri)| {
            let ray = Ray::new(tri.centroid(), -tri.area_vector())?;
            triangles
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .filter_map(|(_, other)| {
                    let [a, b, c] = &other.0;
                    ray.intersect_triangle(a, b, c).map(|hit| hit.t)
                })
                .min_by_key(|&t| OrderedFloat(t))
        })
        .collect();
    avg_dev_range(&lengths, stddev_range)
}

/// Computes the wall thickness of each region of `choose` for every dataset of a time series.
///
/// The surface of the topology labelled by `region_field` is split into regions once, using the
/// first dataset. Regions are distributed over the workers of `pool`. Each dataset receives an
/// element field `RegionThickness`. The result has one row per dataset and one column per region.
pub fn calculate_region_thicknesses(
    pool: &WorkerPool,
    datasets: &mut [Dataset],
    region_field: &RealMatrix,
    choose: &[i64],
    stddev_range: f64,
) -> Result<Vec<Vec<f64>>> {
    check_series(datasets, region_field)?;
    let inds = region_topology(&datasets[0], region_field)?;
    let surface = surface_triangles(datasets[0].nodes(), inds)?;
    let regions = Arc::new(divide_tris_by_elem_val(&surface, region_field, choose)?);
    let nparts = pool.choose_proc_count(surface.triangles.len(), 0, THICKNESS_THRESHOLD);

    let mut results = Vec::with_capacity(datasets.len());
    for ds in datasets.iter_mut() {
        let nodes = Arc::new(ds.nodes().points());
        let job_regions = Arc::clone(&regions);
        let parts = pool.run(regions.len(), nparts, None, move |worker| {
            let mut out = Vec::new();
            for r in worker.range() {
                worker.check_stop()?;
                out.push((r, region_thickness(&nodes, &job_regions[r].1, stddev_range)));
            }
            Ok(out)
        })?;

        let mut thicknesses = sum_result_map(parts)?;
        thicknesses.sort_by_key(|(r, _)| *r);
        let values: Vec<f64> = thicknesses.into_iter().map(|(_, t)| t).collect();

        ds.set_data_field(region_value_field("RegionThickness", region_field, choose, &values)?);
        results.push(values);
    }
    log::debug!("Calculated thickness of {} regions over {} datasets", choose.len(), results.len());
    Ok(results)
}

/// Computes the mean displacement of the surface nodes of each region of `choose` from their
/// position in the first dataset, averaged within `stddev_range` standard deviations.
///
/// Each dataset receives an element field `RegionDisplacement`. The result has one row per dataset
/// and one column per region.
pub fn calculate_avg_displacement(
    datasets: &mut [Dataset],
    region_field: &RealMatrix,
    choose: &[i64],
    stddev_range: f64,
) -> Result<Vec<Vec<f64>>> {
    check_series(datasets, region_field)?;
    let inds = region_topology(&datasets[0], region_field)?;
    let surface = surface_triangles(datasets[0].nodes(), inds)?;
    let node_sets: Vec<BTreeSet<usize>> = divide_tris_by_elem_val(&surface, region_field, choose)?
        .into_iter()
        .map(|(_, tris)| tris.into_iter().flatten().collect())
        .collect();
    let reference = datasets[0].nodes().points();

    let mut results = Vec::with_capacity(datasets.len());
    for ds in datasets.iter_mut() {
        let current = ds.nodes().points();
        let values: Vec<f64> = node_sets
            .par_iter()
            .map(|set| {
                let lengths: Vec<f64> = set.iter().map(|&i| (current[i] - reference[i]).norm()).collect();
                avg_dev_range(&lengths, stddev_range)
            })
            .collect();
        ds.set_data_field(region_value_field("RegionDisplacement", region_field, choose, &values)?);
        results.push(values);
    }
    Ok(results)
}

/// Sums the volumes of the linear tetrahedra of each region of `choose` for every dataset.
///
/// Higher order tetrahedra contribute the volume of their corner tetrahedron. Each dataset
/// receives an element field `volumes` holding the total volume of each element's region. The
/// result has one row per dataset and one column per region.
pub fn calculate_lin_tet_volume(datasets: &mut [Dataset], region_field: &RealMatrix, choose: &[i64]) -> Result<Vec<Vec<f64>>> {
    check_series(datasets, region_field)?;
    let inds = region_topology(&datasets[0], region_field)?;
    let et = element_type(inds.type_code())?;
    if et.geom() != GeomType::Tet {
        return Err(Error::basis(inds.name(), format!("expected a tetrahedral topology, found {}", et.name())));
    }
    let corners = et.vertices().to_vec();
    let inds_name = inds.name().to_string();
    let rows = inds.index_rows()?;
    let labels = region_field.to_vec();
    let num_nodes = datasets[0].nodes().rows();
    if let Some(&bad) = rows.iter().flatten().find(|&&i| i >= num_nodes) {
        return Err(Error::geometry(inds_name, format!("index {} out of range", bad)));
    }

    let results: Vec<Vec<f64>> = datasets
        .par_iter()
        .map(|ds| {
            let nodes = ds.nodes().points();
            let mut volumes = vec![0.0; choose.len()];
            for (row, label) in rows.iter().zip(&labels) {
                if let Some(r) = choose.iter().position(|&c| c as f64 == label.round()) {
                    let tet = Tetrahedron::from_vertices([0, 1, 2, 3].map(|v| nodes[row[corners[v]]]));
                    volumes[r] += tet.volume();
                }
            }
            volumes
        })
        .collect();

    for (ds, volumes) in datasets.iter_mut().zip(&results) {
        let mut field = region_value_field("volumes", region_field, choose, volumes)?;
        field.set_meta(props::TOPOLOGY, inds_name.as_str());
        field.set_meta(props::SPATIAL, inds_name.as_str());
        ds.set_data_field(field);
    }
    Ok(results)
}

/// Volume indicators of a cardiac cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionVolumeSummary {
    /// Total volume of the chosen regions per timestep in mL.
    pub timestep_volumes: Vec<f64>,
    /// End systolic (smallest) volume in mL.
    pub esv: f64,
    /// End diastolic (largest) volume in mL.
    pub edv: f64,
    pub stroke_volume: f64,
    /// `(edv - esv) / edv` in percent.
    pub ejection_fraction: f64,
    /// Standard deviation of the times at which the regions reach their smallest volume, in ms.
    pub sdi_time: f64,
    /// `sdi_time` as a percentage of the cycle duration.
    pub sdi_percent: f64,
}

/// Computes the volume indicators of a time series of tetrahedral cavity meshes in mm.
///
/// `timesteps` gives the time in ms of each dataset. The cycle duration is derived from
/// `heart_rate` in beats per minute, or taken as the span of the timesteps.
pub fn calculate_region_volume_summary(
    datasets: &mut [Dataset],
    region_field: &RealMatrix,
    choose: &[i64],
    timesteps: &[f64],
    heart_rate: Option<f64>,
) -> Result<RegionVolumeSummary> {
    if timesteps.len() < 2 || timesteps.len() != datasets.len() {
        return Err(Error::shape(
            region_field.name(),
            format!("{} timesteps given for {} datasets", timesteps.len(), datasets.len()),
        ));
    }
    let duration = match heart_rate {
        Some(rate) if rate > 0.0 => 60000.0 / rate,
        _ => timesteps[timesteps.len() - 1] - timesteps[0],
    };

    let volumes = calculate_lin_tet_volume(datasets, region_field, choose)?;
    let totals: Vec<f64> = volumes.iter().map(|v| v.iter().sum::<f64>() / 1000.0).collect();
    let (esv, edv) = min_max(totals.iter().copied()).unwrap_or((0.0, 0.0));
    if esv >= edv {
        return Err(Error::geometry(
            region_field.name(),
            format!("volume does not change over the cycle: {:?}", totals),
        ));
    }

    let min_times: Vec<f64> = (0..choose.len())
        .map(|r| {
            let (i, _) = volumes
                .iter()
                .enumerate()
                .min_by_key(|(i, v)| (OrderedFloat(v[r]), *i))
                .unwrap_or((0, &volumes[0]));
            timesteps[i]
        })
        .collect();
    let sdi_time = stddev(&min_times);

    Ok(RegionVolumeSummary {
        timestep_volumes: totals,
        esv,
        edv,
        stroke_volume: edv - esv,
        ejection_fraction: (edv - esv) * 100.0 / edv,
        sdi_time,
        sdi_percent: if duration > 0.0 { sdi_time * 100.0 / duration } else { 0.0 },
    })
}
