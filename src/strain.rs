//! Strain estimation from transported 7-point stencils.
//!
//! A stencil is a node followed by the six points `p + d, p - d` for three orthogonal offsets `d`
//! of length `h`, stored as one row of a 7-column [`Vec3Matrix`]. Once the stencils have been moved
//! by a motion field, the deformation gradient of each node is estimated by central differences
//! and turned into a Green-Lagrange strain tensor expressed in the stencil's axes.
use crate::dataset::{is_spatial_index, props, Dataset};
use crate::element::element_type;
use crate::error::{Error, Result};
use crate::geometry::util::rotation_between;
use crate::geometry::{AxisAlignedBoundingBox3d, Ray};
use crate::matrix::{RealMatrix, Vec3Matrix};
use nalgebra::{Affine3, Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;

/// Number of columns of a stencil row.
pub const STENCIL_COLS: usize = 7;

/// Fraction of the mesh height used to find the base and apex ends.
const END_FRACTION: f64 = 0.1;

/// Per-node unit directions of a left ventricle mesh.
#[derive(Debug)]
pub struct DirectionalFields {
    pub radial: Vec3Matrix,
    pub longitudinal: Vec3Matrix,
    pub circumferential: Vec3Matrix,
}

/// Computes radial, longitudinal and circumferential directions for every node of `ds`.
///
/// The nodes are rotated so that `long_axis` is the z axis. The ends of the mesh along z are
/// compared and the wider one is taken as the base; the longitudinal direction points from the
/// base toward the apex. The radial direction of a node points away from the base-apex line in the
/// plane perpendicular to it, and the circumferential direction is `longitudinal x radial`.
///
/// The fields are node fields over the volume topology of `ds` (or its first spatial topology)
/// and are marked as the same for every timestep.
pub fn calculate_lv_directional_fields(ds: &Dataset, long_axis: &Vector3<f64>) -> Result<DirectionalFields> {
    let spatial: Vec<_> = ds.index_sets().iter().filter(|m| is_spatial_index(m)).collect();
    let topology = spatial
        .iter()
        .find(|m| element_type(m.type_code()).map_or(false, |et| et.dim() == 3))
        .or_else(|| spatial.first())
        .map(|m| m.name().to_string())
        .ok_or_else(|| Error::geometry(ds.name(), "dataset has no spatial topology"))?;

    let nodes = ds.nodes().points();
    let bounds = AxisAlignedBoundingBox3d::from_points(&nodes)
        .ok_or_else(|| Error::geometry(ds.name(), "dataset has no nodes"))?;
    if long_axis.norm() <= f64::EPSILON {
        return Err(Error::geometry(ds.name(), "long axis has zero length"));
    }

    let mut long_axis = long_axis.normalize();
    let orient = rotation_between(&long_axis, &Vector3::z());
    let center = bounds.center();
    let local: Vec<Point3<f64>> = nodes.iter().map(|n| Point3::from(orient * (n - center))).collect();

    let (minz, maxz) = local
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.z), hi.max(p.z)));
    let end_box = |pick: &dyn Fn(f64) -> bool| {
        let points: Vec<_> = local.iter().filter(|p| pick(p.z)).copied().collect();
        AxisAlignedBoundingBox3d::from_points(&points)
    };
    let span = maxz - minz;
    let lower = end_box(&|z| z <= minz + span * END_FRACTION);
    let upper = end_box(&|z| z >= maxz - span * END_FRACTION);
    let (mut base, mut apex) = match (lower, upper) {
        (Some(lower), Some(upper)) => (lower, upper),
        _ => return Err(Error::geometry(ds.name(), "cannot find the ends of the mesh")),
    };

    if base.radius() < apex.radius() {
        long_axis = -long_axis;
        std::mem::swap(&mut base, &mut apex);
    }

    let axis_ray = Ray::new(base.center(), apex.center() - base.center())
        .ok_or_else(|| Error::geometry(ds.name(), "base and apex centers coincide"))?;
    let inverse = orient.inverse();

    let mut radial = Vec::with_capacity(local.len());
    let mut circumferential = Vec::with_capacity(local.len());
    for node in &local {
        let on_axis = axis_ray.point_at(axis_ray.project_point_parametric(node));
        let offset = node - on_axis;
        let flat = Vector3::new(offset.x, offset.y, 0.0);
        let rad = inverse * flat.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::x);
        radial.push(rad);
        circumferential.push(long_axis.cross(&rad));
    }

    let field = |name: &str, values: Vec<Vector3<f64>>| -> Result<Vec3Matrix> {
        let mut m = Vec3Matrix::from_vec(name, 1, values)?;
        m.set_meta(props::TOPOLOGY, topology.as_str());
        m.set_meta(props::SPATIAL, topology.as_str());
        m.set_meta(props::TIMECOPY, "True");
        Ok(m)
    };

    Ok(DirectionalFields {
        longitudinal: field("longitudinal", vec![long_axis; local.len()])?,
        radial: field("radial", radial)?,
        circumferential: field("circumferential", circumferential)?,
    })
}

/// Builds the stencils of `nodes` along the axes of image space.
///
/// Each node is moved by `to_ref` then `to_img`. The offsets of length `h` follow the x, y and z
/// axes as rotated by `to_img`, ignoring its scaling. Rows are `p, p+x, p-x, p+y, p-y, p+z, p-z`.
pub fn create_strain_grid(nodes: &Vec3Matrix, to_ref: &Affine3<f64>, to_img: &Affine3<f64>, h: f64) -> Result<Vec3Matrix> {
    let axis = |v: Vector3<f64>| -> Result<Vector3<f64>> {
        to_img
            .transform_vector(&v)
            .try_normalize(f64::EPSILON)
            .map(|d| d * h)
            .ok_or_else(|| Error::geometry(nodes.name(), "image transform is singular"))
    };
    let (dx, dy, dz) = (axis(Vector3::x())?, axis(Vector3::y())?, axis(Vector3::z())?);

    let data = nodes
        .points()
        .iter()
        .flat_map(|n| {
            let p = (to_img * (to_ref * n)).coords;
            [p, p + dx, p - dx, p + dy, p - dy, p + dz, p - dz]
        })
        .collect();
    Vec3Matrix::from_vec("straingrid", STENCIL_COLS, data)
}

/// Builds the stencils of `nodes` along per-node directions.
///
/// Rows are `p, p+r, p-r, p+c, p-c, p+l, p-l` for the radial, circumferential and longitudinal
/// directions scaled to length `h`.
pub fn create_strain_field(
    nodes: &Vec3Matrix,
    radial: &Vec3Matrix,
    longitudinal: &Vec3Matrix,
    circumferential: &Vec3Matrix,
    h: f64,
) -> Result<Vec3Matrix> {
    for field in [radial, longitudinal, circumferential] {
        if field.rows() != nodes.rows() {
            return Err(Error::shape(
                field.name(),
                format!("{} directions given for {} nodes", field.rows(), nodes.rows()),
            ));
        }
    }

    let (rad, lon, cir) = (radial.points(), longitudinal.points(), circumferential.points());
    let mut data = Vec::with_capacity(nodes.rows() * STENCIL_COLS);
    for (n, p) in nodes.points().iter().enumerate() {
        let scaled = |v: &Point3<f64>| v.coords.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros) * h;
        let (r, c, l) = (scaled(&rad[n]), scaled(&cir[n]), scaled(&lon[n]));
        let p = p.coords;
        data.extend([p, p + r, p - r, p + c, p - c, p + l, p - l]);
    }
    Vec3Matrix::from_vec("strainfield", STENCIL_COLS, data)
}

/// Green-Lagrange tensor of one deformed stencil row whose offsets had length `h`.
///
/// Column `d` of the displacement gradient `G` is `(p+d - p-d) / 2h` minus the unit axis `d`, so
/// `F = G + I` has the deformed central differences as columns and `E = (F^T F - I) / 2`.
pub fn strain_tensor(stencil: &[Vector3<f64>], h: f64) -> Matrix3<f64> {
    let scale = 1.0 / (2.0 * h);
    let f = Matrix3::from_columns(&[
        (stencil[1] - stencil[2]) * scale,
        (stencil[3] - stencil[4]) * scale,
        (stencil[5] - stencil[6]) * scale,
    ]);
    (f.transpose() * f - Matrix3::identity()) * 0.5
}

/// Computes the strain tensor of every stencil row of `stencils`, giving a 9-column matrix of the
/// tensors in row-major order.
pub fn calculate_strain_tensors(stencils: &Vec3Matrix, h: f64) -> Result<RealMatrix> {
    if stencils.cols() != STENCIL_COLS {
        return Err(Error::shape(
            stencils.name(),
            format!("strain stencils need {} columns, found {}", STENCIL_COLS, stencils.cols()),
        ));
    }
    if h <= 0.0 {
        return Err(Error::geometry(stencils.name(), format!("invalid stencil size {}", h)));
    }

    let data: Vec<f64> = stencils
        .read()
        .par_chunks(STENCIL_COLS)
        .flat_map_iter(|row| {
            let e = strain_tensor(row, h);
            // Row-major, E is symmetric
            e.transpose().as_slice().to_vec()
        })
        .collect();
    RealMatrix::from_vec("straintensors", 9, data)
}

fn tensor_rows(tensors: &RealMatrix) -> Result<Vec<Matrix3<f64>>> {
    if tensors.cols() != 9 {
        return Err(Error::shape(
            tensors.name(),
            format!("tensor matrix needs 9 columns, found {}", tensors.cols()),
        ));
    }
    Ok(tensors
        .read()
        .chunks(9)
        .map(|r| Matrix3::from_row_slice(r))
        .collect())
}

/// Largest and smallest eigenvalue of every tensor of `tensors`, as the fields `maxstrain` and
/// `minstrain`.
pub fn calculate_tensor_indicator_eigen(tensors: &RealMatrix) -> Result<(RealMatrix, RealMatrix)> {
    let (max, min): (Vec<f64>, Vec<f64>) = tensor_rows(tensors)?
        .into_par_iter()
        .map(|e| {
            let eigen = SymmetricEigen::new(e);
            (eigen.eigenvalues.max(), eigen.eigenvalues.min())
        })
        .unzip();
    Ok((
        RealMatrix::from_vec("maxstrain", 1, max)?,
        RealMatrix::from_vec("minstrain", 1, min)?,
    ))
}

/// Projects every tensor onto its direction: `v^T E v` for row `n` of `tensors` and `directions`.
pub fn calculate_tensor_mul(tensors: &RealMatrix, directions: &Vec3Matrix, name: &str) -> Result<RealMatrix> {
    if tensors.rows() != directions.rows() {
        return Err(Error::shape(
            name,
            format!("{} tensors but {} directions", tensors.rows(), directions.rows()),
        ));
    }
    let values = tensor_rows(tensors)?
        .iter()
        .zip(directions.points())
        .map(|(e, v)| v.coords.dot(&(e * v.coords)))
        .collect();
    RealMatrix::from_vec(name, 1, values)
}
