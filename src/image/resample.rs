use super::{generate_image_stack, ImageObject, ImagePlane, StackGeometry};
use crate::error::{Error, Result};
use nalgebra::{Affine3, Matrix4, Point3, Vector3};
use ordered_float::OrderedFloat;
use rayon::prelude::*;

/// A stack of planes sampled by trilinear interpolation, zero outside.
struct SampleVolume {
    /// Pixels of every plane, row-major.
    planes: Vec<Vec<f64>>,
    cols: usize,
    rows: usize,
    /// World space to voxel coordinates `(column, row, plane)` with voxel centers at integers.
    to_voxel: Affine3<f64>,
}

impl SampleVolume {
    /// The volume of the planes `stack` of `obj`. A single plane is doubled into a slab one
    /// voxel deep centered on the plane.
    fn new(obj: &ImageObject, stack: &[usize]) -> Result<Self> {
        let images = obj.images();
        let first = stack
            .first()
            .map(|&i| &images[i])
            .ok_or_else(|| Error::shape(obj.name(), "empty image stack"))?;

        let (planes, depth, offset): (Vec<&ImagePlane>, f64, f64) = match stack.get(1) {
            None => (vec![first, first], first.spacing().x.min(first.spacing().y), 0.5),
            Some(&second) => {
                let depth = first.normal().dot(&(images[second].position() - first.position()));
                (stack.iter().map(|&i| &images[i]).collect(), depth, 0.0)
            }
        };
        if depth.abs() <= f64::EPSILON {
            return Err(Error::shape(obj.name(), "image stack planes coincide"));
        }
        if let Some(plane) = planes.iter().find(|p| p.width() != first.width() || p.height() != first.height()) {
            return Err(Error::shape(
                plane.name(),
                format!("plane differs in size from {:?}", first.name()),
            ));
        }

        let (cols, rows) = (first.width(), first.height());
        let to_voxel_from_xi = Matrix4::new_translation(&Vector3::new(-0.5, -0.5, offset))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(cols as f64, rows as f64, 1.0 / depth));
        let to_voxel = Affine3::from_matrix_unchecked(to_voxel_from_xi) * first.inverse_transform();

        Ok(Self {
            planes: planes.iter().map(|p| p.pixels().to_vec()).collect(),
            cols,
            rows,
            to_voxel,
        })
    }

    fn sample(&self, world: &Point3<f64>) -> f64 {
        let v = self.to_voxel * world;
        let base = v.coords.map(f64::floor);
        let frac = v.coords - base;

        let mut value = 0.0;
        for (dz, wz) in [(0, 1.0 - frac.z), (1, frac.z)] {
            let z = base.z as i64 + dz;
            if wz == 0.0 || z < 0 || z >= self.planes.len() as i64 {
                continue;
            }
            let plane = &self.planes[z as usize];
            for (dy, wy) in [(0, 1.0 - frac.y), (1, frac.y)] {
                let y = base.y as i64 + dy;
                if wy == 0.0 || y < 0 || y >= self.rows as i64 {
                    continue;
                }
                for (dx, wx) in [(0, 1.0 - frac.x), (1, frac.x)] {
                    let x = base.x as i64 + dx;
                    if wx == 0.0 || x < 0 || x >= self.cols as i64 {
                        continue;
                    }
                    value += wx * wy * wz * plane[y as usize * self.cols + x as usize];
                }
            }
        }
        value
    }
}

/// Fills every plane of `dest` by trilinear interpolation of `src`, zero outside of it.
///
/// Each timestep of `dest` samples the stack of `src` with the closest timestep. A source with a
/// single plane per timestep is sampled as a slab one voxel deep.
pub fn resample_image(src: &ImageObject, dest: &ImageObject) -> Result<()> {
    let src_times = src.timestep_list();
    let volumes = src
        .volume_stacks()
        .iter()
        .map(|stack| SampleVolume::new(src, stack))
        .collect::<Result<Vec<_>>>()?;

    for (timestep, indices) in dest.timestep_indices() {
        let closest = src_times
            .iter()
            .enumerate()
            .min_by_key(|(_, &t)| OrderedFloat((t - timestep).abs()))
            .map(|(i, _)| i)
            .ok_or_else(|| Error::shape(src.name(), "source image has no planes"))?;
        let volume = &volumes[closest];

        indices.par_iter().for_each(|&i| {
            let plane = &dest.images()[i];
            let transform = plane.transform();
            let values: Vec<f64> = (0..plane.height())
                .flat_map(|n| (0..plane.width()).map(move |m| (n, m)))
                .map(|(n, m)| volume.sample(&(transform * plane.pixel_xi(n, m))))
                .collect();
            plane.pixels().write().copy_from_slice(&values);
            plane.read_min_max();
        });
    }
    log::debug!("Resampled {:?} into {:?}", src.name(), dest.name());
    Ok(())
}

/// A copy of `obj` covering the same volume with voxels of size `spacing`, filled by
/// [`resample_image`].
pub fn create_respaced_object(obj: &ImageObject, name: &str, spacing: &Vector3<f64>) -> Result<ImageObject> {
    if spacing.iter().any(|&s| s <= 0.0) {
        return Err(Error::shape(name, format!("invalid voxel size {:?}", spacing)));
    }
    let stack = obj
        .volume_stacks()
        .into_iter()
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::shape(obj.name(), "image object has no planes"))?;
    let first = &obj.images()[stack[0]];
    let last = &obj.images()[stack[stack.len() - 1]];
    let extents = first.extents();
    let depth = first.normal().dot(&(last.position() - first.position()));

    let geometry = StackGeometry {
        dims: [
            ((extents.x / spacing.x).round() as usize).max(1),
            ((extents.y / spacing.y).round() as usize).max(1),
        ],
        slices: if stack.len() == 1 {
            1
        } else {
            (depth / spacing.z).round() as usize + 1
        },
        timesteps: obj.timestep_list(),
        position: *first.position(),
        orientation: *first.orientation(),
        spacing: *spacing,
    };
    let result = generate_image_stack(name, &geometry)?;
    resample_image(obj, &result)?;
    Ok(result)
}

/// A copy of `obj` with cubic voxels as small as the smallest dimension of its voxels.
pub fn create_isotropic_object(obj: &ImageObject, name: &str) -> Result<ImageObject> {
    let voxel = obj.voxel_size()?;
    let size = voxel.min();
    create_respaced_object(obj, name, &Vector3::repeat(size))
}
