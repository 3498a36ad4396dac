//! Oriented image planes and stacks of them.
//!
//! An [`ImagePlane`] maps the unit square onto a rectangle in world space: xi `(0, 0)` is the
//! top-left corner at the plane's position, x runs along the columns and y down the rows. An
//! [`ImageObject`] is a list of planes which may form volume stacks at several timesteps.
use crate::error::{Error, Result};
use crate::matrix::RealMatrix;
use nalgebra::{Affine3, Matrix4, Point3, Translation3, Unit, UnitQuaternion, Vector2, Vector3};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;

mod mask;
mod resample;

pub use mask::*;
pub use resample::*;

/// Tolerance for deciding that two planes or timesteps are the same.
const SAME_EPSILON: f64 = 1e-5;

/// A 2D image oriented in world space.
#[derive(Debug)]
pub struct ImagePlane {
    name: String,
    position: Point3<f64>,
    orientation: UnitQuaternion<f64>,
    /// Width (columns) and height (rows) in pixels.
    dims: [usize; 2],
    spacing: Vector2<f64>,
    timestep: f64,
    series_id: Option<String>,
    pixels: RealMatrix,
    min_max: Mutex<Option<(f64, f64)>>,
}

impl ImagePlane {
    /// A zero-valued image of `dims` (width, height) pixels of size `spacing`, with its top-left
    /// corner at `position`.
    pub fn new(
        name: impl Into<String>,
        position: Point3<f64>,
        orientation: UnitQuaternion<f64>,
        dims: [usize; 2],
        spacing: Vector2<f64>,
        timestep: f64,
    ) -> Result<Self> {
        let name = name.into();
        if dims[0] == 0 || dims[1] == 0 || spacing.x <= 0.0 || spacing.y <= 0.0 {
            return Err(Error::shape(
                name,
                format!("invalid image dimensions {:?} with spacing {:?}", dims, spacing),
            ));
        }
        let pixels = RealMatrix::new(format!("{}_pixels", name), dims[1], dims[0]);
        Ok(Self {
            name,
            position,
            orientation,
            dims,
            spacing,
            timestep,
            series_id: None,
            pixels,
            min_max: Mutex::new(None),
        })
    }

    /// An image with the same geometry, timestep and series, and a copy of the pixels.
    pub fn clone_named(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            pixels: self.pixels.clone_named(format!("{}_pixels", name)),
            name,
            position: self.position,
            orientation: self.orientation,
            dims: self.dims,
            spacing: self.spacing,
            timestep: self.timestep,
            series_id: self.series_id.clone(),
            min_max: Mutex::new(*self.min_max.lock()),
        }
    }

    /// An image with the same geometry whose pixels alias this image's pixels.
    pub fn alias(&self) -> Self {
        Self {
            name: self.name.clone(),
            position: self.position,
            orientation: self.orientation,
            dims: self.dims,
            spacing: self.spacing,
            timestep: self.timestep,
            series_id: self.series_id.clone(),
            pixels: self.pixels.handle(),
            min_max: Mutex::new(*self.min_max.lock()),
        }
    }

    pub fn with_series_id(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    pub fn width(&self) -> usize {
        self.dims[0]
    }

    pub fn height(&self) -> usize {
        self.dims[1]
    }

    pub fn spacing(&self) -> &Vector2<f64> {
        &self.spacing
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    pub fn series_id(&self) -> Option<&str> {
        self.series_id.as_deref()
    }

    /// Pixel values, one row of the matrix per image row.
    pub fn pixels(&self) -> &RealMatrix {
        &self.pixels
    }

    /// World size of the image.
    pub fn extents(&self) -> Vector2<f64> {
        Vector2::new(
            self.dims[0] as f64 * self.spacing.x,
            self.dims[1] as f64 * self.spacing.y,
        )
    }

    pub fn normal(&self) -> Unit<Vector3<f64>> {
        self.orientation * Vector3::z_axis()
    }

    /// Maps image xi coordinates `(x, y, d)` to world space, where `d` is the distance along the
    /// normal.
    pub fn transform(&self) -> Affine3<f64> {
        let extents = self.extents();
        let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(extents.x, -extents.y, 1.0));
        let matrix = Translation3::from(self.position.coords).to_homogeneous() * self.orientation.to_homogeneous() * scale;
        Affine3::from_matrix_unchecked(matrix)
    }

    /// Maps world space to image xi coordinates, see [`transform`](Self::transform).
    pub fn inverse_transform(&self) -> Affine3<f64> {
        self.transform().inverse()
    }

    /// Top-left, top-right, bottom-left and bottom-right corners in world space.
    pub fn corners(&self) -> [Point3<f64>; 4] {
        let t = self.transform();
        [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)].map(|(x, y)| t * Point3::new(x, y, 0.0))
    }

    pub fn center(&self) -> Point3<f64> {
        self.transform() * Point3::new(0.5, 0.5, 0.0)
    }

    /// World position of the center of the pixel at row `n` and column `m`.
    pub fn pixel_center(&self, n: usize, m: usize) -> Point3<f64> {
        self.transform() * self.pixel_xi(n, m)
    }

    fn pixel_xi(&self, n: usize, m: usize) -> Point3<f64> {
        Point3::new(
            (m as f64 + 0.5) / self.dims[0] as f64,
            (n as f64 + 0.5) / self.dims[1] as f64,
            0.0,
        )
    }

    /// Position of `pt` relative to the plane as `(column, row, distance)` in pixel units and world
    /// distance along the normal. `pt` is a world position if `is_world`, otherwise an image xi.
    pub fn plane_pos(&self, pt: &Point3<f64>, is_world: bool) -> Vector3<f64> {
        let xi = if is_world {
            self.inverse_transform() * pt
        } else {
            *pt
        };
        Vector3::new(xi.x * self.dims[0] as f64, xi.y * self.dims[1] as f64, xi.z)
    }

    /// Whether `other` lies in the same plane with the same orientation.
    pub fn is_coplanar_with(&self, other: &ImagePlane) -> bool {
        self.orientation.angle_to(&other.orientation) <= SAME_EPSILON
            && self.normal().dot(&(other.position - self.position)).abs() <= SAME_EPSILON
    }

    /// Whether `other` covers the same pixels in world space.
    pub fn is_colinear_with(&self, other: &ImagePlane) -> bool {
        self.dims == other.dims
            && self
                .corners()
                .iter()
                .zip(other.corners().iter())
                .all(|(a, b)| (a - b).norm() <= SAME_EPSILON * (1.0 + a.coords.norm()))
    }

    /// The cached minimum and maximum pixel values, computing them if needed.
    pub fn min_max(&self) -> (f64, f64) {
        let mut cache = self.min_max.lock();
        *cache.get_or_insert_with(|| self.pixels.min_max().unwrap_or((0.0, 0.0)))
    }

    /// Recomputes the minimum and maximum pixel values after the pixels changed.
    pub fn read_min_max(&self) -> (f64, f64) {
        let min_max = self.pixels.min_max().unwrap_or((0.0, 0.0));
        *self.min_max.lock() = Some(min_max);
        min_max
    }
}

/// An ordered list of image planes from one source.
#[derive(Debug)]
pub struct ImageObject {
    name: String,
    images: Vec<ImagePlane>,
    is_time_dependent: bool,
}

impl ImageObject {
    pub fn new(name: impl Into<String>, images: Vec<ImagePlane>) -> Self {
        let mut result = Self {
            name: name.into(),
            images,
            is_time_dependent: false,
        };
        result.is_time_dependent = result.timestep_list().len() > 1;
        result
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn images(&self) -> &[ImagePlane] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [ImagePlane] {
        &mut self.images
    }

    pub fn is_time_dependent(&self) -> bool {
        self.is_time_dependent
    }

    /// Distinct timesteps in ascending order.
    pub fn timestep_list(&self) -> Vec<f64> {
        let mut times: Vec<f64> = Vec::new();
        for image in &self.images {
            if !times.iter().any(|t| (t - image.timestep).abs() <= SAME_EPSILON) {
                times.push(image.timestep);
            }
        }
        times.sort_by_key(|&t| OrderedFloat(t));
        times
    }

    /// Indices of the planes at each timestep of [`timestep_list`](Self::timestep_list).
    pub fn timestep_indices(&self) -> Vec<(f64, Vec<usize>)> {
        self.timestep_list()
            .into_iter()
            .map(|t| {
                let indices = (0..self.images.len())
                    .filter(|&i| (self.images[i].timestep - t).abs() <= SAME_EPSILON)
                    .collect();
                (t, indices)
            })
            .collect()
    }

    /// Indices of planes lying in the same plane with the same orientation, such as the frames of
    /// one slice over time.
    pub fn orientation_groups(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (i, image) in self.images.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|g| self.images[g[0]].is_coplanar_with(image))
            {
                Some(group) => group.push(i),
                None => groups.push(vec![i]),
            }
        }
        groups
    }

    /// Per timestep, the indices of the planes sorted along the normal of the first plane.
    pub fn volume_stacks(&self) -> Vec<Vec<usize>> {
        self.timestep_indices()
            .into_iter()
            .map(|(_, mut indices)| {
                if let Some(&first) = indices.first() {
                    let origin = &self.images[first];
                    let normal = origin.normal();
                    indices.sort_by_key(|&i| OrderedFloat(normal.dot(&(self.images[i].position - origin.position))));
                }
                indices
            })
            .collect()
    }

    /// Whether every timestep has a single plane.
    pub fn is_2d(&self) -> bool {
        self.volume_stacks().iter().all(|s| s.len() <= 1)
    }

    /// Size of a voxel: the pixel spacing and the distance between the first two planes of the
    /// first stack. Single plane stacks use the smaller pixel spacing as depth.
    pub fn voxel_size(&self) -> Result<Vector3<f64>> {
        let stack = self.first_stack()?;
        let first = &self.images[stack[0]];
        let depth = match stack.get(1) {
            Some(&second) => first.normal().dot(&(self.images[second].position - first.position)).abs(),
            None => first.spacing.x.min(first.spacing.y),
        };
        Ok(Vector3::new(first.spacing.x, first.spacing.y, depth))
    }

    fn first_stack(&self) -> Result<Vec<usize>> {
        self.volume_stacks()
            .into_iter()
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::shape(self.name.clone(), "image object has no planes"))
    }

    /// Maps the unit cube onto the volume of the first stack: x along the columns, y down the rows
    /// and z from the first plane to the last.
    pub fn volume_transform(&self) -> Result<Affine3<f64>> {
        let stack = self.first_stack()?;
        let first = &self.images[stack[0]];
        let last = &self.images[stack[stack.len() - 1]];
        let depth = first.normal().dot(&(last.position - first.position));
        let extents = first.extents();
        let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(extents.x, -extents.y, depth));
        let matrix =
            Translation3::from(first.position.coords).to_homogeneous() * first.orientation.to_homogeneous() * scale;
        Ok(Affine3::from_matrix_unchecked(matrix))
    }

    /// The eight corners of the volume of the first stack, first plane first.
    pub fn volume_corners(&self) -> Result<Vec<Point3<f64>>> {
        let stack = self.first_stack()?;
        let first = &self.images[stack[0]];
        let last = &self.images[stack[stack.len() - 1]];
        Ok(first
            .corners()
            .into_iter()
            .chain(last.corners())
            .collect())
    }
}

/// Parameters of a regular stack of image planes.
#[derive(Debug, Clone, PartialEq)]
pub struct StackGeometry {
    /// Width and height in pixels.
    pub dims: [usize; 2],
    pub slices: usize,
    pub timesteps: Vec<f64>,
    /// Top-left corner of the first plane.
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
    /// Pixel spacing in x and y and the distance between planes in z.
    pub spacing: Vector3<f64>,
}

/// Generates a zero-valued stack of `slices` planes for every timestep, stacked along the normal.
pub fn generate_image_stack(name: &str, geometry: &StackGeometry) -> Result<ImageObject> {
    if geometry.slices == 0 || geometry.timesteps.is_empty() {
        return Err(Error::shape(name, "image stack needs at least one slice and one timestep"));
    }
    let normal = geometry.orientation * Vector3::z_axis();
    let spacing = Vector2::new(geometry.spacing.x, geometry.spacing.y);

    let mut images = Vec::with_capacity(geometry.slices * geometry.timesteps.len());
    for (t, &timestep) in geometry.timesteps.iter().enumerate() {
        for s in 0..geometry.slices {
            let position = geometry.position + normal.as_ref() * (s as f64 * geometry.spacing.z);
            images.push(ImagePlane::new(
                format!("{}_s{}_t{}", name, s, t),
                position,
                geometry.orientation,
                geometry.dims,
                spacing,
                timestep,
            )?);
        }
    }
    Ok(ImageObject::new(name, images))
}

/// Generates a stack holding a bright sphere in the middle of the volume whose radius grows with
/// the timestep index, with values falling off linearly from 1 at its center.
pub fn generate_test_image_stack(name: &str, geometry: &StackGeometry) -> Result<ImageObject> {
    let obj = generate_image_stack(name, geometry)?;
    let transform = obj.volume_transform()?;
    let center = transform * Point3::new(0.5, 0.5, 0.5);
    let extent = geometry.dims[0] as f64 * geometry.spacing.x;
    let extent = extent.min(geometry.dims[1] as f64 * geometry.spacing.y);
    let timesteps = obj.timestep_list();
    let num_times = timesteps.len() as f64;

    for image in &obj.images {
        let t = timesteps
            .iter()
            .position(|&t| (t - image.timestep).abs() <= SAME_EPSILON)
            .unwrap_or(0);
        let radius = extent * 0.25 * (1.0 + t as f64 / num_times);
        for n in 0..image.height() {
            for m in 0..image.width() {
                let dist = (image.pixel_center(n, m) - center).norm();
                let value = (1.0 - dist / radius).max(0.0);
                image.pixels.set(value, n, m)?;
            }
        }
        image.read_min_max();
    }
    Ok(obj)
}
