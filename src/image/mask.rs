use super::{ImageObject, ImagePlane, SAME_EPSILON};
use crate::concurrency::{check_result_map, ShareScope, WorkerPool};
use crate::error::{Error, Result};
use crate::geometry::{contour_ray_intersections, convex_hull_2d, PlanarContour, Plane, Ray};
use crate::matrix::Shareable;
use crate::mesh::Contour;
use nalgebra::{Point2, Point3, Vector3};
use ordered_float::OrderedFloat;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Stacks with fewer planes than this are rasterized serially.
const MASK_PLANE_THRESHOLD: usize = 4;

/// Contours of `contours` lying on `plane` at its timestep, converted to pixel coordinates.
///
/// A contour is on the plane if every point is within half a pixel of it. Timesteps are only
/// compared for time dependent images.
fn pixel_contours(plane: &ImagePlane, contours: &[Contour], time_dependent: bool) -> Vec<(usize, PlanarContour<f64>)> {
    let tolerance = plane.spacing().min() * 0.5;
    let pixel_plane = Plane::from_point_and_normal(Point3::origin(), Vector3::z_axis());

    contours
        .iter()
        .enumerate()
        .filter(|(_, c)| c.points.len() >= 3)
        .filter(|(_, c)| !time_dependent || (c.timestep - plane.timestep()).abs() <= SAME_EPSILON)
        .filter_map(|(i, c)| {
            let projected: Vec<Vector3<f64>> = c.points.iter().map(|p| plane.plane_pos(p, true)).collect();
            if projected.iter().any(|p| p.z.abs() > tolerance) {
                return None;
            }
            let points = projected.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();
            Some((i, PlanarContour::with_plane(points, pixel_plane.clone())))
        })
        .collect()
}

/// Rasterizes `contours` into a mask with the geometry of `template`.
///
/// Every pixel whose center lies inside at least one contour on its plane is set to the value of
/// `label`, called with the pixel's world position, the mask plane and the indices of the contours
/// containing the pixel. Other pixels are 0. Planes are distributed over the workers of `pool`.
pub fn generate_image_mask<F>(
    pool: &WorkerPool,
    name: &str,
    template: &ImageObject,
    contours: &[Contour],
    label: F,
) -> Result<ImageObject>
where
    F: Fn(&Point3<f64>, &ImagePlane, &[usize]) -> f64 + Send + Sync + 'static,
{
    let planes: Vec<ImagePlane> = template
        .images()
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let plane = image.clone_named(format!("{}_{}", name, i));
            plane.pixels().fill(0.0);
            plane
        })
        .collect();
    let mask = ImageObject::new(name, planes);

    let projected: Vec<_> = mask
        .images()
        .iter()
        .map(|plane| pixel_contours(plane, contours, template.is_time_dependent()))
        .collect();
    log::debug!(
        "Rasterizing {} contours into {} planes of {:?}",
        contours.len(),
        mask.images().len(),
        name
    );

    let pixels: Vec<&dyn Shareable> = mask.images().iter().map(|p| p.pixels() as &dyn Shareable).collect();
    let scope = ShareScope::new(&pixels);
    let targets: Vec<ImagePlane> = mask.images().iter().map(ImagePlane::alias).collect();
    let nparts = pool.choose_proc_count(targets.len(), 0, MASK_PLANE_THRESHOLD);

    let results = pool.run(targets.len(), nparts, None, move |worker| {
        for i in worker.progress_range() {
            worker.check_stop()?;
            let (plane, inside) = (&targets[i], &projected[i]);
            if inside.is_empty() {
                continue;
            }
            for n in 0..plane.height() {
                for m in 0..plane.width() {
                    let center = Point3::new(m as f64 + 0.5, n as f64 + 0.5, 0.0);
                    let containing: Vec<usize> = inside
                        .iter()
                        .filter(|(_, c)| c.contains_point(&center))
                        .map(|(k, _)| *k)
                        .collect();
                    if !containing.is_empty() {
                        let value = label(&plane.pixel_center(n, m), plane, &containing);
                        plane.pixels().set(value, n, m)?;
                    }
                }
            }
        }
        Ok(())
    })?;
    check_result_map(&results)?;
    scope.finish()?;

    for plane in mask.images() {
        plane.read_min_max();
    }
    Ok(mask)
}

/// Pixels of the background reachable from the image border through 4-connected neighbours.
fn outside_background(region: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut outside = vec![false; region.len()];
    let mut queue = VecDeque::new();
    for n in 0..height {
        for m in 0..width {
            if (n == 0 || m == 0 || n + 1 == height || m + 1 == width) && !region[n * width + m] {
                outside[n * width + m] = true;
                queue.push_back((n, m));
            }
        }
    }

    while let Some((n, m)) = queue.pop_front() {
        let neighbours = [
            (n.wrapping_sub(1), m),
            (n + 1, m),
            (n, m.wrapping_sub(1)),
            (n, m + 1),
        ];
        for (nn, mm) in neighbours {
            if nn < height && mm < width {
                let k = nn * width + mm;
                if !region[k] && !outside[k] {
                    outside[k] = true;
                    queue.push_back((nn, mm));
                }
            }
        }
    }
    outside
}

/// Whether `p` lies inside or on the counter-clockwise convex polygon `hull`.
fn in_convex_hull(hull: &[Point2<f64>], p: &Point2<f64>) -> bool {
    hull.iter().zip(hull.iter().cycle().skip(1)).all(|(a, b)| {
        let (ab, ap) = (b - a, p - a);
        ab.x * ap.y - ab.y * ap.x >= -1e-9
    })
}

/// Convex hull of the pixel centers where `region` is set, if it covers the filled region well enough.
///
/// The rasterized hull is compared to the region with its holes filled. The hull is rejected if
/// the fraction of differing pixels exceeds `threshold`.
fn region_hull(region: &[bool], width: usize, height: usize, threshold: f64) -> Option<Vec<Point2<f64>>> {
    let centers: Vec<Point2<f64>> = (0..region.len())
        .filter(|&k| region[k])
        .map(|k| Point2::new((k % width) as f64 + 0.5, (k / width) as f64 + 0.5))
        .collect();
    let hull: Vec<Point2<f64>> = convex_hull_2d(&centers).into_iter().map(|i| centers[i]).collect();
    if hull.len() < 3 {
        return None;
    }

    let outside = outside_background(region, width, height);
    let filled = outside.iter().filter(|&&o| !o).count();
    let differing = (0..region.len())
        .filter(|&k| {
            let center = Point2::new((k % width) as f64 + 0.5, (k / width) as f64 + 0.5);
            in_convex_hull(&hull, &center) == outside[k]
        })
        .count();

    let difference = differing as f64 / filled.max(1) as f64;
    if difference < threshold {
        Some(hull)
    } else {
        log::debug!("Rejected hull differing from its region by {:.3}", difference);
        None
    }
}

/// Casts `num_nodes` rays from the centroid of `hull` at even angles starting along the x axis and
/// returns the points where they leave it.
fn radial_hull_points(hull: &[Point2<f64>], num_nodes: usize) -> Option<Vec<Point2<f64>>> {
    let polygon: Vec<Point3<f64>> = hull.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();
    let center = hull.iter().fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p.x, p.y, 0.0)) / hull.len() as f64;
    let center = Point3::from(center);

    (0..num_nodes)
        .map(|k| {
            let angle = 2.0 * PI * k as f64 / num_nodes as f64;
            let ray = Ray::new(center, Vector3::new(angle.cos(), angle.sin(), 0.0))?;
            contour_ray_intersections(&ray, &polygon)
                .max_by_key(|p| OrderedFloat((p - center).norm()))
                .map(|p| Point2::new(p.x, p.y))
        })
        .collect()
}

/// Extracts contours of `num_nodes` points from every non-blank plane of `mask`.
///
/// The region of a plane is the set of its pixels holding the plane's maximum value. Its convex
/// hull is kept if the rasterized hull and the region with holes filled differ in less than a
/// `threshold` fraction of pixels. With `doughnut` the holes of the region give a second, inner
/// contour. Contours carry the timestep of their plane.
pub fn generate_contours_from_mask(
    mask: &ImageObject,
    num_nodes: usize,
    threshold: f64,
    doughnut: bool,
) -> Result<Vec<Contour>> {
    if num_nodes < 3 {
        return Err(Error::geometry(mask.name(), format!("cannot build contours of {} points", num_nodes)));
    }

    let mut contours = Vec::new();
    for plane in mask.images() {
        let (min, max) = plane.min_max();
        if max <= 0.0 || max == min {
            log::debug!("Skipping blank mask plane {:?}", plane.name());
            continue;
        }

        let (width, height) = (plane.width(), plane.height());
        let region: Vec<bool> = plane.pixels().read().iter().map(|&v| v >= max).collect();
        let mut regions = vec![region.clone()];
        if doughnut {
            let outside = outside_background(&region, width, height);
            let holes: Vec<bool> = region.iter().zip(&outside).map(|(&r, &o)| !r && !o).collect();
            if holes.iter().any(|&h| h) {
                regions.push(holes);
            }
        }

        let transform = plane.transform();
        for region in regions {
            let points = region_hull(&region, width, height, threshold)
                .and_then(|hull| radial_hull_points(&hull, num_nodes));
            if let Some(points) = points {
                let world = points
                    .iter()
                    .map(|p| transform * Point3::new(p.x / width as f64, p.y / height as f64, 0.0))
                    .collect();
                contours.push(Contour::new(world, plane.timestep()));
            }
        }
    }
    log::debug!("Extracted {} contours from {:?}", contours.len(), mask.name());
    Ok(contours)
}

/// Merges planes covering the same pixels at the same timestep into one plane.
///
/// Planes are taken from `objects` in order; a plane matching an earlier one is combined with it
/// pixel by pixel using `merge`, the maximum if none is given. Other planes are copied.
pub fn merge_colinear_images(
    name: &str,
    objects: &[&ImageObject],
    merge: Option<&dyn Fn(f64, f64) -> f64>,
) -> Result<ImageObject> {
    let merge = merge.unwrap_or(&f64::max);
    let mut planes: Vec<ImagePlane> = Vec::new();

    for image in objects.iter().flat_map(|o| o.images()) {
        let existing = planes.iter().find(|p| {
            p.is_colinear_with(image) && (p.timestep() - image.timestep()).abs() <= SAME_EPSILON
        });
        match existing {
            Some(target) => {
                let source = image.pixels().to_vec();
                let mut pixels = target.pixels().write();
                for (t, s) in pixels.iter_mut().zip(source) {
                    *t = merge(*t, s);
                }
            }
            None => {
                let plane = image.clone_named(format!("{}_{}", name, planes.len()));
                planes.push(plane);
            }
        }
    }

    for plane in &planes {
        plane.read_min_max();
    }
    Ok(ImageObject::new(name, planes))
}
