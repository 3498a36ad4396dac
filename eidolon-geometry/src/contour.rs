use crate::util::centroid;
use crate::{epsilon, plane_normal, AxisAlignedBoundingBox3d, LineSegment3d, Plane, Ray, Real};
use itertools::Itertools;
use nalgebra::Point3;
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContourError {
    /// Contours need at least three points.
    TooFewPoints(usize),
    /// No pair of points could be found which together with the centroid spans a plane.
    Colinear,
    /// Ear clipping found no ear while `remaining` points were left.
    NoEarFound { remaining: usize },
}

impl Display for ContourError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewPoints(n) => write!(f, "Contour has {} points, at least 3 are required", n),
            Self::Colinear => write!(f, "Contour points are colinear, cannot determine a plane"),
            Self::NoEarFound { remaining } => {
                write!(f, "Could not find ear to reduce for triangulation ({} points remaining)", remaining)
            }
        }
    }
}

impl Error for ContourError {}

/// Iterates over the segments `(p[i], p[i + 1])` of a closed contour, including the closing segment.
pub fn contour_segments<'a, T: Real>(contour: &'a [Point3<T>]) -> impl Iterator<Item = LineSegment3d<T>> + 'a {
    contour
        .iter()
        .circular_tuple_windows()
        .map(|(a, b)| LineSegment3d::new(*a, *b))
}

/// Computes the plane of a closed planar contour.
///
/// The plane point is the centroid. The normal is the normal of the triangle formed by the centroid,
/// the first point and the first point at least as far from the first point as the average
/// distance between successive points (falling back to the second point).
pub fn contour_plane<T: Real>(contour: &[Point3<T>]) -> Result<Plane<T>, ContourError> {
    if contour.len() < 3 {
        return Err(ContourError::TooFewPoints(contour.len()));
    }

    let center = centroid(contour).unwrap();
    let first = &contour[0];
    let num_pairs = T::from_usize(contour.len() - 1).unwrap();
    let avg_dist = contour
        .iter()
        .tuple_windows()
        .fold(T::zero(), |acc, (a, b)| acc + (b - a).norm())
        / num_pairs;

    let far = contour
        .iter()
        .find(|c| (*c - first).norm() >= avg_dist)
        .unwrap_or(&contour[1]);

    plane_normal(&center, first, far)
        .map(|normal| Plane::from_point_and_normal(center, normal))
        .ok_or(ContourError::Colinear)
}

pub fn contour_on_plane<T: Real>(contour: &[Point3<T>], plane: &Plane<T>) -> bool {
    contour.iter().all(|c| plane.contains_point(c))
}

/// Returns true if the two contours lie on the same plane.
pub fn contours_coplanar<T: Real>(contour1: &[Point3<T>], contour2: &[Point3<T>]) -> Result<bool, ContourError> {
    let p1 = contour_plane(contour1)?;
    let p2 = contour_plane(contour2)?;
    Ok(p1.coincides_with(&p2))
}

/// Yields every point where `ray` crosses a segment of the closed contour, in segment order.
pub fn contour_ray_intersections<'a, T: Real>(
    ray: &'a Ray<T>,
    contour: &'a [Point3<T>],
) -> impl Iterator<Item = Point3<T>> + 'a {
    contour_segments(contour).filter_map(move |segment| ray.intersect_segment(&segment).map(|t| ray.point_at(t)))
}

/// A closed contour together with its plane, bounding box and centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarContour<T: Real> {
    points: Vec<Point3<T>>,
    plane: Plane<T>,
    bounding_box: AxisAlignedBoundingBox3d<T>,
    centroid: Point3<T>,
}

impl<T: Real> PlanarContour<T> {
    pub fn new(points: Vec<Point3<T>>) -> Result<Self, ContourError> {
        let plane = contour_plane(&points)?;
        Ok(Self::with_plane(points, plane))
    }

    /// Uses the given plane instead of computing one.
    ///
    /// # Panics
    ///
    /// Panics if `points` is empty.
    pub fn with_plane(points: Vec<Point3<T>>, plane: Plane<T>) -> Self {
        let bounding_box = AxisAlignedBoundingBox3d::from_points(&points).expect("Contour must not be empty");
        let centroid = centroid(&points).unwrap();
        Self {
            points,
            plane,
            bounding_box,
            centroid,
        }
    }

    pub fn points(&self) -> &[Point3<T>] {
        &self.points
    }

    pub fn plane(&self) -> &Plane<T> {
        &self.plane
    }

    pub fn bounding_box(&self) -> &AxisAlignedBoundingBox3d<T> {
        &self.bounding_box
    }

    pub fn centroid(&self) -> &Point3<T> {
        &self.centroid
    }

    /// Returns true if `point` lies on the contour plane and inside the contour.
    ///
    /// Casts a ray from `point` toward the centroid and counts the edges it crosses, an odd count
    /// means inside. Vertices lying exactly on the ray are treated as lying to one side of it so that
    /// a crossing through a vertex is counted once.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn contains_point(&self, point: &Point3<T>) -> bool {
        let eps = epsilon::<T>();
        if !self.bounding_box.contains_point_with_margin(point, eps) {
            return false;
        }

        if !contour_on_plane(&self.points, &self.plane) || !self.plane.contains_point(point) {
            return false;
        }

        let to_center = self.centroid - point;
        if to_center.norm() <= eps {
            return true;
        }

        let dir = to_center.normalize();
        let normal = self.plane.normal().into_inner();
        let side = |p: &Point3<T>| (p - point).cross(&dir).dot(&normal);

        let mut crossings = 0usize;
        for (a, b) in self.points.iter().circular_tuple_windows() {
            let (da, db) = (side(a), side(b));
            if (da >= 0.0) == (db >= 0.0) {
                continue;
            }

            let x = a + (b - a) * (da / (da - db));
            if (x - point).dot(&dir) >= 0.0 {
                crossings += 1;
            }
        }

        crossings % 2 == 1
    }

    /// Ear-clipping triangulation, see [`triangulate_contour`].
    pub fn triangulate(&self, skip_errors: bool) -> Result<Vec<[usize; 3]>, ContourError> {
        triangulate_with_plane(&self.points, &self.plane, skip_errors)
    }
}

/// Returns true if `point` is inside the closed planar `contour`.
///
/// Returns false for degenerate contours.
pub fn point_in_contour<T: Real>(point: &Point3<T>, contour: &[Point3<T>]) -> bool {
    PlanarContour::new(contour.to_vec())
        .map(|c| c.contains_point(point))
        .unwrap_or(false)
}

/// Triangulates a closed planar contour by ear reduction.
///
/// Triples `(a, b, c)` of consecutive points are tested in order; if the midpoint of `a -> c` is inside
/// the remaining contour, `(a, b, c)` is emitted and `b` removed. With `skip_errors` a missing ear is
/// replaced by a guess using the first three remaining points, which can produce overlapping triangles
/// for self-intersecting input. A contour of `n` points yields `n - 2` index triples.
pub fn triangulate_contour<T: Real>(
    contour: &[Point3<T>],
    skip_errors: bool,
) -> Result<Vec<[usize; 3]>, ContourError> {
    let plane = contour_plane(contour)?;
    triangulate_with_plane(contour, &plane, skip_errors)
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn triangulate_with_plane<T: Real>(
    contour: &[Point3<T>],
    plane: &Plane<T>,
    skip_errors: bool,
) -> Result<Vec<[usize; 3]>, ContourError> {
    if contour.len() < 3 {
        return Err(ContourError::TooFewPoints(contour.len()));
    } else if contour.len() == 3 {
        return Ok(vec![[0, 1, 2]]);
    }

    let mut remaining: Vec<(usize, Point3<T>)> = contour
        .iter()
        .enumerate()
        .map(|(i, c)| (i, plane.project_point(c)))
        .collect();
    let mut triangles = Vec::with_capacity(contour.len() - 2);

    while remaining.len() > 3 {
        let n = remaining.len();
        let current = PlanarContour::with_plane(remaining.iter().map(|(_, p)| *p).collect(), *plane);

        let ear = (0..n).find(|&i| {
            let mid = Point3::from((remaining[i].1.coords + remaining[(i + 2) % n].1.coords) * 0.5);
            current.contains_point(&mid)
        });

        let removed = match ear {
            Some(i) => {
                triangles.push([remaining[i].0, remaining[(i + 1) % n].0, remaining[(i + 2) % n].0]);
                (i + 1) % n
            }
            None if skip_errors => {
                triangles.push([remaining[0].0, remaining[1].0, remaining[2].0]);
                1
            }
            None => return Err(ContourError::NoEarFound { remaining: n }),
        };
        remaining.remove(removed);
    }

    triangles.push([remaining[0].0, remaining[1].0, remaining[2].0]);
    Ok(triangles)
}
