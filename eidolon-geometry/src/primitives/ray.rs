use crate::{epsilon, LineSegment3d, Plane, Real};
use nalgebra::{Point3, Scalar, Unit, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A half-line starting at `origin` in the unit direction `direction`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ray<T: Scalar> {
    origin: Point3<T>,
    direction: Unit<Vector3<T>>,
}

/// Parameters of a ray/triangle hit: the ray parameter `t` and the barycentric `(u, v)` such that
/// the hit point is `(1 - u - v) * a + u * b + v * c`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TriangleIntersection<T> {
    pub t: T,
    pub u: T,
    pub v: T,
}

impl<T> Ray<T>
where
    T: Real,
{
    /// Returns `None` if `direction` has zero length.
    pub fn new(origin: Point3<T>, direction: Vector3<T>) -> Option<Self> {
        let direction = Unit::try_new(direction, T::default_epsilon())?;
        Some(Self { origin, direction })
    }

    pub fn from_origin_and_unit_direction(origin: Point3<T>, direction: Unit<Vector3<T>>) -> Self {
        Self { origin, direction }
    }

    pub fn origin(&self) -> &Point3<T> {
        &self.origin
    }

    pub fn direction(&self) -> &Unit<Vector3<T>> {
        &self.direction
    }

    pub fn point_at(&self, t: T) -> Point3<T> {
        self.origin + self.direction.as_ref() * t
    }

    /// The ray parameter of the orthogonal projection of `point` onto the ray's line.
    pub fn project_point_parametric(&self, point: &Point3<T>) -> T {
        self.direction.dot(&(point - self.origin))
    }

    /// Ray parameter where the ray's line crosses `plane`, or `None` if they are parallel.
    pub fn intersect_plane(&self, plane: &Plane<T>) -> Option<T> {
        let denom = self.direction.dot(&plane.normal().into_inner());
        if denom.abs() <= T::default_epsilon() {
            None
        } else {
            Some(plane.normal().dot(&(plane.point() - self.origin)) / denom)
        }
    }

    /// Ray parameter `t >= 0` at which the ray crosses the segment `[a, b]`, if it does.
    ///
    /// The segment endpoints are included. Segments parallel to the ray never intersect.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn intersect_segment(&self, segment: &LineSegment3d<T>) -> Option<T> {
        let [a, b] = segment.end_points();
        let d = self.direction.as_ref();
        let e = b - a;
        let w = a - self.origin;
        let n = d.cross(&e);
        let n2 = n.norm_squared();
        if n2 <= T::default_epsilon() * e.norm_squared().max(1.0) {
            return None;
        }

        let t = w.cross(&e).dot(&n) / n2;
        let s = w.cross(d).dot(&n) / n2;
        let tol = epsilon::<T>();
        if t < 0.0 || s < -tol || s > 1.0 + tol {
            return None;
        }

        // Reject skew lines, the closest points must coincide
        let p = self.point_at(t);
        let q = segment.point_from_parameter(s);
        if (p - q).norm() > tol.max(tol * e.norm()) {
            return None;
        }

        Some(t)
    }

    /// Moller-Trumbore ray/triangle intersection. Only hits strictly in front of the origin are
    /// reported.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn intersect_triangle(&self, a: &Point3<T>, b: &Point3<T>, c: &Point3<T>) -> Option<TriangleIntersection<T>> {
        let dir = self.direction.as_ref();
        let e1 = b - a;
        let e2 = c - a;
        let p = dir.cross(&e2);
        let det = e1.dot(&p);

        if det.abs() <= T::default_epsilon() {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = p.dot(&s) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }

        let q = s.cross(&e1);
        let v = dir.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = e2.dot(&q) * inv_det;
        if t > T::default_epsilon() {
            Some(TriangleIntersection { t, u, v })
        } else {
            None
        }
    }
}
