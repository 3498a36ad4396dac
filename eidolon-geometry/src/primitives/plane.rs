use crate::{epsilon, Real};
use crate::util::angle_between;
use nalgebra::{Point3, Scalar, Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A plane in 3D defined by a point on the plane and a unit normal.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane<T: Scalar> {
    point: Point3<T>,
    normal: Unit<Vector3<T>>,
}

impl<T> Plane<T>
where
    T: Real,
{
    pub fn normal(&self) -> &Unit<Vector3<T>> {
        &self.normal
    }

    pub fn point(&self) -> &Point3<T> {
        &self.point
    }

    pub fn from_point_and_normal(point: Point3<T>, normal: Unit<Vector3<T>>) -> Self {
        Self { point, normal }
    }

    /// The plane through `a` with normal `(b - a) x (c - a)`.
    ///
    /// Returns `None` if the three points are colinear.
    pub fn from_points(a: &Point3<T>, b: &Point3<T>, c: &Point3<T>) -> Option<Self> {
        let normal = plane_normal(a, b, c)?;
        Some(Self::from_point_and_normal(*a, normal))
    }

    pub fn flipped(&self) -> Self {
        Self {
            point: self.point.clone(),
            normal: Unit::new_unchecked(-self.normal.into_inner()),
        }
    }

    /// Signed distance from the plane, positive on the side the normal points to.
    pub fn signed_distance(&self, point: &Point3<T>) -> T {
        self.normal.dot(&(point - self.point))
    }

    pub fn project_point(&self, point: &Point3<T>) -> Point3<T> {
        point - self.normal.as_ref() * self.signed_distance(point)
    }

    pub fn contains_point(&self, point: &Point3<T>) -> bool {
        self.signed_distance(point).abs() <= epsilon()
    }

    /// Circular order of `v1` followed by `v2` around the plane point, as seen along the normal.
    pub fn order(&self, v1: &Point3<T>, v2: &Point3<T>) -> Ordering {
        plane_order(&self.point, &self.normal.into_inner(), v1, v2)
    }

    /// Two planes are equal if their normals are parallel (in either direction) and the point of
    /// `other` lies on `self`.
    pub fn coincides_with(&self, other: &Plane<T>) -> bool {
        let angle = angle_between(&self.normal.into_inner(), &other.normal.into_inner());
        let parallel = angle <= epsilon() || angle >= T::pi() - epsilon();
        parallel && self.contains_point(&other.point)
    }
}

/// Normal of the plane through `a`, `b` and `c`, following the winding `a -> b -> c`.
pub fn plane_normal<T: Real>(a: &Point3<T>, b: &Point3<T>, c: &Point3<T>) -> Option<Unit<Vector3<T>>> {
    Unit::try_new((b - a).cross(&(c - a)), T::default_epsilon())
}

/// Sign of `((v1 - center) x (v2 - center)) . normal`.
pub fn plane_order<T: Real>(center: &Point3<T>, normal: &Vector3<T>, v1: &Point3<T>, v2: &Point3<T>) -> Ordering {
    let order = (v1 - center).cross(&(v2 - center)).dot(normal);
    order.partial_cmp(&T::zero()).unwrap_or(Ordering::Equal)
}
