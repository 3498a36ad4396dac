use crate::Real;
use nalgebra::{Point3, Scalar, Unit, Vector3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A triangle in 3D. The normal follows the right-hand rule on the vertex order.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triangle3d<T: Scalar>(pub [Point3<T>; 3]);

impl<T> Triangle3d<T>
where
    T: Real,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn centroid(&self) -> Point3<T> {
        let [a, b, c] = &self.0;
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Cross product of two sides, with magnitude twice the area.
    pub fn area_vector(&self) -> Vector3<T> {
        let [a, b, c] = &self.0;
        (b - a).cross(&(c - a))
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn area(&self) -> T {
        self.area_vector().norm() * 0.5
    }

    /// Returns `None` for degenerate triangles.
    pub fn normal(&self) -> Option<Unit<Vector3<T>>> {
        Unit::try_new(self.area_vector(), T::default_epsilon())
    }
}
