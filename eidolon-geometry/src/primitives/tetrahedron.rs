use crate::Real;
use nalgebra::{Matrix3, Point3, Scalar};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tetrahedron<T>
where
    T: Scalar,
{
    vertices: [Point3<T>; 4],
}

impl<T> Tetrahedron<T>
where
    T: Scalar,
{
    pub fn from_vertices(vertices: [Point3<T>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point3<T>; 4] {
        &self.vertices
    }
}

impl<T> Tetrahedron<T>
where
    T: Real,
{
    /// Volume with sign, positive when `d` lies on the side of `abc` that `(b - a) x (c - a)` points to.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn signed_volume(&self) -> T {
        let [a, b, c, d] = &self.vertices;
        let m = Matrix3::from_columns(&[b - a, c - a, d - a]);
        m.determinant() / 6.0
    }

    pub fn volume(&self) -> T {
        self.signed_volume().abs()
    }
}
