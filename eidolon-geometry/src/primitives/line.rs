use crate::Real;
use nalgebra::{Point3, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment3d<T: Scalar> {
    end_points: [Point3<T>; 2],
}

impl<T: Scalar> LineSegment3d<T> {
    pub fn new(from: Point3<T>, to: Point3<T>) -> Self {
        Self::from_end_points([from, to])
    }

    pub fn from_end_points(end_points: [Point3<T>; 2]) -> Self {
        Self { end_points }
    }

    pub fn end_points(&self) -> &[Point3<T>; 2] {
        &self.end_points
    }

    pub fn start(&self) -> &Point3<T> {
        &self.end_points[0]
    }

    pub fn end(&self) -> &Point3<T> {
        &self.end_points[1]
    }
}

impl<T: Real> LineSegment3d<T> {
    pub fn length(&self) -> T {
        (self.end_points[1] - self.end_points[0]).norm()
    }

    pub fn midpoint(&self) -> Point3<T> {
        self.point_from_parameter(T::from_f64(0.5).unwrap())
    }

    pub fn project_point_parametric(&self, point: &Point3<T>) -> T {
        let a = self.end_points[0].coords;
        let b = self.end_points[1].coords;
        let d = &b - &a;
        let d2 = d.magnitude_squared();
        if d2 == T::zero() {
            // If the endpoints are the same, the segment collapses to a single point,
            // in which case e.g. t == 0 gives the correct solution.
            T::zero()
        } else {
            let x = point.coords;
            (x - &a).dot(&d) / d2
        }
    }

    pub fn project_point(&self, point: &Point3<T>) -> Point3<T> {
        let t = self.project_point_parametric(point);
        if t <= T::zero() {
            self.end_points[0]
        } else if t >= T::one() {
            self.end_points[1]
        } else {
            self.point_from_parameter(t)
        }
    }

    pub fn point_from_parameter(&self, t: T) -> Point3<T> {
        let a = self.end_points[0];
        let b = self.end_points[1];
        Point3::from(a.coords * (T::one() - t) + &b.coords * t)
    }

    pub fn distance_to_point(&self, point: &Point3<T>) -> T {
        (self.project_point(point) - point).norm()
    }
}
