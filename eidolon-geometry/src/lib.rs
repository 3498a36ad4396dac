//! Geometric primitives and planar contour operations used by `eidolon`.
//!
//! Everything here works on points in 3D world space. Contours are closed planar polygons given
//! as slices of points in circular order.
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, RealField, Scalar, U3};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

mod contour;
mod hull;
mod primitives;
pub use contour::*;
pub use hull::*;
pub use primitives::*;

pub mod util;

#[cfg(feature = "proptest-support")]
pub mod proptest;

/// Absolute tolerance used by the geometric predicates in this crate.
pub const EPSILON: f64 = 1.0e-8;

/// Scalar type of the geometry in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Returns [`EPSILON`] converted to `T`.
pub fn epsilon<T: Real>() -> T {
    T::from_f64(EPSILON).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "OVector<T, D>: Serialize",
    deserialize = "OVector<T, D>: Deserialize<'de>"
))]
pub struct AxisAlignedBoundingBox<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    min: OVector<T, D>,
    max: OVector<T, D>,
}

impl<T, D> Copy for AxisAlignedBoundingBox<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
    OVector<T, D>: Copy,
{
}

pub type AxisAlignedBoundingBox3d<T> = AxisAlignedBoundingBox<T, U3>;

impl<T, D> AxisAlignedBoundingBox<T, D>
where
    T: Scalar + PartialOrd,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(min: OVector<T, D>, max: OVector<T, D>) -> Self {
        for i in 0..D::dim() {
            assert!(min[i] <= max[i]);
        }
        Self { min, max }
    }

    pub fn min(&self) -> &OVector<T, D> {
        &self.min
    }

    pub fn max(&self) -> &OVector<T, D> {
        &self.max
    }
}

impl<T, D> From<OPoint<T, D>> for AxisAlignedBoundingBox<T, D>
where
    T: Scalar + PartialOrd,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn from(point: OPoint<T, D>) -> Self {
        AxisAlignedBoundingBox::new(point.coords.clone(), point.coords)
    }
}

impl<T, D> AxisAlignedBoundingBox<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Computes the minimal bounding box which encloses both `this` and `other`.
    pub fn enclose(&self, other: &AxisAlignedBoundingBox<T, D>) -> Self {
        let min = self.min.iter().zip(&other.min).map(|(a, b)| T::min(*a, *b));
        let min = OVector::<T, D>::from_iterator(min);

        let max = self.max.iter().zip(&other.max).map(|(a, b)| T::max(*a, *b));
        let max = OVector::<T, D>::from_iterator(max);

        AxisAlignedBoundingBox::new(min, max)
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a OPoint<T, D>>) -> Option<Self> {
        let mut points = points.into_iter();
        points.next().map(|first_point| {
            points.fold(AxisAlignedBoundingBox::from(first_point.clone()), |aabb, point| {
                aabb.enclose(&AxisAlignedBoundingBox::from(point.clone()))
            })
        })
    }

    pub fn extents(&self) -> OVector<T, D> {
        self.max() - self.min()
    }

    pub fn center(&self) -> OPoint<T, D> {
        OPoint::from((self.max() + self.min()) / T::from_f64(2.0).unwrap())
    }

    /// Half the length of the box diagonal, i.e. the radius of the sphere through its corners.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn radius(&self) -> T {
        self.extents().norm() * 0.5
    }

    /// Whether `point` lies in the box with its faces widened by `margin`.
    pub fn contains_point_with_margin(&self, point: &OPoint<T, D>, margin: T) -> bool {
        (0..D::dim()).all(|dim| point[dim] + margin >= self.min[dim] && point[dim] - margin <= self.max[dim])
    }
}
