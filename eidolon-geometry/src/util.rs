use crate::Real;
use nalgebra::{Point3, Unit, UnitQuaternion, UnitVector3, Vector3};
use numeric_literals::replace_float_literals;

pub fn compute_orthonormal_vectors_3d<T: Real>(vector: &UnitVector3<T>) -> [UnitVector3<T>; 2] {
    // Ported from
    // https://github.com/dimforge/parry/blob/ac8dcf0197066cd2413a20e4420961b4694996c0/src/utils/wops.rs#L120-L138
    // originally based on the Pixar paper "Building an Orthonormal Basis, Revisited",
    // https://graphics.pixar.com/library/OrthonormalB/paper.pdf
    let v = vector;
    let sign = T::copysign(T::one(), v.z);
    let a = -T::one() / (sign + v.z);
    let b = v.x * v.y * a;

    [
        Vector3::new(T::one() + sign * v.x * v.x * a, sign * b, -sign * v.x),
        Vector3::new(b, sign + v.y * v.y * a, -v.y),
    ]
    .map(UnitVector3::new_unchecked)
}

/// Angle in `[0, pi]` between two vectors. Zero if either vector is (near) zero.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn angle_between<T: Real>(a: &Vector3<T>, b: &Vector3<T>) -> T {
    let l = (a.norm_squared() * b.norm_squared()).sqrt();
    if l <= T::default_epsilon() {
        return 0.0;
    }

    let cos = a.dot(b) / l;
    if cos >= 1.0 {
        0.0
    } else if cos <= -1.0 {
        T::pi()
    } else {
        cos.acos()
    }
}

/// Rotation by `angle` radians about `axis`, counter-clockwise when looking against the axis.
pub fn rotation_about_axis<T: Real>(axis: &Unit<Vector3<T>>, angle: T) -> UnitQuaternion<T> {
    UnitQuaternion::from_axis_angle(axis, angle)
}

/// The rotation taking `from` onto `to`. Opposite vectors rotate by pi about an arbitrary
/// perpendicular axis.
pub fn rotation_between<T: Real>(from: &Vector3<T>, to: &Vector3<T>) -> UnitQuaternion<T> {
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        let from = Unit::new_normalize(*from);
        let [perp, _] = compute_orthonormal_vectors_3d(&from);
        UnitQuaternion::from_axis_angle(&perp, T::pi())
    })
}

/// Polar coordinates `(theta, phi, r)`: azimuth `atan2(y, x)`, inclination `acos(z / r)` and
/// length. The zero vector maps to zero.
pub fn to_polar<T: Real>(v: &Vector3<T>) -> Vector3<T> {
    let r = v.norm();
    if r == T::zero() {
        Vector3::zeros()
    } else {
        Vector3::new(v.y.atan2(v.x), (v.z / r).acos(), r)
    }
}

/// Component-wise mean of a set of points, `None` if empty.
pub fn centroid<'a, T: Real>(points: impl IntoIterator<Item = &'a Point3<T>>) -> Option<Point3<T>> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for p in points {
        sum += p.coords;
        count += 1;
    }
    (count > 0).then(|| Point3::from(sum / T::from_usize(count).unwrap()))
}
