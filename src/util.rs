//! Small numeric helpers shared by the algorithms.
use itertools::Itertools;
use nalgebra::Vector3;
use num::{Float, ToPrimitive};
use std::ops::{Add, Mul, Sub};

/// Linear interpolation, `val == 0` gives `v1`.
pub fn lerp<V>(val: f64, v1: V, v2: V) -> V
where
    V: Copy + Add<Output = V> + Sub<Output = V> + Mul<f64, Output = V>,
{
    v1 + (v2 - v1) * val
}

/// The xi value of `val` in the range `[minv, maxv]`, so that `lerp(lerp_xi(v, a, b), a, b) == v`.
///
/// Returns `val` itself if the range is empty or inverted.
pub fn lerp_xi(val: f64, minv: f64, maxv: f64) -> f64 {
    if minv >= maxv {
        val
    } else {
        (val - minv) / (maxv - minv)
    }
}

pub fn clamp<T: PartialOrd>(val: T, minv: T, maxv: T) -> T {
    if val > maxv {
        maxv
    } else if val < minv {
        minv
    } else {
        val
    }
}

/// Mean of the values, `0` if there are none.
pub fn avg<'a>(vals: impl IntoIterator<Item = &'a f64>) -> f64 {
    let (sum, count) = vals
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Mean of a set of vectors, the zero vector if there are none.
pub fn avg_vec<'a>(vals: impl IntoIterator<Item = &'a Vector3<f64>>) -> Vector3<f64> {
    let (sum, count) = vals
        .into_iter()
        .fold((Vector3::zeros(), 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        sum
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation (n - 1 denominator), `0` for fewer than two values.
pub fn stddev(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return 0.0;
    }
    let a = avg(vals);
    let sum: f64 = vals.iter().map(|v| (v - a).powi(2)).sum();
    (sum / (vals.len() - 1) as f64).sqrt()
}

/// Mean of the values lying within `k` standard deviations of the mean.
///
/// Outliers beyond the range are dropped before averaging. Empty input gives `0`.
pub fn avg_dev_range(vals: &[f64], k: f64) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    let a = avg(vals);
    let range = stddev(vals) * k;
    avg(vals.iter().filter(|v| (*v - a).abs() <= range))
}

/// Mean difference between successive values.
pub fn avg_span(vals: &[f64]) -> f64 {
    let spans: Vec<f64> = vals.iter().tuple_windows().map(|(a, b)| b - a).collect();
    avg(&spans)
}

/// Minimum and maximum of the values, `None` if empty. NaN values are skipped.
pub fn min_max<T: Float>(vals: impl IntoIterator<Item = T>) -> Option<(T, T)> {
    vals.into_iter().filter(|v| !v.is_nan()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Lowest indices of the minimal and maximal values.
pub fn min_max_indices<T: PartialOrd + Copy>(vals: &[T]) -> Option<(usize, usize)> {
    let first = *vals.first()?;
    let (mut min_idx, mut max_idx) = (0, 0);
    let (mut lo, mut hi) = (first, first);
    for (i, &v) in vals.iter().enumerate().skip(1) {
        if v < lo {
            lo = v;
            min_idx = i;
        } else if v > hi {
            hi = v;
            max_idx = i;
        }
    }
    Some((min_idx, max_idx))
}

/// Indices `0..n` rotated so that `start` comes first.
pub fn rotate_indices(start: usize, n: usize) -> Vec<usize> {
    (0..n).map(|i| (i + start) % n).collect()
}

/// Windows of `width` successive items. With `cyclic` the windows wrap around so that there is one
/// window starting at every item.
///
/// # Panics
///
/// Panics if `width < 2`.
pub fn successive<T: Clone>(items: &[T], width: usize, cyclic: bool) -> Vec<Vec<T>> {
    assert!(width > 1, "Window width must be at least 2");
    let n = items.len();
    if cyclic {
        if n == 0 {
            return Vec::new();
        }
        (0..n)
            .map(|i| (0..width).map(|j| items[(i + j) % n].clone()).collect())
            .collect()
    } else if n < width {
        Vec::new()
    } else {
        items.windows(width).map(|w| w.to_vec()).collect()
    }
}

/// Binomial coefficient by the multiplicative formula.
pub fn binom(n: u64, k: u64) -> f64 {
    if k > n {
        return 0.0;
    }
    (1..=k).fold(1.0, |acc, i| acc * (n - (k - i)) as f64 / i as f64)
}

/// Bernstein polynomial `binom(n, i) * u^i * (1 - u)^(n - i)`.
pub fn bern(n: u64, i: u64, u: f64) -> f64 {
    binom(n, i) * u.powi(i as i32) * (1.0 - u).powi((n - i) as i32)
}

/// Flattened index into an array of dimensions `dims`, first axis fastest.
///
/// Each coordinate wraps modulo its dimension when the axis is circular and is clamped into range
/// otherwise.
pub fn array_index(inds: &[i64], dims: &[usize], circular: &[bool]) -> usize {
    let mut stride = 1;
    let mut result = 0;
    for ((&i, &d), &c) in inds.iter().zip(dims).zip(circular) {
        let d = d as i64;
        let i = if c { i.rem_euclid(d) } else { clamp(i, 0, d - 1) };
        result += i as usize * stride;
        stride *= d as usize;
    }
    result
}

/// Converts xi coordinates over a whole control grid into the local xi within one sub-element and
/// the grid index of that sub-element's origin control point.
///
/// `limits` gives per axis how many grid layers at the start and end are control points only. The
/// default `(1, 1)` means the first and last layers are not interpolated through.
pub fn xis_to_piecewise_xis(xis: &[f64], dims: &[usize], limits: &[(i64, i64)]) -> (Vec<f64>, Vec<i64>) {
    xis.iter()
        .zip(dims)
        .enumerate()
        .map(|(axis, (&x, &d))| {
            let (lmin, lmax) = limits.get(axis).copied().unwrap_or((1, 1));
            let xx = x * (d as i64 - lmax - lmin - 1) as f64;
            let ixx = xx.trunc();
            (xx - ixx, ixx.to_i64().unwrap_or(0) + lmin)
        })
        .unzip()
}

/// Inverse of [`xis_to_piecewise_xis`].
pub fn piecewise_xis_to_xis(pxis: &[f64], indices: &[i64], dims: &[usize], limits: &[(i64, i64)]) -> Vec<f64> {
    pxis.iter()
        .zip(indices)
        .zip(dims)
        .enumerate()
        .map(|(axis, ((&px, &index), &d))| {
            let (lmin, lmax) = limits.get(axis).copied().unwrap_or((1, 1));
            let span = (d as i64 - lmax - lmin - 1) as f64;
            if span == 0.0 {
                px
            } else {
                ((index - lmin) as f64 + px) / span
            }
        })
        .collect()
}

/// Float range `[start, stop)` with the given step, accumulated with compensated summation so that
/// long ranges do not drift.
pub fn frange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    let eps = 1e-10;
    let mut result = Vec::new();
    if step <= 0.0 || stop - start <= eps {
        return result;
    }

    let mut total = start;
    let mut compensation = 0.0;
    while total < stop - eps {
        result.push(total);
        let y = step - compensation;
        let t = total + y;
        compensation = (t - total) - y;
        total = t;
    }
    result
}
