use crate::Real;
use nalgebra::Point2;
use std::cmp::Ordering;

fn cross<T: Real>(o: &Point2<T>, a: &Point2<T>, b: &Point2<T>) -> T {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Computes the convex hull of a set of 2D points with Andrew's monotone chain.
///
/// Returns indices into `points` of the hull vertices in counter-clockwise order, starting from the
/// lexicographically smallest point. Points on hull edges are not included. Fewer than three distinct
/// points give the distinct points themselves.
pub fn convex_hull_2d<T: Real>(points: &[Point2<T>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&i, &j| {
        let (a, b) = (&points[i], &points[j]);
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    order.dedup_by(|i, j| points[*i] == points[*j]);

    if order.len() < 3 {
        return order;
    }

    let mut hull: Vec<usize> = Vec::with_capacity(2 * order.len());

    // Lower hull, then upper hull
    for pass in [order.clone(), order.iter().rev().copied().collect()] {
        let start = hull.len();
        for &i in &pass {
            while hull.len() >= start + 2
                && cross(&points[hull[hull.len() - 2]], &points[hull[hull.len() - 1]], &points[i]) <= T::zero()
            {
                hull.pop();
            }
            hull.push(i);
        }
        // The last point of each chain is the first point of the other
        hull.pop();
    }

    hull
}
