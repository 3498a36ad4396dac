use eidolon_geometry::convex_hull_2d;
use nalgebra::{point, Point2};
use proptest::prelude::*;

#[test]
fn hull_of_square_with_interior_points() {
    let points = [
        point![0.5, 0.5],
        point![0.0, 0.0],
        point![1.0, 1.0],
        point![0.25, 0.75],
        point![1.0, 0.0],
        point![0.0, 1.0],
        // On an edge
        point![0.5, 0.0],
    ];
    let hull = convex_hull_2d(&points);
    assert_eq!(hull, vec![1, 4, 2, 5]);
}

#[test]
fn hull_of_degenerate_input() {
    let empty: [Point2<f64>; 0] = [];
    assert!(convex_hull_2d(&empty).is_empty());

    let duplicates = [point![1.0, 2.0], point![1.0, 2.0]];
    assert_eq!(convex_hull_2d(&duplicates).len(), 1);
}

proptest! {
    #[test]
    fn hull_contains_all_points(coords in proptest::collection::vec((-10.0..10.0, -10.0..10.0), 3..40)) {
        let points: Vec<Point2<f64>> = coords.iter().map(|&(x, y)| point![x, y]).collect();
        let hull = convex_hull_2d(&points);
        prop_assume!(hull.len() >= 3);

        // Every point is to the left of (or on) every counter-clockwise hull edge
        for k in 0..hull.len() {
            let a = points[hull[k]];
            let b = points[hull[(k + 1) % hull.len()]];
            for p in &points {
                let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
                prop_assert!(cross >= -1e-9);
            }
        }
    }
}
