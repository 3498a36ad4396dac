//! Procedural triangulations of the unit sphere and hemisphere.
use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;
use std::f64::consts::PI;

/// Vertices and triangles of a triangulated surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleSurface {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleSurface {
    /// Splits every triangle into four by its edge midpoints, pushing new vertices onto the unit
    /// sphere. Edges shared by two triangles share their midpoint.
    pub fn subdivide_spherical(&self) -> Self {
        let mut vertices = self.vertices.clone();
        let mut midpoints: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point3<f64>>| {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = (vertices[a].coords + vertices[b].coords).normalize();
                vertices.push(Point3::from(m));
                vertices.len() - 1
            })
        };

        let mut triangles = Vec::with_capacity(self.triangles.len() * 4);
        for &[a, b, c] in &self.triangles {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            triangles.extend([[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]]);
        }

        Self { vertices, triangles }
    }

    fn subdivide_spherical_times(mut self, refine: usize) -> Self {
        for _ in 0..refine {
            self = self.subdivide_spherical();
        }
        self
    }
}

/// Triangulates the unit sphere by subdividing an icosahedron `refine` times, giving
/// `20 * 4^refine` outward facing triangles.
pub fn generate_sphere(refine: usize) -> TriangleSurface {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    let vertices = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|v| Point3::from(Vector3::from(*v).normalize()))
    .collect();

    let triangles = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    TriangleSurface { vertices, triangles }.subdivide_spherical_times(refine)
}

/// Number of equator vertices of the initial pole fan of [`generate_hemisphere`].
const HEMISPHERE_FAN: usize = 10;

/// Triangulates the upper unit hemisphere (`z >= 0`) by subdividing a fan of 10 triangles around
/// the pole `(0, 0, 1)` `refine` times, giving `10 * 4^refine` outward facing triangles.
///
/// The boundary stays on the equator since midpoints of equator edges are normalized within the
/// `z = 0` plane.
pub fn generate_hemisphere(refine: usize) -> TriangleSurface {
    let mut vertices = vec![Point3::new(0.0, 0.0, 1.0)];
    vertices.extend((0..HEMISPHERE_FAN).map(|k| {
        let angle = 2.0 * PI * k as f64 / HEMISPHERE_FAN as f64;
        Point3::new(angle.cos(), angle.sin(), 0.0)
    }));

    let triangles = (0..HEMISPHERE_FAN)
        .map(|k| [1 + k, 1 + (k + 1) % HEMISPHERE_FAN, 0])
        .collect();

    TriangleSurface { vertices, triangles }.subdivide_spherical_times(refine)
}

/// Maps a point on the unit sphere to xi coordinates over a hemisphere's control lattice.
///
/// The first component is the azimuth as a fraction of a full turn in `[0, 1)`. The second is 0 on
/// the equator and 1 at the pole `(0, 0, 1)`. The third is 0.
pub fn cart_to_polar_xi(point: &Vector3<f64>) -> Vector3<f64> {
    let polar = crate::geometry::util::to_polar(&Vector3::new(point.x, point.y, -point.z));
    let mut xi0 = polar.x / (2.0 * PI);
    if xi0 < 0.0 {
        xi0 += 1.0;
    }
    Vector3::new(xi0, (polar.y / PI - 0.5) * 2.0, 0.0)
}
