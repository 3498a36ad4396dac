//! Cubic Hermite and Catmull-Rom bases on fixed 4^d control grids, and the piecewise Catmull-Rom
//! basis spanning arbitrary control grids.
use super::{BasisEvaluator, BasisFamily, ControlGrid, ElementType, GeomType, NodeLayout, Xi};
use crate::error::{Error, Result};
use crate::util::{array_index, xis_to_piecewise_xis};
use itertools::Itertools;
use std::sync::Arc;

/// Hermite coefficients for values at `t = -1, 0, 1, 2`, where the outer two stand for the
/// derivatives at 0 and 1.
pub(crate) fn hermite_coeffs_1d(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [t3 - 2.0 * t2 + t, 2.0 * t3 - 3.0 * t2 + 1.0, -2.0 * t3 + 3.0 * t2, t3 - t2]
}

/// Catmull-Rom coefficients (tension 0.5) for values at `t = -1, 0, 1, 2`.
pub(crate) fn catmull_rom_coeffs_1d(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        t2 - 0.5 * t - 0.5 * t3,
        1.5 * t3 - 2.5 * t2 + 1.0,
        2.0 * t2 + 0.5 * t - 1.5 * t3,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Tensor product of a 1D basis over `dim` axes, first axis fastest.
pub(crate) fn tensor_coeffs(basis: fn(f64) -> [f64; 4], dim: usize, xi: &Xi) -> Vec<f64> {
    let per_axis: Vec<[f64; 4]> = (0..dim).map(|d| basis(xi[d])).collect();
    let mut result = vec![1.0];
    for axis in per_axis {
        result = axis
            .iter()
            .flat_map(|c| result.iter().map(move |r| r * c))
            .collect();
    }
    result
}

/// Control point xis of a `4^dim` grid over `{-1, 0, 1, 2}`, first axis fastest.
fn grid_xis(dim: usize) -> Vec<Xi> {
    (0..dim)
        .map(|_| [-1.0, 0.0, 1.0, 2.0])
        .multi_cartesian_product()
        .map(|v| {
            let mut xi = [0.0; 3];
            for (d, x) in v.iter().rev().enumerate() {
                xi[d] = *x;
            }
            xi
        })
        .collect()
}

const HEX_FACES: [[usize; 17]; 6] = [
    [16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 42],
    [4, 5, 6, 7, 20, 21, 22, 23, 36, 37, 38, 39, 52, 53, 54, 55, 42],
    [1, 5, 9, 13, 17, 21, 25, 29, 33, 37, 41, 45, 49, 53, 57, 61, 42],
    [32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 21],
    [8, 9, 10, 11, 24, 25, 26, 27, 40, 41, 42, 43, 56, 57, 58, 59, 21],
    [2, 6, 10, 14, 18, 22, 26, 30, 34, 38, 42, 46, 50, 54, 58, 62, 21],
];

const HEX_INTERNAL_XIS: [Xi; 6] = [
    [0.01, 0.0, 0.0],
    [0.0, 0.01, 0.0],
    [0.0, 0.0, 0.01],
    [-0.01, 0.0, 0.0],
    [0.0, -0.01, 0.0],
    [0.0, 0.0, -0.01],
];

/// Cubic Hermite or Catmull-Rom type. The order is fixed by the geometry: 1 for lines, 2 for
/// quads and 3 for hexahedra.
pub(crate) fn fixed_grid_type(name: &str, geom: GeomType, family: BasisFamily) -> Result<ElementType> {
    let (order, vertices, faces, internal_xis, face_type) = match geom {
        GeomType::Line => (1, vec![1, 2], Vec::new(), Vec::new(), None),
        GeomType::Quad => (2, vec![5, 6, 9, 10], vec![(0..16).collect()], Vec::new(), None),
        GeomType::Hex => {
            let face_name = super::type_name(GeomType::Quad, family, 2);
            (
                3,
                vec![21, 22, 25, 26, 37, 38, 41, 42],
                HEX_FACES.iter().map(|f| f.to_vec()).collect(),
                HEX_INTERNAL_XIS.to_vec(),
                Some(Arc::new(fixed_grid_type(&face_name, GeomType::Quad, family)?)),
            )
        }
        _ => return Err(Error::basis(name, format!("unsupported geometry {}", geom.full_name()))),
    };

    let evaluator = match family {
        BasisFamily::CubicHermite => BasisEvaluator::Hermite { dim: order },
        _ => BasisEvaluator::CatmullRom { dim: order },
    };
    let layout = NodeLayout {
        xis: grid_xis(order),
        vertices,
        faces,
        internal_xis,
    };
    Ok(ElementType::assemble(geom, family, order, layout, face_type, evaluator))
}

/// A piecewise Catmull-Rom type treating a control grid as one object with a continuous xi space.
pub(crate) fn piecewise_catmull_rom_type(name: &str, geom: GeomType) -> Result<ElementType> {
    let base_name = super::type_name(geom, BasisFamily::CatmullRom, geom.dim());
    let base = fixed_grid_type(&base_name, geom, BasisFamily::CatmullRom)
        .map_err(|_| Error::basis(name, format!("unsupported geometry {}", geom.full_name())))?;
    let order = base.order();
    let face_type = if order >= 3 {
        let face_name = super::type_name(GeomType::Quad, BasisFamily::PiecewiseCatmullRom, 2);
        Some(Arc::new(piecewise_catmull_rom_type(&face_name, GeomType::Quad)?))
    } else {
        None
    };

    Ok(ElementType::assemble(
        geom,
        BasisFamily::PiecewiseCatmullRom,
        order,
        NodeLayout::default(),
        face_type,
        BasisEvaluator::Piecewise { base: Arc::new(base) },
    ))
}

/// Coefficients against the flattened control grid for a xi over the whole grid.
///
/// The xi selects a sub-element and a local xi within it. The base type's coefficients at the local
/// xi are added to the grid points found by offsetting the sub-element origin by each base node's
/// integer xi, wrapping on circular axes and clamping on the others.
pub(crate) fn piecewise_coeffs(base: &ElementType, xi: &Xi, grid: &ControlGrid) -> Result<Vec<f64>> {
    let dim = base.dim();
    if grid.dims[..dim].iter().any(|&d| d == 0) {
        return Err(Error::basis(base.name(), format!("empty control grid {:?}", grid.dims)));
    }

    let limits = grid.limits.unwrap_or([(1, 1); 3]);
    let (pxis, indices) = xis_to_piecewise_xis(xi, &grid.dims, &limits);
    let base_coeffs = base.basis([pxis[0], pxis[1], pxis[2]])?;

    let mut coeffs = vec![0.0; grid.len()];
    for (node_xi, c) in base.xis().iter().zip(base_coeffs) {
        let inds: Vec<i64> = (0..dim).map(|d| indices[d] + node_xi[d] as i64).collect();
        coeffs[array_index(&inds, &grid.dims, &grid.circular)] += c;
    }
    Ok(coeffs)
}
