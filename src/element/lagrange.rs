//! Nodal Lagrange bases built from a monomial Vandermonde system.
use super::{BasisEvaluator, BasisFamily, ElementType, GeomType, NodeLayout, Xi, FACE_XI_OFFSET};
use crate::error::{Error, Result};
use crate::util::lerp_xi;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::sync::Arc;

const XI_EPS: f64 = 1e-10;

/// A basis given as a sum of monomials per node.
///
/// The coefficient of node `i` at `xi` is `sum_j coeffs[(i, j)] * prod_d xi[d]^exponents[j][d]`.
#[derive(Debug, Clone)]
pub(crate) struct PolynomialBasis {
    exponents: Vec<[i32; 3]>,
    coeffs: DMatrix<f64>,
    max_exponent: usize,
}

impl PolynomialBasis {
    /// Solves for the coefficients which interpolate each node at its own xi coordinate.
    pub fn interpolating(name: &str, xis: &[Xi], exponents: Vec<[i32; 3]>) -> Result<Self> {
        let k = xis.len();
        if exponents.len() != k {
            return Err(Error::basis(
                name,
                format!("{} monomials given for {} nodes", exponents.len(), k),
            ));
        }

        let vandermonde = DMatrix::from_fn(k, k, |i, j| monomial(&xis[i], &exponents[j]));
        let inverse = vandermonde
            .try_inverse()
            .ok_or_else(|| Error::basis(name, "node xi coordinates give a singular Vandermonde matrix"))?;
        let max_exponent = exponents
            .iter()
            .flat_map(|e| e.iter())
            .copied()
            .max()
            .unwrap_or(0) as usize;

        Ok(Self {
            exponents,
            coeffs: inverse.transpose(),
            max_exponent,
        })
    }

    pub fn evaluate(&self, xi: &Xi) -> Vec<f64> {
        let mut powers = vec![[1.0; 3]; self.max_exponent + 1];
        for e in 1..=self.max_exponent {
            for d in 0..3 {
                powers[e][d] = powers[e - 1][d] * xi[d];
            }
        }

        let monomials = DVector::from_iterator(
            self.exponents.len(),
            self.exponents.iter().map(|exp| {
                (0..3)
                    .map(|d| powers[exp[d] as usize][d])
                    .product::<f64>()
            }),
        );
        (&self.coeffs * monomials).iter().copied().collect()
    }
}

fn monomial(xi: &Xi, exponent: &[i32; 3]) -> f64 {
    xi.iter().zip(exponent).map(|(x, &e)| x.powi(e)).product()
}

/// Exponent tuples of a Lagrange basis of the given order in CHeart node order.
///
/// Every tuple of components in `[0, order]` is listed, limited to component sums of at most
/// `order` for simplices. Corner tuples come first, then the rest ordered with the last component
/// most significant.
pub(crate) fn lagrange_beta(order: usize, dim: usize, simplex: bool) -> Vec<[i32; 3]> {
    let order = order as i32;
    let mut beta: Vec<[i32; 3]> = (0..dim)
        .map(|_| 0..=order)
        .multi_cartesian_product()
        .filter(|v| !simplex || v.iter().sum::<i32>() <= order)
        .map(|v| {
            let mut b = [0; 3];
            b[..dim].copy_from_slice(&v);
            b
        })
        .collect();

    let is_corner = |b: &[i32; 3]| b.iter().all(|&c| c == 0 || c == order);
    beta.sort_by(|a, b| match (is_corner(a), is_corner(b)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.iter().rev().cmp(b.iter().rev()),
    });
    beta
}

fn xi_coords(order: usize, beta: &[[i32; 3]]) -> Vec<Xi> {
    let order = order as f64;
    beta.iter()
        .map(|b| [b[0] as f64 / order, b[1] as f64 / order, b[2] as f64 / order])
        .collect()
}

/// Axis-aligned faces of a 3D type with unit xi coordinates, plus the slanted face of a simplex.
///
/// Each face lists the nodes lying on it followed by a vertex that does not. Faces are sorted
/// lexicographically; the second result holds the internal xi offset of each face.
pub(crate) fn find_faces(xis: &[Xi], num_vertices: usize, simplex: bool) -> (Vec<Vec<usize>>, Vec<Xi>) {
    let far_node = |face: &[usize], at_start: bool| {
        let off_face: Vec<usize> = (0..num_vertices).filter(|i| !face.contains(i)).collect();
        if at_start {
            off_face.last().copied()
        } else {
            off_face.first().copied()
        }
    };

    let ranges: &[f64] = if simplex { &[0.0] } else { &[0.0, 1.0] };
    let mut faces = Vec::new();

    for dim in 0..3 {
        for &range in ranges {
            let face: Vec<usize> = (0..xis.len())
                .filter(|&n| (xis[n][dim] - range).abs() < XI_EPS)
                .collect();
            if let Some(far) = far_node(&face, range == 0.0) {
                if !face.is_empty() {
                    let mut internal = [0.0; 3];
                    internal[dim] = if range == 1.0 { FACE_XI_OFFSET } else { -FACE_XI_OFFSET };
                    faces.push((face.into_iter().chain([far]).collect::<Vec<_>>(), internal));
                }
            }
        }
    }

    if simplex {
        let face: Vec<usize> = (0..xis.len())
            .filter(|&n| (xis[n].iter().sum::<f64>() - 1.0).abs() < XI_EPS)
            .collect();
        if let Some(far) = far_node(&face, true) {
            faces.push((face.into_iter().chain([far]).collect(), [FACE_XI_OFFSET; 3]));
        }
    }

    faces.sort_by(|a, b| a.0.cmp(&b.0));
    faces.into_iter().unzip()
}

/// Edges between pairs of vertices of a 2D type, each listing the two vertices then the nodes
/// between them. Diagonals of non-simplex types are skipped.
pub(crate) fn find_edges(xis: &[Xi], vertices: &[usize], simplex: bool) -> Vec<Vec<usize>> {
    let crosses_midpoint = |a: &Xi, b: &Xi| {
        let count = a
            .iter()
            .zip(b)
            .filter(|(i, j)| (*i * 0.5 + *j * 0.5 - 0.5).abs() < XI_EPS)
            .count();
        count >= 2
    };

    let is_line_point = |p: &Xi, t: f64, start: &Xi, end: &Xi| {
        (0..3).all(|d| (start[d] + (end[d] - start[d]) * t - p[d]).abs() < XI_EPS)
    };

    let is_between = |a: &Xi, start: &Xi, end: &Xi| {
        let within = (0..3).all(|d| {
            let (lo, hi) = if start[d] <= end[d] { (start[d], end[d]) } else { (end[d], start[d]) };
            lo <= a[d] && a[d] <= hi
        });
        if !within {
            return false;
        }
        let t = (0..3)
            .map(|d| if start[d] != end[d] { lerp_xi(a[d], start[d], end[d]) } else { 0.0 })
            .fold(f64::MIN, f64::max);
        is_line_point(a, t, start, end) || is_line_point(a, t, end, start)
    };

    let mut found: Vec<(usize, usize)> = Vec::new();
    let mut edges = Vec::new();

    for (&v1, &v2) in vertices.iter().cartesian_product(vertices) {
        if v1 == v2 || found.contains(&(v1, v2)) {
            continue;
        }
        let (xi1, xi2) = (&xis[v1], &xis[v2]);
        if simplex || !crosses_midpoint(xi1, xi2) {
            let mids = (0..xis.len()).filter(|&i| i != v1 && i != v2 && is_between(&xis[i], xi1, xi2));
            edges.push([v1, v2].into_iter().chain(mids).collect());
            found.push((v1, v2));
            found.push((v2, v1));
        }
    }
    edges
}

pub(crate) fn nodal_lagrange_type(geom: GeomType, order: usize) -> Result<ElementType> {
    if geom == GeomType::Point {
        return Ok(ElementType::point());
    }

    let name = super::type_name(geom, BasisFamily::NodalLagrange, order);
    let dim = geom.dim();
    let simplex = geom.is_simplex();
    let num_vertices = geom.num_vertices();

    let beta = lagrange_beta(order, dim, simplex);
    let xis = xi_coords(order, &beta);
    let basis = PolynomialBasis::interpolating(&name, &xis, beta)?;

    let (faces, internal_xis) = match dim {
        3 => find_faces(&xis, num_vertices, simplex),
        2 => (vec![(0..xis.len()).collect()], Vec::new()),
        _ => (Vec::new(), Vec::new()),
    };

    let face_type = if dim == 3 {
        let face_geom = if simplex { GeomType::Tri } else { GeomType::Quad };
        Some(Arc::new(nodal_lagrange_type(face_geom, order)?))
    } else {
        None
    };

    let layout = NodeLayout {
        xis,
        vertices: (0..num_vertices).collect(),
        faces,
        internal_xis,
    };

    Ok(ElementType::assemble(
        geom,
        BasisFamily::NodalLagrange,
        order,
        layout,
        face_type,
        BasisEvaluator::Polynomial(basis),
    ))
}
