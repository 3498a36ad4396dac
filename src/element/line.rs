//! Line-only bases: modal polynomial, Bezier and spectral (Gauss-Lobatto-Legendre) lines.
use super::lagrange::PolynomialBasis;
use super::{BasisEvaluator, BasisFamily, ElementType, GeomType, NodeLayout, Xi};
use crate::error::{Error, Result};
use crate::util::{bern, binom};

const GLL_TOLERANCE: f64 = 1e-14;
const GLL_MAX_ITERATIONS: usize = 100;

fn require_line(name: &str, geom: GeomType) -> Result<()> {
    if geom == GeomType::Line {
        Ok(())
    } else {
        Err(Error::basis(name, "only line geometry is supported by this basis"))
    }
}

/// Nodes `0, 1/order, ..., 1` with the two end points as vertices.
fn uniform_line_layout(order: usize) -> NodeLayout {
    NodeLayout {
        xis: (0..=order).map(|i| [i as f64 / order as f64, 0.0, 0.0]).collect(),
        vertices: vec![0, order],
        ..NodeLayout::default()
    }
}

/// Jacobi polynomial `P_n^(a, b)(x)`.
pub(crate) fn jacobi_poly(n: u64, a: u64, b: u64, x: f64) -> f64 {
    let ax = 0.5 * (x - 1.0);
    let bx = 0.5 * (x + 1.0);
    (0..=n)
        .map(|s| binom(n + a, s) * binom(n + b, n - s) * ax.powi((n - s) as i32) * bx.powi(s as i32))
        .sum()
}

/// The `n`th of `order + 1` modal shape functions at `x` in `[-1, 1]`.
fn modal_poly(n: usize, order: usize, x: f64) -> f64 {
    let a = 0.5 * (1.0 - x);
    let b = 0.5 * (1.0 + x);
    if n == 0 {
        a
    } else if n < order {
        a * b * jacobi_poly((n - 1) as u64, 1, 1, x)
    } else if n == order {
        b
    } else {
        0.0
    }
}

pub(super) fn modal_coeffs(order: usize, xi: f64) -> Vec<f64> {
    (0..=order).map(|n| modal_poly(n, order, xi * 2.0 - 1.0)).collect()
}

pub(super) fn bezier_coeffs(order: usize, xi: f64) -> Vec<f64> {
    (0..=order).map(|i| bern(order as u64, i as u64, xi)).collect()
}

pub(crate) fn modal_poly_line_type(name: &str, geom: GeomType, order: usize) -> Result<ElementType> {
    require_line(name, geom)?;
    Ok(ElementType::assemble(
        geom,
        BasisFamily::ModalPolyLine,
        order,
        uniform_line_layout(order),
        None,
        BasisEvaluator::Modal { order },
    ))
}

/// A Bezier line passing through its first and last control points.
pub(crate) fn bezier_line_type(name: &str, geom: GeomType, order: usize) -> Result<ElementType> {
    require_line(name, geom)?;
    Ok(ElementType::assemble(
        geom,
        BasisFamily::BezierLine,
        order,
        uniform_line_layout(order),
        None,
        BasisEvaluator::Bezier { order },
    ))
}

/// Gauss-Lobatto-Legendre nodes of the given order on `[0, 1]`, ascending.
///
/// These are the end points plus the roots of the derivative of the Legendre polynomial of degree
/// `order`, found by Newton iteration from the Chebyshev-Gauss-Lobatto points.
pub(crate) fn gll_nodes(name: &str, order: usize) -> Result<Vec<f64>> {
    let n = order;
    let mut x: Vec<f64> = (0..=n)
        .map(|i| (std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect();

    for iteration in 0..=GLL_MAX_ITERATIONS {
        let mut max_delta: f64 = 0.0;
        for xi in x.iter_mut() {
            // Legendre recurrence up to P_n
            let (mut p_prev, mut p) = (1.0, *xi);
            for j in 2..=n {
                let next = ((2 * j - 1) as f64 * *xi * p - (j - 1) as f64 * p_prev) / j as f64;
                p_prev = p;
                p = next;
            }
            let delta = if n == 1 { 0.0 } else { (*xi * p - p_prev) / ((n + 1) as f64 * p) };
            *xi -= delta;
            max_delta = max_delta.max(delta.abs());
        }

        if max_delta < GLL_TOLERANCE {
            break;
        }
        if iteration == GLL_MAX_ITERATIONS {
            return Err(Error::basis(
                name,
                format!("node iteration did not converge, last correction {:e}", max_delta),
            ));
        }
    }

    let mut nodes: Vec<f64> = x.iter().map(|v| (v + 1.0) * 0.5).collect();
    nodes.sort_by(|a, b| a.total_cmp(b));
    nodes[0] = 0.0;
    nodes[n] = 1.0;
    Ok(nodes)
}

/// A spectral line: the Lagrange interpolant through the Gauss-Lobatto-Legendre nodes.
pub(crate) fn spectral_line_type(name: &str, geom: GeomType, order: usize) -> Result<ElementType> {
    require_line(name, geom)?;
    let xis: Vec<Xi> = gll_nodes(name, order)?
        .into_iter()
        .map(|x| [x, 0.0, 0.0])
        .collect();
    let exponents = (0..=order as i32).map(|e| [e, 0, 0]).collect();
    let basis = PolynomialBasis::interpolating(name, &xis, exponents)?;

    let layout = NodeLayout {
        xis,
        vertices: vec![0, order],
        ..NodeLayout::default()
    };
    Ok(ElementType::assemble(
        geom,
        BasisFamily::SpectralLine,
        order,
        layout,
        None,
        BasisEvaluator::Polynomial(basis),
    ))
}
