use super::{ElementType, Xi};
use crate::error::{Error, Result};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Vector3};

const MAX_ITERATIONS: usize = 50;
const STEP_TOLERANCE: f64 = 1e-12;
const FD_STEP: f64 = 1e-7;
const INSIDE_TOLERANCE: f64 = 1e-6;

fn map_xi(et: &ElementType, nodes: &[Vector3<f64>], xi: &Xi) -> Result<Vector3<f64>> {
    et.apply_basis(nodes, *xi)
}

fn is_inside(xi: &Xi, dim: usize, simplex: bool) -> bool {
    let in_unit = xi[..dim]
        .iter()
        .all(|&x| x >= -INSIDE_TOLERANCE && x <= 1.0 + INSIDE_TOLERANCE);
    in_unit && (!simplex || xi[..dim].iter().sum::<f64>() <= 1.0 + INSIDE_TOLERANCE)
}

/// Seeds for the Newton iteration: cell centers of a `samples^dim` grid over the reference cell.
fn seed_xis(dim: usize, samples: usize, simplex: bool) -> Vec<Xi> {
    let axis: Vec<f64> = (0..samples)
        .map(|i| (i as f64 + 0.5) / samples as f64)
        .collect();
    let mut seeds: Vec<Xi> = (0..dim)
        .map(|_| axis.iter().copied())
        .multi_cartesian_product()
        .filter(|v| !simplex || v.iter().sum::<f64>() <= 1.0)
        .map(|v| {
            let mut xi = [0.0; 3];
            xi[..dim].copy_from_slice(&v);
            xi
        })
        .collect();

    if seeds.is_empty() {
        let c = 1.0 / (dim + 1) as f64;
        let mut xi = [0.0; 3];
        xi[..dim].iter_mut().for_each(|x| *x = c);
        seeds.push(xi);
    }
    seeds
}

pub(super) fn point_search(
    et: &ElementType,
    nodes: &[Vector3<f64>],
    point: &Vector3<f64>,
    refine: usize,
) -> Result<Option<Xi>> {
    if !et.is_fixed_node_count() || nodes.len() != et.num_nodes() {
        return Err(Error::basis(
            et.name(),
            format!("point search needs {} element nodes, got {}", et.num_nodes(), nodes.len()),
        ));
    }
    let dim = et.dim();
    if dim == 0 {
        return Ok(None);
    }

    let mut best = None;
    for seed in seed_xis(dim, refine + 1, et.is_simplex()) {
        let dist = (map_xi(et, nodes, &seed)? - point).norm_squared();
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((seed, dist));
        }
    }
    let mut xi = match best {
        Some((xi, _)) => xi,
        None => return Ok(None),
    };

    for _ in 0..MAX_ITERATIONS {
        let residual = point - map_xi(et, nodes, &xi)?;
        let mut jacobian = DMatrix::zeros(3, dim);
        for d in 0..dim {
            let (mut fwd, mut bwd) = (xi, xi);
            fwd[d] += FD_STEP;
            bwd[d] -= FD_STEP;
            let column = (map_xi(et, nodes, &fwd)? - map_xi(et, nodes, &bwd)?) / (2.0 * FD_STEP);
            jacobian.set_column(d, &column);
        }

        let jt = jacobian.transpose();
        let rhs = &jt * DVector::from_column_slice(residual.as_slice());
        let step = match (&jt * &jacobian).lu().solve(&rhs) {
            Some(step) => step,
            None => break,
        };
        for d in 0..dim {
            xi[d] += step[d];
        }
        if step.norm() < STEP_TOLERANCE {
            break;
        }
    }

    let diameter = nodes
        .iter()
        .tuple_combinations()
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max);
    let error = (point - map_xi(et, nodes, &xi)?).norm();

    if error <= INSIDE_TOLERANCE * diameter.max(1.0) && is_inside(&xi, dim, et.is_simplex()) {
        xi[..dim]
            .iter_mut()
            .for_each(|x| *x = x.clamp(0.0, 1.0));
        Ok(Some(xi))
    } else {
        Ok(None)
    }
}
