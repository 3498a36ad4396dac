//! Mesh generation over stacks of planar contours.
//!
//! Contours are sorted and aligned into a lattice of control points which is closed off at an apex.
//! A piecewise Catmull-Rom basis over that lattice maps the xi coordinates of a procedurally
//! generated hemisphere topology to world space. The resulting surfaces and volumes are labelled
//! with AHA regions.
use crate::concurrency::{check_result_map, Progress, ShareScope, WorkerPool};
use crate::element::{ControlGrid, ElementType};
use crate::error::{Error, Result};
use crate::matrix::{Shareable, Vec3Matrix};
use nalgebra::Vector3;
use std::sync::Arc;

mod aha;
mod contours;
mod hemisphere;
mod procedural;

pub use aha::*;
pub use contours::*;
pub use hemisphere::*;
pub use procedural::*;

/// Below this many rows [`apply_basis_concurrent`] runs serially.
const CONCURRENT_THRESHOLD: usize = 2000;

/// Evaluates `element_type` with the control values `ctrls` at every xi of `xis`, writing the
/// results into the same rows of `out`.
///
/// With a `grid` the type's piecewise basis is used. Rows are distributed over the workers of
/// `pool`, both matrices being shared for the duration of the job.
pub fn apply_basis_concurrent(
    pool: &WorkerPool,
    xis: &Vec3Matrix,
    out: &Vec3Matrix,
    ctrls: &[Vector3<f64>],
    element_type: &Arc<ElementType>,
    grid: Option<&ControlGrid>,
    progress: Option<Arc<Progress>>,
) -> Result<()> {
    let rows = xis.rows();
    if out.rows() != rows {
        return Err(Error::shape(
            out.name(),
            format!("output has {} rows but there are {} xi values", out.rows(), rows),
        ));
    }

    let scope = ShareScope::new(&[xis as &dyn Shareable, out]);
    let nparts = pool.choose_proc_count(rows, 0, CONCURRENT_THRESHOLD);
    let (xis_handle, out_handle) = (xis.handle(), out.handle());
    let ctrls = ctrls.to_vec();
    let element_type = Arc::clone(element_type);
    let grid = grid.cloned();

    let results = pool.run(rows, nparts, progress, move |worker| {
        for n in worker.progress_range() {
            worker.check_stop()?;
            let xi = xis_handle.get(n, 0)?;
            let xi = [xi.x, xi.y, xi.z];
            let value = match &grid {
                Some(grid) => element_type.apply_piecewise_basis(&ctrls, xi, grid)?,
                None => element_type.apply_basis(&ctrls, xi)?,
            };
            out_handle.set(value, n, 0)?;
        }
        Ok(())
    })?;

    check_result_map(&results)?;
    scope.finish()
}
