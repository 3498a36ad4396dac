//! Parallel execution runtime.
//!
//! A job over a range of rows is split into contiguous parts handed to the workers of a
//! [`WorkerPool`]. Workers of a job can synchronize on a [`Barrier`] and exchange named objects.
//! If one worker fails, the others are released from the barrier and every result of the job
//! becomes the failure, and jobs queued behind it are cancelled.
//!
//! Large matrices handed to workers are marked shared for the duration of the job, see
//! [`ShareScope`].
use crate::error::Result;
use crate::matrix::Shareable;

mod barrier;
mod future;
mod pool;
mod subprocess;

pub use barrier::Barrier;
pub use future::{Future, FutureGuard, TaskQueue};
pub use pool::{
    check_result_map, list_results, partition, sum_result_map, ObjectSharer, Progress, ResultMap, Worker, WorkerPool,
};
pub use subprocess::{exec_batch_program, BatchOutput, BatchProgram};

/// Marks matrices as shared while alive.
///
/// Matrices that were private when the scope was opened are returned to private use when it is
/// finished or dropped. Matrices already shared are left alone.
pub struct ShareScope<'a> {
    matrices: Vec<&'a dyn Shareable>,
}

impl<'a> ShareScope<'a> {
    pub fn new(matrices: &[&'a dyn Shareable]) -> Self {
        let matrices: Vec<_> = matrices.iter().copied().filter(|m| !m.is_shared()).collect();
        for m in &matrices {
            m.share();
        }
        Self { matrices }
    }

    /// Unshares the matrices, failing with [`ResourceBusy`](crate::Error::ResourceBusy) if a
    /// worker still holds a handle to one of them.
    pub fn finish(mut self) -> Result<()> {
        let matrices = std::mem::take(&mut self.matrices);
        let mut result = Ok(());
        for m in matrices {
            if let Err(e) = m.unshare() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl<'a> Drop for ShareScope<'a> {
    fn drop(&mut self) {
        for m in self.matrices.drain(..) {
            if let Err(e) = m.unshare() {
                log::warn!("Matrix {:?} left shared: {}", m.matrix_name(), e);
            }
        }
    }
}
