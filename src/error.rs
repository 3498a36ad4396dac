use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
///
/// Variants carry the name of the matrix, dataset or element type involved where there is one.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Out-of-range matrix access.
    Index {
        name: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    /// Incompatible matrix shapes, or a shape change that is not allowed.
    Shape { name: String, message: String },
    /// Unknown element type name or wrong number of control values.
    Basis { name: String, message: String },
    /// Degenerate or otherwise unusable geometric input.
    Geometry { name: String, message: String },
    /// A job body failed in a worker.
    Worker { worker: usize, message: String },
    /// A peer worker failed while this worker was waiting at a barrier.
    PeerFailed { worker: usize },
    /// A shared matrix still has outstanding references.
    ResourceBusy { name: String, references: usize },
    /// A native tool exited with a non-zero code.
    ExternalTool { code: i32, output: String },
    /// A native tool was killed after exceeding its deadline.
    Timeout { program: String, output: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn shape(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shape {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn basis(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Basis {
            name: name.into(),
            message: message.into(),
        }
    }

    pub(crate) fn geometry(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Geometry {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Exit code reported for failed or timed out external tool runs, `None` otherwise.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExternalTool { code, .. } => Some(*code),
            Self::Timeout { .. } => Some(1),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index {
                name,
                row,
                col,
                rows,
                cols,
            } => write!(
                f,
                "Index ({}, {}) out of range for matrix {:?} of shape {}x{}",
                row, col, name, rows, cols
            ),
            Self::Shape { name, message } => write!(f, "Shape error in {:?}: {}", name, message),
            Self::Basis { name, message } => write!(f, "Basis error for {:?}: {}", name, message),
            Self::Geometry { name, message } => write!(f, "Geometry error in {:?}: {}", name, message),
            Self::Worker { worker, message } => write!(f, "Worker {} failed: {}", worker, message),
            Self::PeerFailed { worker } => {
                write!(f, "Worker {} left barrier because a sibling worker failed", worker)
            }
            Self::ResourceBusy { name, references } => write!(
                f,
                "Matrix {:?} is still referenced {} time(s) and cannot be unshared",
                name, references
            ),
            Self::ExternalTool { code, output } => {
                write!(f, "External tool exited with code {}:\n{}", code, output)
            }
            Self::Timeout { program, output } => {
                write!(f, "Program {:?} failed to complete in time\n{}", program, output)
            }
        }
    }
}

impl std::error::Error for Error {}
