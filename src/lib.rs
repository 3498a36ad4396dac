//! Element catalog, shared matrices and concurrent mesh and image algorithms.
//!
//! The building blocks are named, typed [`matrix::Matrix`] values which can be shared between the
//! workers of a [`concurrency::WorkerPool`], element types looked up by name from a global
//! [`element`] catalog, and [`dataset::Dataset`]s tying node, index and field matrices together.
//! On top of these sit the algorithms: hemisphere mesh generation from contours with AHA region
//! labelling ([`mesh`]), contour rasterization and resampling of image stacks ([`image`]),
//! application of motion tracks ([`motion`]), strain estimation ([`strain`]) and region-wise
//! volume, thickness and displacement analysis ([`region`]).
pub mod concurrency;
pub mod dataset;
pub mod element;
pub mod error;
pub mod image;
pub mod io;
pub mod matrix;
pub mod mesh;
pub mod motion;
pub mod region;
pub mod strain;
pub mod util;

pub mod geometry {
    pub use eidolon_geometry::*;
}

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use error::{Error, Result};

pub extern crate nalgebra;
pub extern crate vtkio;
