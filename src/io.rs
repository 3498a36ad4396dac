//! File formats: VTK datasets and literal configuration files.
pub mod config;
pub mod vtk;
