mod concurrency;
mod dataset;
mod image;
mod mesh;
mod motion;
mod region;
mod strain;
mod vtk;
