mod line;
mod plane;
mod ray;
mod tetrahedron;
mod triangle;

pub use line::*;
pub use plane::*;
pub use ray::*;
pub use tetrahedron::*;
pub use triangle::*;
