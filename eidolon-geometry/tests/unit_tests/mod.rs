mod aabb;
mod contour;
mod hull;
mod primitives;
