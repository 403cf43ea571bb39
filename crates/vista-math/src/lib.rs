//! World-space math shared by the terrain streaming crates.
//!
//! The terrain lives on the XY plane with Z pointing up; heights are Z values.

mod aabb;

pub use aabb::{Aabb, Quadrant};
