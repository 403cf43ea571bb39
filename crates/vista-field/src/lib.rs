//! Terrain field evaluation: height, blend mask and tree allowance sampled
//! from a sparse grid of raster sections, refined with fractal noise.
//!
//! Every query is a pure function of published, immutable section data and
//! is safe to call from any thread.

mod fbm;
mod field;
mod raster;
mod section;

pub use fbm::FractalNoise;
pub use field::{BlendMask, HeightSource, TerrainField};
pub use raster::{DetailMap, HeightRaster, MaskRaster, Raster, RasterError, TreeRaster};
pub use section::{Section, SectionCoord};
