//! Process-wide terrain field: sparse sections of rasters plus procedural
//! refinement, queried by world XY.

use std::sync::Arc;

use dashmap::DashMap;
use glam::DVec3;
use tracing::debug;
use vista_config::FieldConfig;
use vista_math::Aabb;

use crate::fbm::FractalNoise;
use crate::raster::{DetailMap, HeightRaster, MaskRaster, TreeRaster};
use crate::section::{Section, SectionCoord};

/// Anything the mesh builder can sample heights from.
pub trait HeightSource: Send + Sync {
    /// Terrain height at world `(x, y)`.
    fn height(&self, x: f64, y: f64) -> f64;
}

impl<F> HeightSource for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn height(&self, x: f64, y: f64) -> f64 {
        self(x, y)
    }
}

/// Four material blend weights, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendMask {
    pub base: f32,
    pub rock: f32,
    pub sand: f32,
    pub vegetation: f32,
}

impl BlendMask {
    pub const fn from_array([base, rock, sand, vegetation]: [f32; 4]) -> Self {
        Self {
            base,
            rock,
            sand,
            vegetation,
        }
    }

    pub const fn to_array(self) -> [f32; 4] {
        [self.base, self.rock, self.sand, self.vegetation]
    }

    /// Weighted sum of the channels.
    pub fn dot(self, weights: [f32; 4]) -> f32 {
        self.to_array()
            .iter()
            .zip(weights)
            .map(|(c, w)| c * w)
            .sum()
    }
}

/// Sparse map of terrain sections evaluated into height, blend mask and
/// tree allowance.
///
/// All queries are pure and may run on any thread. Publishing a raster
/// replaces the section's `Arc`, so a reader that already fetched a section
/// keeps a consistent view of it.
pub struct TerrainField {
    config: FieldConfig,
    noise: FractalNoise,
    detail: Option<DetailMap>,
    sections: DashMap<SectionCoord, Arc<Section>>,
}

impl TerrainField {
    pub fn new(config: FieldConfig) -> Self {
        Self {
            noise: FractalNoise::new(&config),
            config,
            detail: None,
            sections: DashMap::new(),
        }
    }

    /// Attach the tiling detail heightmap.
    pub fn with_detail_map(mut self, detail: DetailMap) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Current snapshot of a section, if any raster was published for it.
    pub fn section(&self, coord: SectionCoord) -> Option<Arc<Section>> {
        self.sections.get(&coord).map(|s| Arc::clone(s.value()))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn publish_height(&self, coord: SectionCoord, raster: HeightRaster) {
        self.publish_with(coord, |s| s.height = Some(Arc::new(raster)));
    }

    pub fn publish_mask(&self, coord: SectionCoord, raster: MaskRaster) {
        self.publish_with(coord, |s| s.mask = Some(Arc::new(raster)));
    }

    pub fn publish_trees(&self, coord: SectionCoord, raster: TreeRaster) {
        self.publish_with(coord, |s| s.trees = Some(Arc::new(raster)));
    }

    /// Drop every raster of a section; queries fall back to defaults.
    pub fn remove_section(&self, coord: SectionCoord) -> bool {
        let removed = self.sections.remove(&coord).is_some();
        if removed {
            debug!(x = coord.x, y = coord.y, "terrain section removed");
        }
        removed
    }

    fn publish_with(&self, coord: SectionCoord, edit: impl FnOnce(&mut Section)) {
        let mut entry = self.sections.entry(coord).or_default();
        let mut next = Section::clone(entry.value());
        edit(&mut next);
        *entry = Arc::new(next);
        debug!(x = coord.x, y = coord.y, "terrain section published");
    }

    /// World footprint of a section, unbounded vertically.
    ///
    /// Pass it to the engine's region invalidation after a publish.
    pub fn section_bounds(&self, coord: SectionCoord) -> Aabb {
        let size = self.config.section_size;
        Aabb::new(
            DVec3::new(coord.x as f64 * size, coord.y as f64 * size, f64::MIN),
            DVec3::new((coord.x + 1) as f64 * size, (coord.y + 1) as f64 * size, f64::MAX),
        )
    }

    pub fn height(&self, x: f64, y: f64) -> f64 {
        let (coord, u, v) = SectionCoord::locate(x, y, self.config.section_size);
        let section = self.section(coord);
        let section = section.as_deref();

        let base = match section.and_then(|s| s.height.as_deref()) {
            Some(raster) => {
                raster.sample(u, v) as f64 * self.config.height_scale + self.config.height_offset
            }
            None => self.config.default_height,
        };

        let mask = self.mask_in(section, u, v);
        let mut height = base + self.noise.sample(x, y) * mask.vegetation as f64;

        if let Some(detail) = &self.detail {
            let tile = self.config.detail_tile_size;
            let weight = mask.dot(self.config.detail_weights) as f64;
            height += detail.sample(x / tile, y / tile) as f64 * weight;
        }
        height
    }

    pub fn blend_mask(&self, x: f64, y: f64) -> BlendMask {
        let (coord, u, v) = SectionCoord::locate(x, y, self.config.section_size);
        self.mask_in(self.section(coord).as_deref(), u, v)
    }

    /// How strongly trees may grow at `(x, y)`, in `[0, 1]`.
    pub fn tree_allowed(&self, x: f64, y: f64) -> f64 {
        let (coord, u, v) = SectionCoord::locate(x, y, self.config.section_size);
        let allowed = match self.section(coord).as_deref().and_then(|s| s.trees.as_deref()) {
            Some(raster) => 1.0 - raster.sample(u, v) as f64,
            None => self.config.default_tree_allowed,
        };
        allowed.clamp(0.0, 1.0)
    }

    fn mask_in(&self, section: Option<&Section>, u: f64, v: f64) -> BlendMask {
        match section.and_then(|s| s.mask.as_deref()) {
            Some(raster) => BlendMask::from_array(raster.sample(u, v)),
            None => BlendMask::from_array(self.config.default_mask),
        }
    }
}

impl HeightSource for TerrainField {
    fn height(&self, x: f64, y: f64) -> f64 {
        TerrainField::height(self, x, y)
    }
}
