//! Distance-based depth selection for quadtree nodes.

use glam::DVec3;
use vista_config::LodConfig;
use vista_math::Aabb;

/// Picks the quadtree depth a region of terrain should be rendered at.
///
/// The target depth halves the chunk width every time the viewpoint gets
/// twice as close:
///
/// `depth = floor(log2(world_width / (resolution_constant * d * target_screen_quad_width)))`
///
/// where `d` is the distance from the viewpoint to the node's box, floored at
/// `min_distance`, and the result is clamped to `[min_depth, max_depth]`.
#[derive(Clone, Debug)]
pub struct DepthSelector {
    world_width: f64,
    resolution_constant: f64,
    target_screen_quad_width: f64,
    min_distance: f64,
    min_depth: u32,
    max_depth: u32,
    physics_radius: f64,
}

impl DepthSelector {
    pub fn new(config: &LodConfig) -> Self {
        Self {
            world_width: config.world_width,
            resolution_constant: config.resolution_constant,
            target_screen_quad_width: config.target_screen_quad_width,
            min_distance: config.min_distance,
            min_depth: config.min_depth,
            max_depth: config.max_depth,
            physics_radius: config.physics_radius,
        }
    }

    /// Depth the node covering `bounds` wants for a viewer at `viewpoint`.
    pub fn desired_depth(&self, bounds: &Aabb, viewpoint: DVec3) -> u32 {
        let distance = bounds.distance_to_point(viewpoint).max(self.min_distance);
        self.depth_for_distance(distance)
    }

    pub fn depth_for_distance(&self, distance: f64) -> u32 {
        let quad_width = self.resolution_constant * distance * self.target_screen_quad_width;
        let depth = (self.world_width / quad_width).log2().floor();
        if depth.is_nan() {
            return self.min_depth;
        }
        depth.clamp(self.min_depth as f64, self.max_depth as f64) as u32
    }

    /// True if a chunk with `bounds` should carry a collision shape.
    pub fn within_physics_radius(&self, bounds: &Aabb, viewpoint: DVec3) -> bool {
        bounds.distance_to_point(viewpoint) <= self.physics_radius
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}
