/// Regular grid of heights for the physics backend.
///
/// Covers `[0, width]²` in chunk-local XY with `resolution` samples per side
/// and no skirt. Heights are world heights; the physics transform only
/// carries the chunk's XY origin.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionHeightfield {
    resolution: u32,
    width: f64,
    heights: Vec<f32>,
    min_height: f32,
    max_height: f32,
}

impl CollisionHeightfield {
    pub(crate) fn new(resolution: u32, width: f64, heights: Vec<f32>) -> Self {
        debug_assert_eq!(heights.len(), (resolution * resolution) as usize);
        let (min_height, max_height) = heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });
        Self {
            resolution,
            width,
            heights,
            min_height,
            max_height,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// Distance between neighbouring samples.
    pub fn spacing(&self) -> f64 {
        self.width / (self.resolution - 1) as f64
    }

    /// Row-major samples, row 0 at local `y = 0`.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn height_at(&self, col: u32, row: u32) -> f32 {
        self.heights[(row * self.resolution + col) as usize]
    }

    pub fn height_range(&self) -> (f32, f32) {
        (self.min_height, self.max_height)
    }
}
