use std::sync::Arc;

use crate::raster::{HeightRaster, MaskRaster, TreeRaster};

/// Integer coordinate of a data section: `floor(world / section_size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionCoord {
    pub x: i32,
    pub y: i32,
}

impl SectionCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Section containing the world point, plus the normalized position
    /// inside it.
    pub fn locate(x: f64, y: f64, section_size: f64) -> (Self, f64, f64) {
        let sx = x / section_size;
        let sy = y / section_size;
        let cx = sx.floor();
        let cy = sy.floor();
        (Self::new(cx as i32, cy as i32), sx - cx, sy - cy)
    }
}

/// Rasters loaded for one section. Any of them may be missing.
///
/// Sections are immutable once published; the field swaps in a new
/// `Arc<Section>` instead of editing one that readers may hold.
#[derive(Clone, Debug, Default)]
pub struct Section {
    pub height: Option<Arc<HeightRaster>>,
    pub mask: Option<Arc<MaskRaster>>,
    pub trees: Option<Arc<TreeRaster>>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.height.is_none() && self.mask.is_none() && self.trees.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_positive() {
        let (coord, u, v) = SectionCoord::locate(1536.0, 256.0, 1024.0);
        assert_eq!(coord, SectionCoord::new(1, 0));
        assert!((u - 0.5).abs() < 1e-12);
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_locate_negative_floors() {
        let (coord, u, v) = SectionCoord::locate(-256.0, -1024.0, 1024.0);
        assert_eq!(coord, SectionCoord::new(-1, -1));
        assert!((u - 0.75).abs() < 1e-12);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_empty_section() {
        assert!(Section::default().is_empty());
    }
}
