//! Procedural stand-in for streamed terrain data.

use vista_config::Config;
use vista_field::{
    DetailMap, HeightRaster, MaskRaster, Raster, RasterError, SectionCoord, TerrainField,
    TreeRaster,
};
use vista_lod::CoverageView;
use vista_math::Aabb;

/// Texels per section side. Border texels are shared with the neighbour.
const SECTION_TEXELS: u32 = 65;

fn base_height(x: f64, y: f64) -> f64 {
    let broad = (x * 0.0004).sin() * (y * 0.0003).cos() * 220.0;
    let hills = (x * 0.003 + 1.7).sin() * (y * 0.0025 - 0.4).sin() * 40.0;
    broad + hills
}

/// Sand in the valleys, rock on the peaks, vegetation in between.
fn mask_for(height: f64) -> [u8; 4] {
    if height < -120.0 {
        [40, 0, 215, 0]
    } else if height > 150.0 {
        [30, 225, 0, 0]
    } else {
        [60, 20, 0, 175]
    }
}

fn section_rasters(
    coord: SectionCoord,
    size: f64,
) -> Result<(HeightRaster, MaskRaster, TreeRaster), RasterError> {
    let step = size / (SECTION_TEXELS - 1) as f64;
    let world = |col: u32, row: u32| {
        (
            (coord.x as f64) * size + col as f64 * step,
            (coord.y as f64) * size + row as f64 * step,
        )
    };
    let height = Raster::from_fn(SECTION_TEXELS, SECTION_TEXELS, |col, row| {
        let (x, y) = world(col, row);
        base_height(x, y) as f32
    })?;
    let mask = Raster::from_fn(SECTION_TEXELS, SECTION_TEXELS, |col, row| {
        let (x, y) = world(col, row);
        mask_for(base_height(x, y))
    })?;
    let trees = Raster::from_fn(SECTION_TEXELS, SECTION_TEXELS, |col, row| {
        let (x, y) = world(col, row);
        if mask_for(base_height(x, y))[1] > 128 { 255 } else { 0 }
    })?;
    Ok((height, mask, trees))
}

/// Field covering the configured world with synthesized sections.
pub fn generate(config: &Config) -> Result<TerrainField, RasterError> {
    let detail = Raster::from_fn(32, 32, |col, row| {
        let u = col as f64 / 32.0 * std::f64::consts::TAU;
        let v = row as f64 / 32.0 * std::f64::consts::TAU;
        (u.sin() * v.cos()) as f32
    })?;
    let field = TerrainField::new(config.field.clone()).with_detail_map(DetailMap::new(detail));

    let size = config.field.section_size;
    let half = (config.lod.world_width / size / 2.0).ceil() as i32;
    for sy in -half..half {
        for sx in -half..half {
            let coord = SectionCoord::new(sx, sy);
            let (height, mask, trees) = section_rasters(coord, size)?;
            field.publish_height(coord, height);
            field.publish_mask(coord, mask);
            field.publish_trees(coord, trees);
        }
    }
    Ok(field)
}

/// Sink a crater into one section and return the region to rebuild.
pub fn dig_crater(field: &TerrainField, coord: SectionCoord) -> Result<Aabb, RasterError> {
    let size = field.config().section_size;
    let (base, _, _) = section_rasters(coord, size)?;
    let centre = (SECTION_TEXELS - 1) as f64 / 2.0;
    let height = Raster::from_fn(SECTION_TEXELS, SECTION_TEXELS, |col, row| {
        let d = ((col as f64 - centre).powi(2) + (row as f64 - centre).powi(2)).sqrt() / centre;
        let dip = if d < 1.0 { (1.0 - d * d) * 80.0 } else { 0.0 };
        base.texel(col, row) - dip as f32
    })?;
    field.publish_height(coord, height);
    Ok(field.section_bounds(coord))
}

/// Count tree sites on a coarse grid around `center` that are both allowed
/// and on terrain at its final detail.
pub fn place_trees(
    field: &TerrainField,
    coverage: &CoverageView,
    center: (f64, f64),
    radius: f64,
) -> usize {
    let snapshot = coverage.snapshot();
    let spacing = radius / 16.0;
    let mut placed = 0;
    for j in -16..=16 {
        for i in -16..=16 {
            let x = center.0 + i as f64 * spacing;
            let y = center.1 + j as f64 * spacing;
            if snapshot.is_fully_built(x, y) && field.tree_allowed(x, y) > 0.5 {
                placed += 1;
            }
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_sections_cover_world() {
        let mut config = Config::default();
        config.lod.world_width = 2048.0;
        config.field.section_size = 1024.0;
        let field = generate(&config).unwrap();
        assert_eq!(field.section_count(), 4);

        let h = field.height(100.0, -300.0);
        assert!(h.is_finite());
        assert!((h - base_height(100.0, -300.0)).abs() < 30.0);
    }

    #[test]
    fn test_crater_lowers_section_centre() {
        let mut config = Config::default();
        config.lod.world_width = 2048.0;
        let field = generate(&config).unwrap();
        let size = config.field.section_size;
        let before = field.height(size / 2.0, size / 2.0);

        let region = dig_crater(&field, SectionCoord::new(0, 0)).unwrap();
        assert!(region.contains_xy(size / 2.0, size / 2.0));
        assert!(field.height(size / 2.0, size / 2.0) < before - 50.0);
    }

    #[test]
    fn test_rocky_texels_exclude_trees() {
        assert_eq!(mask_for(200.0)[1], 225);
        assert_eq!(mask_for(0.0)[3], 175);
    }
}
