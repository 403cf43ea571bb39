use glam::{DVec2, DVec3};

/// Axis-aligned bounding box in f64 world space.
///
/// Invariant: `min <= max` on every axis. The constructor enforces this by
/// swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

/// One quarter of a box's XY footprint.
///
/// Ordered \[bottom-left, bottom-right, top-left, top-right\], matching the
/// child order used by the quadtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    BottomLeft = 0,
    BottomRight = 1,
    TopLeft = 2,
    TopRight = 3,
}

impl Quadrant {
    /// All four quadrants in child order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
        Quadrant::TopLeft,
        Quadrant::TopRight,
    ];
}

impl Aabb {
    /// Create an AABB from two corners. Automatically sorts components so
    /// that min <= max on every axis.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Square XY footprint `[x, x + width] x [y, y + width]` spanning
    /// `[z_min, z_max]` vertically.
    pub fn from_square(x: f64, y: f64, width: f64, z_min: f64, z_max: f64) -> Self {
        Self::new(
            DVec3::new(x, y, z_min),
            DVec3::new(x + width, y + width, z_max),
        )
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if the XY projection contains `(x, y)` (boundary inclusive).
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    /// Returns true if this AABB overlaps `other` (touching faces count).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Returns true if the XY footprints overlap (touching edges count).
    pub fn intersects_xy(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Smallest AABB enclosing both boxes.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Euclidean distance from `p` to the closest point of the box.
    /// Zero when `p` is inside.
    pub fn distance_to_point(&self, p: DVec3) -> f64 {
        let clamped = p.clamp(self.min, self.max);
        (p - clamped).length()
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Width of the XY footprint along X.
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// XY corner with the smallest coordinates.
    pub fn origin_xy(&self) -> DVec2 {
        DVec2::new(self.min.x, self.min.y)
    }

    /// Same XY footprint with a replaced vertical range.
    pub fn with_z_range(&self, z_min: f64, z_max: f64) -> Aabb {
        Aabb::new(
            DVec3::new(self.min.x, self.min.y, z_min),
            DVec3::new(self.max.x, self.max.y, z_max),
        )
    }

    /// Translate the box by `offset`.
    pub fn translated(&self, offset: DVec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// XY quadrant of this box, keeping the vertical range.
    pub fn quadrant(&self, q: Quadrant) -> Aabb {
        let mid = self.center();
        let (x0, x1) = match q {
            Quadrant::BottomLeft | Quadrant::TopLeft => (self.min.x, mid.x),
            Quadrant::BottomRight | Quadrant::TopRight => (mid.x, self.max.x),
        };
        let (y0, y1) = match q {
            Quadrant::BottomLeft | Quadrant::BottomRight => (self.min.y, mid.y),
            Quadrant::TopLeft | Quadrant::TopRight => (mid.y, self.max.y),
        };
        Aabb {
            min: DVec3::new(x0, y0, self.min.z),
            max: DVec3::new(x1, y1, self.max.z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Aabb {
        Aabb::new(DVec3::ZERO, DVec3::splat(10.0))
    }

    #[test]
    fn test_constructor_sorts_corners() {
        let aabb = Aabb::new(DVec3::new(10.0, 0.0, 5.0), DVec3::new(0.0, 10.0, -5.0));
        assert_eq!(aabb.min, DVec3::new(0.0, 0.0, -5.0));
        assert_eq!(aabb.max, DVec3::new(10.0, 10.0, 5.0));
    }

    #[test]
    fn test_contains_point_on_edge() {
        let aabb = unit();
        assert!(aabb.contains_point(DVec3::ZERO));
        assert!(aabb.contains_point(DVec3::splat(10.0)));
        assert!(!aabb.contains_point(DVec3::new(10.5, 5.0, 5.0)));
    }

    #[test]
    fn test_intersects_is_symmetric_and_counts_touching() {
        let a = unit();
        let b = Aabb::new(DVec3::splat(10.0), DVec3::splat(20.0));
        let c = Aabb::new(DVec3::splat(11.0), DVec3::splat(20.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_intersects_xy_ignores_height() {
        let a = Aabb::from_square(0.0, 0.0, 10.0, 0.0, 1.0);
        let b = Aabb::from_square(5.0, 5.0, 10.0, 100.0, 200.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects_xy(&b));
    }

    #[test]
    fn test_distance_to_point_zero_inside() {
        let aabb = unit();
        assert_eq!(aabb.distance_to_point(DVec3::splat(5.0)), 0.0);
        let d = aabb.distance_to_point(DVec3::new(13.0, 14.0, 5.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_quadrants_tile_parent() {
        let parent = Aabb::from_square(-8.0, -8.0, 16.0, 0.0, 4.0);
        let quads: Vec<Aabb> = Quadrant::ALL.iter().map(|&q| parent.quadrant(q)).collect();
        let area: f64 = quads.iter().map(|q| q.size().x * q.size().y).sum();
        assert!((area - 256.0).abs() < 1e-12);
        let merged = quads.iter().fold(quads[0], |acc, q| acc.union(q));
        assert_eq!(merged, parent);
        assert_eq!(quads[0].min.x, -8.0);
        assert_eq!(quads[3].max.y, 8.0);
    }

    #[test]
    fn test_translated_and_z_range() {
        let aabb = Aabb::from_square(0.0, 0.0, 2.0, -1.0, 1.0)
            .translated(DVec3::new(3.0, 4.0, 0.0))
            .with_z_range(5.0, 6.0);
        assert_eq!(aabb.min, DVec3::new(3.0, 4.0, 5.0));
        assert_eq!(aabb.max, DVec3::new(5.0, 6.0, 6.0));
        assert_eq!(aabb.width(), 2.0);
    }
}
