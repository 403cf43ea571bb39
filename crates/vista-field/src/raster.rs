//! Immutable rasters backing the field sections.

/// Raster construction errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RasterError {
    /// Width or height is zero.
    #[error("raster dimensions must be non-zero, got {width}x{height}")]
    Empty { width: u32, height: u32 },

    /// Texel count does not match `width * height`.
    #[error("raster {width}x{height} needs {expected} texels, got {actual}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Row-major 2D grid of texels.
///
/// Sections sample it edge-inclusively: `u = 0` hits the first column and
/// `u = 1` the last, so adjacent sections that share border texels join
/// without a seam.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster<T> {
    width: u32,
    height: u32,
    texels: Vec<T>,
}

/// Height samples in raw units (scaled by `FieldConfig::height_scale`).
pub type HeightRaster = Raster<f32>;
/// Blend mask (base, rock, sand, vegetation), 0..=255 per channel.
pub type MaskRaster = Raster<[u8; 4]>;
/// Tree exclusion, 0 = trees allowed, 255 = excluded.
pub type TreeRaster = Raster<u8>;

impl<T: Copy> Raster<T> {
    pub fn new(width: u32, height: u32, texels: Vec<T>) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if texels.len() != expected {
            return Err(RasterError::SizeMismatch {
                width,
                height,
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Raster with every texel set to `value`.
    pub fn filled(width: u32, height: u32, value: T) -> Result<Self, RasterError> {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    /// Build a raster by evaluating `f(column, row)` for every texel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> T,
    ) -> Result<Self, RasterError> {
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                texels.push(f(col, row));
            }
        }
        Self::new(width, height, texels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texel(&self, col: u32, row: u32) -> T {
        self.texels[row as usize * self.width as usize + col as usize]
    }

    /// Bilinear sample at normalized `(u, v)`, clamped to the raster.
    fn bilinear<const N: usize>(&self, u: f64, v: f64, decode: impl Fn(T) -> [f32; N]) -> [f32; N] {
        let fx = u.clamp(0.0, 1.0) * (self.width - 1) as f64;
        let fy = v.clamp(0.0, 1.0) * (self.height - 1) as f64;
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;
        self.blend(decode, [x0, x1, y0, y1], tx, ty)
    }

    /// Bilinear sample that wraps around both axes (tiling textures).
    fn bilinear_wrapped<const N: usize>(
        &self,
        u: f64,
        v: f64,
        decode: impl Fn(T) -> [f32; N],
    ) -> [f32; N] {
        let fx = u.rem_euclid(1.0) * self.width as f64;
        let fy = v.rem_euclid(1.0) * self.height as f64;
        let x0 = (fx.floor() as u32).min(self.width - 1);
        let y0 = (fy.floor() as u32).min(self.height - 1);
        let x1 = (x0 + 1) % self.width;
        let y1 = (y0 + 1) % self.height;
        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;
        self.blend(decode, [x0, x1, y0, y1], tx, ty)
    }

    fn blend<const N: usize>(
        &self,
        decode: impl Fn(T) -> [f32; N],
        [x0, x1, y0, y1]: [u32; 4],
        tx: f32,
        ty: f32,
    ) -> [f32; N] {
        let a = decode(self.texel(x0, y0));
        let b = decode(self.texel(x1, y0));
        let c = decode(self.texel(x0, y1));
        let d = decode(self.texel(x1, y1));
        std::array::from_fn(|i| {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            top + (bottom - top) * ty
        })
    }
}

impl Raster<f32> {
    pub fn sample(&self, u: f64, v: f64) -> f32 {
        self.bilinear(u, v, |h| [h])[0]
    }
}

impl Raster<[u8; 4]> {
    /// Channels normalized to `[0, 1]`.
    pub fn sample(&self, u: f64, v: f64) -> [f32; 4] {
        self.bilinear(u, v, |t| t.map(|c| c as f32 / 255.0))
    }
}

impl Raster<u8> {
    /// Value normalized to `[0, 1]`.
    pub fn sample(&self, u: f64, v: f64) -> f32 {
        self.bilinear(u, v, |t| [t as f32 / 255.0])[0]
    }
}

/// Tiling detail heightmap, blended in proportionally to the mask channels.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailMap {
    raster: Raster<f32>,
}

impl DetailMap {
    pub fn new(raster: Raster<f32>) -> Self {
        Self { raster }
    }

    /// Sample at tile-space coordinates; the pattern repeats every 1.0.
    pub fn sample(&self, u: f64, v: f64) -> f32 {
        self.raster.bilinear_wrapped(u, v, |h| [h])[0]
    }
}
