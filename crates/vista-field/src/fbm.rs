//! Multi-octave fractal Brownian motion (fBm) over simplex noise.
//!
//! Layered on top of raster heights to break up the regular look of
//! bilinearly interpolated terrain.

use noise::{NoiseFn, Simplex};
use vista_config::FieldConfig;

/// Fractal noise sampler.
///
/// Each successive octave multiplies frequency by `lacunarity` and amplitude
/// by `persistence`.
pub struct FractalNoise {
    noise: Simplex,
    octaves: u32,
    base_frequency: f64,
    amplitude: f64,
    lacunarity: f64,
    persistence: f64,
}

impl FractalNoise {
    pub fn new(config: &FieldConfig) -> Self {
        Self {
            noise: Simplex::new(config.noise_seed),
            octaves: config.noise_octaves,
            base_frequency: config.noise_base_frequency,
            amplitude: config.noise_amplitude,
            lacunarity: config.noise_lacunarity,
            persistence: config.noise_persistence,
        }
    }

    /// Sample at a world-space XY coordinate.
    ///
    /// The result lies in `[-max_amplitude, +max_amplitude]`.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.base_frequency;
        let mut amplitude = self.amplitude;

        for _ in 0..self.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            frequency *= self.lacunarity;
            amplitude *= self.persistence;
        }

        total
    }

    /// Geometric sum of all octave amplitudes.
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.amplitude;
        for _ in 0..self.octaves {
            sum += amp.abs();
            amp *= self.persistence;
        }
        sum
    }
}
