//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Terrain field sampling.
    pub field: FieldConfig,
    /// Quadtree split/merge thresholds.
    pub lod: LodConfig,
    /// Chunk mesh tessellation.
    pub mesh: MeshConfig,
    /// Worker pool and shutdown behaviour.
    pub build: BuildConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Headless fly-through settings.
    pub demo: DemoConfig,
}

/// Terrain field evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldConfig {
    /// World units covered by one data section along each axis.
    pub section_size: f64,
    /// Multiplier applied to raw height raster samples.
    pub height_scale: f64,
    /// Offset added after scaling.
    pub height_offset: f64,
    /// Height returned where no raster is loaded.
    pub default_height: f64,
    /// Blend mask returned where no raster is loaded (base, rock, sand, vegetation).
    pub default_mask: [f32; 4],
    /// Tree allowance returned where no exclusion raster is loaded.
    pub default_tree_allowed: f64,
    /// Seed for the fBm refinement noise.
    pub noise_seed: u32,
    /// Number of fBm octaves.
    pub noise_octaves: u32,
    /// Frequency of the first octave (cycles per world unit).
    pub noise_base_frequency: f64,
    /// Amplitude of the first octave, scaled by the vegetation mask channel.
    pub noise_amplitude: f64,
    /// Frequency multiplier between octaves.
    pub noise_lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub noise_persistence: f64,
    /// World units covered by one repetition of the detail heightmap.
    pub detail_tile_size: f64,
    /// Per-mask-channel weight of the detail heightmap contribution.
    pub detail_weights: [f32; 4],
}

/// Quadtree LOD selection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Width of the square root node, centered on the origin.
    pub world_width: f64,
    /// Shallowest depth any leaf may have.
    pub min_depth: u32,
    /// Deepest depth any leaf may have.
    pub max_depth: u32,
    /// Resolution constant of the depth formula (vertices per chunk side).
    pub resolution_constant: f64,
    /// Target on-screen quad width per unit of view distance.
    pub target_screen_quad_width: f64,
    /// Distance floor applied before the depth formula.
    pub min_distance: f64,
    /// Lower height bound of the placeholder AABB used before a chunk is built.
    pub placeholder_min_height: f64,
    /// Upper height bound of the placeholder AABB used before a chunk is built.
    pub placeholder_max_height: f64,
    /// Build collision shapes at all.
    pub collision_enabled: bool,
    /// Only chunks within this distance of the viewpoint get collision shapes.
    pub physics_radius: f64,
}

/// Chunk mesh tessellation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    /// Samples per side of the flatness probe.
    pub quick_sample_resolution: u32,
    /// Interior vertices per side for flat chunks.
    pub flat_resolution: u32,
    /// Interior vertices per side for everything else.
    pub full_resolution: u32,
    /// Height samples per side of the collision heightfield.
    pub collision_resolution: u32,
    /// Skirt drop as a fraction of chunk width.
    pub skirt_depth_fraction: f64,
    /// Emit per-vertex geomorph deltas.
    pub geomorph: bool,
}

/// Worker pool and shutdown settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of build worker threads (0 = derive from CPU count).
    pub worker_threads: usize,
    /// Maximum number of polling iterations while draining at shutdown.
    pub shutdown_poll_limit: u32,
    /// Milliseconds to wait on the completion queue per polling iteration.
    pub shutdown_poll_interval_ms: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to `vista.log` in the log directory (debug builds).
    pub json_log: bool,
}

/// Headless fly-through settings for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of simulated frames.
    pub frames: u32,
    /// Viewpoint start position.
    pub start: [f64; 3],
    /// Viewpoint displacement per frame.
    pub velocity: [f64; 3],
    /// Sleep between frames in milliseconds.
    pub frame_delay_ms: u64,
}

// --- Default implementations ---

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            section_size: 1024.0,
            height_scale: 1.0,
            height_offset: 0.0,
            default_height: 0.0,
            default_mask: [1.0, 0.0, 0.0, 0.0],
            default_tree_allowed: 1.0,
            noise_seed: 0,
            noise_octaves: 4,
            noise_base_frequency: 0.01,
            noise_amplitude: 2.0,
            noise_lacunarity: 2.0,
            noise_persistence: 0.5,
            detail_tile_size: 64.0,
            detail_weights: [0.25, 1.0, 0.1, 0.0],
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            world_width: 16_384.0,
            min_depth: 0,
            max_depth: 8,
            resolution_constant: 128.0,
            target_screen_quad_width: 0.002,
            min_distance: 1.0,
            placeholder_min_height: -512.0,
            placeholder_max_height: 2048.0,
            collision_enabled: true,
            physics_radius: 256.0,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            quick_sample_resolution: 32,
            flat_resolution: 8,
            full_resolution: 128,
            collision_resolution: 33,
            skirt_depth_fraction: 0.02,
            geomorph: true,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            shutdown_poll_limit: 500,
            shutdown_poll_interval_ms: 10,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_log: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            start: [-6000.0, 0.0, 150.0],
            velocity: [20.0, 0.0, 0.0],
            frame_delay_ms: 0,
        }
    }
}

// --- Validation ---

impl LodConfig {
    /// Reject values the quadtree cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.world_width.is_finite() && self.world_width > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "lod.world_width must be positive, got {}",
                self.world_width
            )));
        }
        if self.min_depth > self.max_depth {
            return Err(ConfigError::Invalid(format!(
                "lod.min_depth ({}) exceeds lod.max_depth ({})",
                self.min_depth, self.max_depth
            )));
        }
        if self.max_depth > 24 {
            return Err(ConfigError::Invalid(format!(
                "lod.max_depth must be at most 24, got {}",
                self.max_depth
            )));
        }
        if self.resolution_constant <= 0.0
            || self.target_screen_quad_width <= 0.0
            || self.min_distance <= 0.0
        {
            return Err(ConfigError::Invalid(
                "lod.resolution_constant, lod.target_screen_quad_width and lod.min_distance must be positive"
                    .to_string(),
            ));
        }
        if self.placeholder_min_height > self.placeholder_max_height {
            return Err(ConfigError::Invalid(
                "lod.placeholder_min_height exceeds lod.placeholder_max_height".to_string(),
            ));
        }
        Ok(())
    }
}

impl MeshConfig {
    /// Every grid needs at least two samples per side.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grids = [
            ("quick_sample_resolution", self.quick_sample_resolution),
            ("flat_resolution", self.flat_resolution),
            ("full_resolution", self.full_resolution),
            ("collision_resolution", self.collision_resolution),
        ];
        for (name, value) in grids {
            if value < 2 {
                return Err(ConfigError::Invalid(format!(
                    "mesh.{name} must be at least 2, got {value}"
                )));
            }
        }
        if !self.skirt_depth_fraction.is_finite() || self.skirt_depth_fraction < 0.0 {
            return Err(ConfigError::Invalid(
                "mesh.skirt_depth_fraction must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl FieldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.section_size.is_finite() && self.section_size > 0.0)
            || !(self.detail_tile_size.is_finite() && self.detail_tile_size > 0.0)
        {
            return Err(ConfigError::Invalid(
                "field.section_size and field.detail_tile_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.field.validate()?;
        self.lod.validate()?;
        self.mesh.validate()
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_depth: 8"));
        assert!(ron_str.contains("full_resolution: 128"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(lod: (max_depth: 5), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.lod.max_depth, 5);
        assert_eq!(config.lod.min_depth, 0);
        assert_eq!(config.mesh, MeshConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_inverted_depth_range_rejected() {
        let mut config = Config::default();
        config.lod.min_depth = 6;
        config.lod.max_depth = 3;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("min_depth"));
    }

    #[test]
    fn test_degenerate_mesh_resolution_rejected() {
        let mut config = Config::default();
        config.mesh.flat_resolution = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.lod.physics_radius = 512.0;
        config.build.worker_threads = 3;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.lod.max_depth = 10;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().lod.max_depth, 10);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
