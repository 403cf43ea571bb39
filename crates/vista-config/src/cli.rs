//! Command-line argument parsing for Vista tools.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Vista command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "vista", about = "Vista terrain streaming engine")]
pub struct CliArgs {
    /// Deepest quadtree level.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Build worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Collision shapes are built within this distance of the viewpoint.
    #[arg(long)]
    pub physics_radius: Option<f64>,

    /// Number of simulated frames.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(depth) = args.max_depth {
            self.lod.max_depth = depth;
        }
        if let Some(workers) = args.workers {
            self.build.worker_threads = workers;
        }
        if let Some(radius) = args.physics_radius {
            self.lod.physics_radius = radius;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> CliArgs {
        CliArgs {
            max_depth: None,
            workers: None,
            physics_radius: None,
            frames: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            max_depth: Some(5),
            workers: Some(2),
            ..no_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.lod.max_depth, 5);
        assert_eq!(config.build.worker_threads, 2);
        // Non-overridden fields retain defaults
        assert_eq!(config.lod.physics_radius, 256.0);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&no_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "vista",
            "--physics-radius",
            "128",
            "--log-level",
            "debug",
            "--frames",
            "10",
        ]);
        assert_eq!(args.physics_radius, Some(128.0));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.frames, Some(10));
        assert!(args.config.is_none());
    }
}
