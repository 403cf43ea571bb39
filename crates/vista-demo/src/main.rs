//! Headless fly-through over procedurally generated terrain.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p vista-demo` for the default flight.
//! Run with `cargo run -p vista-demo -- --frames 300 --max-depth 6` to override it.

mod world;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::DVec3;
use tracing::{debug, error, info, warn};
use vista_config::{CliArgs, Config};
use vista_field::SectionCoord;
use vista_lod::{
    HeadlessPhysicsBackend, HeadlessRenderBackend, TerrainEngine, WorkerPool, worker_count,
};

/// Frames between progress lines.
const REPORT_EVERY: u32 = 60;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let Some(config_dir) = args
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("vista")))
    else {
        eprintln!("Failed to resolve config directory");
        return ExitCode::FAILURE;
    };

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    if let Err(e) = vista_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config))
    {
        eprintln!("Failed to initialize logging: {e}");
    }

    let started = Instant::now();
    let field = match world::generate(&config) {
        Ok(field) => Arc::new(field),
        Err(e) => {
            error!("Failed to synthesize terrain: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        sections = field.section_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Terrain field ready"
    );

    let frames = config.demo.frames;
    let delay = Duration::from_millis(config.demo.frame_delay_ms);
    let velocity = DVec3::from_array(config.demo.velocity);
    let mut viewpoint = DVec3::from_array(config.demo.start);
    let pool = WorkerPool::new(worker_count(config.build.worker_threads));

    let mut engine = match TerrainEngine::init(
        config,
        field.clone(),
        HeadlessRenderBackend::new(),
        Some(HeadlessPhysicsBackend::new()),
        pool,
        viewpoint,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start terrain engine: {e}");
            return ExitCode::FAILURE;
        }
    };
    let coverage = engine.coverage();

    for frame in 1..=frames {
        viewpoint += velocity;
        engine.update_viewpoint(viewpoint);

        if frame == frames / 2 {
            let coord = SectionCoord::new(0, 0);
            match world::dig_crater(&field, coord) {
                Ok(region) => {
                    info!("Digging a crater in section ({}, {})", coord.x, coord.y);
                    engine.invalidate_region(region);
                }
                Err(e) => warn!("Crater edit failed: {e}"),
            }
        }

        debug!(
            frame,
            in_flight = engine.in_flight(),
            scene = engine.render().scene_len(),
            "tick"
        );
        if frame % REPORT_EVERY == 0 || frame == frames {
            let stats = engine.stats();
            let snapshot = coverage.snapshot();
            info!(
                frame,
                x = viewpoint.x,
                y = viewpoint.y,
                leaves = snapshot.cells.len(),
                built_pct = (snapshot.fully_built_fraction() * 100.0).round(),
                splits = stats.splits,
                merges = stats.merges,
                in_flight = engine.in_flight(),
                "Flight progress"
            );
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    // Let outstanding work land so placement sees final terrain.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !engine.is_settled() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        engine.update_viewpoint(viewpoint);
    }
    let trees = world::place_trees(&field, &coverage, (viewpoint.x, viewpoint.y), 512.0);
    info!(trees, settled = engine.is_settled(), "Tree sites around the viewpoint");

    let stats = engine.stats();
    let violations =
        engine.render().violations().len() + engine.physics().map_or(0, |p| p.violations().len());
    info!(
        builds = stats.builds_submitted,
        committed = stats.committed,
        discarded = stats.discarded,
        failed = stats.failed,
        subtree_commits = stats.subtree_commits,
        scene = engine.render().scene_len(),
        colliders = engine.physics().map_or(0, |p| p.len()),
        violations,
        "Flight finished"
    );

    if let Err(e) = engine.shutdown() {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    if violations > 0 {
        error!("{violations} backend protocol violations recorded");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
