//! Headless driver for the surface tile system.
//!
//! Loads `config.ron` (CLI flags override it), flies a scripted approach over
//! a body backed by procedurally generated archives, and logs per-level tile
//! statistics. Run with `cargo run -p terra-app -- --body Mars --frames 300`.

mod flight;
mod settings;
mod synthetic;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use glam::Vec3;
use terra_config::{CliArgs, Config, ConfigError, default_config_dir};
use terra_tiles::{
    MeshProvider, PatchTemplates, TextureArchive, TileCache, TileError, TileManager,
};
use tracing::{error, info};

use crate::flight::{CountingRenderer, FlightPath, FrameTotals};
use crate::synthetic::{SyntheticArchive, SyntheticCapabilities};

/// Levels of the synthetic tile table below level 8.
const SYNTHETIC_TILE_DEPTH: u8 = 4;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tiles(#[from] TileError),
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    if let Err(e) = terra_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config)) {
        eprintln!("Failed to initialise logging: {e}");
    }

    match run(&config, &config_dir) {
        Ok(totals) => {
            info!(
                textured_draws = totals.textured_draws,
                masked_draws = totals.masked_draws,
                vertices = totals.vertices,
                "flight complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "terra failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, config_dir: &Path) -> Result<FrameTotals, AppError> {
    config.validate()?;
    info!(body = %config.surface.body, config_dir = %config_dir.display(), "starting flight");

    let archive: Arc<dyn TextureArchive> =
        Arc::new(SyntheticArchive::new(&config.surface.body, SYNTHETIC_TILE_DEPTH));
    let cache = TileCache::new(archive, &settings::cache_settings(config))?;
    let surface = settings::surface_settings(config);
    let meshes: Arc<dyn MeshProvider> = Arc::new(PatchTemplates::new(surface.max_level));
    let mut manager = TileManager::new(
        &config.surface.body,
        cache.clone(),
        &SyntheticCapabilities,
        meshes,
        surface,
    )?;
    manager.set_ambient(Vec3::splat(0.05));

    let path = FlightPath::from_config(config);
    let mut renderer = CountingRenderer::default();
    let mut totals = FrameTotals::default();
    for frame in 0..path.frames() {
        let view = path.view(frame);
        renderer.aim(view.body_position.as_vec3(), path.half_fov() as f32);
        let stats = manager.render(&view, &mut renderer);
        totals.add(&stats);
        if frame % 60 == 0 {
            info!(
                frame,
                altitude = path.altitude(frame),
                requested = view.requested_level,
                deepest = ?stats.max_level(),
                tiles = stats.total_tiles(),
                requests = stats.load_requests,
                queued = cache.queue_len(),
                "frame"
            );
        }
    }

    for (level, &count) in totals.tiles.iter().enumerate().filter(|(_, c)| **c > 0) {
        info!(level, tiles = count, "tiles drawn");
    }
    totals.textured_draws = renderer.totals.textured_draws;
    totals.masked_draws = renderer.totals.masked_draws;

    drop(manager);
    cache.shut_down();
    Ok(totals)
}
