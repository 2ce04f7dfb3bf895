//! Conversion from the persisted configuration to tile settings.

use std::time::Duration;

use terra_config::Config;
use terra_tiles::{CacheSettings, LodTuning, MAX_PATCH_LEVEL, SurfaceSettings};

pub fn surface_settings(config: &Config) -> SurfaceSettings {
    SurfaceSettings {
        max_level: config.surface.max_level,
        specular: config.surface.specular,
        lights: config.surface.lights,
        preload: config.surface.preload,
        lod: lod_tuning(config),
    }
}

pub fn lod_tuning(config: &Config) -> LodTuning {
    let lod = &config.lod;
    LodTuning {
        max_patch_level: MAX_PATCH_LEVEL,
        motion_step_base: lod.motion_step_base,
        motion_floor_level: lod.motion_floor_level,
        tilt_stepdown_slope: lod.tilt_stepdown_slope,
        tilt_coarse_slope: lod.tilt_coarse_slope,
        tilt_bias: lod.tilt_bias,
        tilt_reference_dist: lod.tilt_reference_dist,
        oblique_min_level: lod.oblique_min_level,
    }
}

pub fn cache_settings(config: &Config) -> CacheSettings {
    CacheSettings {
        queue_capacity: config.cache.queue_capacity,
        poll_interval: Duration::from_millis(config.cache.poll_interval_ms),
        max_nodes: config.cache.max_nodes,
    }
}
