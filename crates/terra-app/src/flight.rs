//! Scripted approach over a body and a renderer that only counts.

use glam::{DMat3, DVec3, Vec3};
use terra_config::Config;
use terra_tiles::{
    DrawCall, FrameStats, MAX_PATCH_LEVEL, Renderer, ViewParams, apparent_radius_px,
    detail_level,
};

/// Camera path: descends from the start to the end altitude on a log scale
/// while orbiting eastwards at a fixed latitude.
#[derive(Clone, Debug)]
pub struct FlightPath {
    frames: u32,
    start_altitude: f64,
    end_altitude: f64,
    orbit_step: f64,
    latitude: f64,
    viewport_height: f64,
    half_fov: f64,
    max_level: u8,
    resolution_bias: f64,
}

impl FlightPath {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frames: config.view.frames,
            start_altitude: config.view.start_altitude,
            end_altitude: config.view.end_altitude,
            orbit_step: config.view.orbit_step_deg.to_radians(),
            latitude: 0.4,
            viewport_height: f64::from(config.view.viewport_height),
            half_fov: config.view.field_of_view_deg.to_radians() * 0.5,
            max_level: config.surface.max_level,
            resolution_bias: config.surface.resolution_bias,
        }
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn half_fov(&self) -> f64 {
        self.half_fov
    }

    /// Altitude above the surface in body radii at `frame`.
    pub fn altitude(&self, frame: u32) -> f64 {
        let t = if self.frames > 1 {
            f64::from(frame.min(self.frames - 1)) / f64::from(self.frames - 1)
        } else {
            0.0
        };
        // Interpolate in log space; the floor keeps a zero end altitude finite.
        let start = self.start_altitude.max(1e-6).ln();
        let end = self.end_altitude.max(1e-6).ln();
        (start + (end - start) * t).exp()
    }

    /// View of a unit-radius body for `frame`.
    pub fn view(&self, frame: u32) -> ViewParams {
        let lng = self.orbit_step * f64::from(frame);
        let (slat, clat) = self.latitude.sin_cos();
        let (slng, clng) = lng.sin_cos();
        let altitude = self.altitude(frame);
        let camera = DVec3::new(clat * clng, slat, clat * slng) * (1.0 + altitude);

        // Detail follows the distance to the ground below the camera.
        let radius_px = apparent_radius_px(1.0, altitude, self.viewport_height, self.half_fov);
        let max_level = self.max_level.min(MAX_PATCH_LEVEL);
        ViewParams {
            body_rotation: DMat3::IDENTITY,
            body_position: -camera,
            body_radius: 1.0,
            requested_level: detail_level(radius_px, self.resolution_bias, max_level),
            view_aperture: None,
            sun_direction: DVec3::new(1.0, 0.2, 0.0),
            fogged: false,
        }
    }
}

/// Renderer that culls against a view cone and accumulates statistics.
#[derive(Debug, Default)]
pub struct CountingRenderer {
    view_dir: Vec3,
    half_cone: f32,
    pub totals: FrameTotals,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameTotals {
    pub tiles: [u64; MAX_PATCH_LEVEL as usize + 1],
    pub vertices: u64,
    pub textured_draws: u64,
    pub masked_draws: u64,
}

impl FrameTotals {
    pub fn add(&mut self, stats: &FrameStats) {
        for (total, &count) in self.tiles.iter_mut().zip(&stats.tiles) {
            *total += u64::from(count);
        }
        self.vertices += stats.vertices;
    }
}

impl CountingRenderer {
    /// Point the view cone along `view_dir` (camera frame).
    pub fn aim(&mut self, view_dir: Vec3, half_fov: f32) {
        self.view_dir = view_dir.normalize_or_zero();
        // The cone spans the viewport diagonal.
        self.half_cone = (half_fov * std::f32::consts::SQRT_2).min(std::f32::consts::PI);
    }
}

impl Renderer for CountingRenderer {
    fn is_visible(&self, center: Vec3, radius: f32) -> bool {
        let distance = center.length();
        if distance <= radius || self.view_dir == Vec3::ZERO {
            return true;
        }
        let angle = (center.dot(self.view_dir) / distance).clamp(-1.0, 1.0).acos();
        angle <= self.half_cone + (radius / distance).asin()
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        if call.surface.is_some() {
            self.totals.textured_draws += 1;
        }
        if call.mask.is_some() {
            self.totals.masked_draws += 1;
        }
    }
}
