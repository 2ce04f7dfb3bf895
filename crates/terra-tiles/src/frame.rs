//! Per-frame view parameters and level-of-detail tuning.

use std::f64::consts::TAU;

use glam::{DMat3, DVec3, Vec3};

use crate::base_table::{Hemisphere, MAX_PATCH_LEVEL};
use crate::geometry::{hemisphere_flip, lat_lng};

/// Tunable constants of the resolution heuristics.
#[derive(Clone, Debug, PartialEq)]
pub struct LodTuning {
    /// Absolute depth limit of the quadtree.
    pub max_patch_level: u8,
    /// Camera step (radians per frame) tolerated at `max_patch_level`,
    /// scaled by `2^-max_patch_level`.
    pub motion_step_base: f64,
    /// Fast camera motion never lowers the target level below this.
    pub motion_floor_level: u8,
    /// Oblique tiles stop subdividing past `rad * (slope * tilt + bias)`.
    pub tilt_stepdown_slope: f64,
    /// Oblique tiles fall back to the parent texture past `rad * (slope * tilt + bias)`.
    pub tilt_coarse_slope: f64,
    /// Offset added to both tilt thresholds, in tile radii.
    pub tilt_bias: f64,
    /// Camera distance (body radii) at which the tilt cosine is evaluated.
    ///
    /// The tilt is judged from this fixed distance rather than the real one,
    /// so moving the camera away from a tile never deepens it.
    pub tilt_reference_dist: f64,
    /// First level at which the oblique test applies.
    pub oblique_min_level: u8,
}

impl Default for LodTuning {
    fn default() -> Self {
        Self {
            max_patch_level: MAX_PATCH_LEVEL,
            motion_step_base: 5.12,
            motion_floor_level: 5,
            tilt_stepdown_slope: 2.0,
            tilt_coarse_slope: 4.2,
            tilt_bias: 0.3,
            tilt_reference_dist: 1.05,
            oblique_min_level: 8,
        }
    }
}

/// Caller-supplied view of the body for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewParams {
    /// Rotation from the body frame into the camera-aligned world frame.
    pub body_rotation: DMat3,
    /// Body centre relative to the camera, in world units.
    pub body_position: DVec3,
    /// Mean body radius, world units.
    pub body_radius: f64,
    /// Level asked for by the caller, see [`detail_level`].
    pub requested_level: u8,
    /// Angular aperture of the visible cap. Derived from the camera distance
    /// when `None`.
    pub view_aperture: Option<f64>,
    /// Direction from the body towards the sun, world frame.
    pub sun_direction: DVec3,
    /// Draw with atmospheric fog.
    pub fogged: bool,
}

/// Immutable snapshot of everything the traversal needs for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameParams {
    /// Body frame to world frame.
    pub body_rotation: DMat3,
    /// Body centre relative to the camera, world units.
    pub body_position: DVec3,
    pub body_radius: f64,
    /// Unit direction from the body centre to the camera, body frame.
    pub camera_dir: DVec3,
    /// Camera distance from the body centre in body radii.
    pub camera_dist: f64,
    /// Angular radius of the visible cap around `camera_dir`.
    pub view_aperture: f64,
    /// Distance from the camera to its horizon, world units.
    pub horizon_dist: f64,
    /// Deepest level tiles are refined to this frame.
    pub target_level: u8,
    /// Unit sun direction, body frame.
    pub sun_dir: DVec3,
    /// Ambient colour passed to every draw.
    pub ambient: Vec3,
    pub fogged: bool,
}

impl FrameParams {
    /// Build the snapshot for a frame.
    ///
    /// `previous_camera_dir` is last frame's camera direction; the angle
    /// between the two limits the target level.
    pub fn new(
        view: &ViewParams,
        max_level: u8,
        tuning: &LodTuning,
        previous_camera_dir: Option<DVec3>,
        ambient: Vec3,
    ) -> Self {
        let to_body = view.body_rotation.transpose();
        let camera_dir = (to_body * -view.body_position).try_normalize().unwrap_or(DVec3::Y);
        let camera_dist = view.body_position.length() / view.body_radius;
        let view_aperture = view
            .view_aperture
            .unwrap_or_else(|| (1.0 / camera_dist.max(1.0)).acos());
        let horizon_dist = (camera_dist * camera_dist - 1.0).max(0.0).sqrt() * view.body_radius;
        let sun_dir = (to_body * view.sun_direction).try_normalize().unwrap_or(DVec3::X);

        let motion_cap = previous_camera_dir.map_or(tuning.max_patch_level, |prev| {
            let step = camera_dir.dot(prev).clamp(-1.0, 1.0).acos();
            motion_level_cap(step, tuning)
        });
        let target_level = view.requested_level.min(max_level).min(motion_cap).max(1);

        Self {
            body_rotation: view.body_rotation,
            body_position: view.body_position,
            body_radius: view.body_radius,
            camera_dir,
            camera_dist,
            view_aperture,
            horizon_dist,
            target_level,
            sun_dir,
            ambient,
            fogged: view.fogged,
        }
    }

    /// Body-to-world rotation for tiles of `hemisphere`.
    pub fn hemisphere_rotation(&self, hemisphere: Hemisphere) -> DMat3 {
        self.body_rotation * hemisphere_flip(hemisphere)
    }

    /// Latitude and longitude of the camera above the body.
    pub fn camera_lat_lng(&self) -> (f64, f64) {
        lat_lng(self.camera_dir)
    }
}

/// Highest level allowed while the camera sweeps `step` radians per frame.
///
/// Starting at the absolute limit, the cap drops by one level for each
/// doubling of the step beyond `motion_step_base * 2^-max_patch_level`.
pub fn motion_level_cap(step: f64, tuning: &LodTuning) -> u8 {
    let mut cap = tuning.max_patch_level;
    let mut limit = tuning.motion_step_base * (-f64::from(tuning.max_patch_level)).exp2();
    while step > limit && cap > tuning.motion_floor_level {
        cap -= 1;
        limit *= 2.0;
    }
    cap
}

/// Apparent radius of a body in pixels.
///
/// `half_aperture` is half the vertical field of view in radians.
pub fn apparent_radius_px(radius: f64, distance: f64, viewport_height: f64, half_aperture: f64) -> f64 {
    if distance <= 0.0 || half_aperture <= 0.0 {
        return f64::INFINITY;
    }
    radius / (distance * half_aperture.tan()) * viewport_height * 0.5
}

/// Requested level for a body of the given apparent pixel radius:
/// `clamp(floor(log2(2 pi r) - 5 + bias), 1, max_level)`.
pub fn detail_level(apparent_radius_px: f64, bias: f64, max_level: u8) -> u8 {
    let max_level = max_level.max(1);
    if !(apparent_radius_px > 0.0) {
        return 1;
    }
    let level = ((TAU * apparent_radius_px).log2() - 5.0 + bias).floor();
    level.clamp(1.0, f64::from(max_level)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_at(distance: f64) -> ViewParams {
        ViewParams {
            body_rotation: DMat3::IDENTITY,
            body_position: DVec3::new(0.0, 0.0, -distance),
            body_radius: 1.0,
            requested_level: 14,
            view_aperture: None,
            sun_direction: DVec3::X,
            fogged: false,
        }
    }

    /// A static camera keeps the full level range.
    #[test]
    fn test_no_motion_no_cap() {
        let tuning = LodTuning::default();
        assert_eq!(motion_level_cap(0.0, &tuning), 14);
        let limit = 5.12 * 2f64.powi(-14);
        assert_eq!(motion_level_cap(limit, &tuning), 14);
        assert_eq!(motion_level_cap(limit * 1.5, &tuning), 13);
        assert_eq!(motion_level_cap(limit * 3.0, &tuning), 12);
    }

    /// Very fast motion bottoms out at the floor level.
    #[test]
    fn test_motion_cap_floor() {
        let tuning = LodTuning::default();
        assert_eq!(motion_level_cap(3.0, &tuning), 5);
    }

    /// The target level is the smallest of request, body limit and motion cap.
    #[test]
    fn test_target_level_takes_minimum() {
        let tuning = LodTuning::default();
        let frame = FrameParams::new(&view_at(2.0), 11, &tuning, None, Vec3::ZERO);
        assert_eq!(frame.target_level, 11);

        let moved = DVec3::new(0.1, 0.0, 1.0).normalize();
        let frame = FrameParams::new(&view_at(2.0), 11, &tuning, Some(moved), Vec3::ZERO);
        assert_eq!(frame.target_level, 5);
    }

    /// Aperture and horizon follow from the camera distance.
    #[test]
    fn test_derived_aperture_and_horizon() {
        let frame = FrameParams::new(&view_at(2.0), 14, &LodTuning::default(), None, Vec3::ZERO);
        assert!((frame.camera_dist - 2.0).abs() < 1e-12);
        assert!((frame.view_aperture - std::f64::consts::FRAC_PI_3).abs() < 1e-12);
        assert!((frame.horizon_dist - 3f64.sqrt()).abs() < 1e-12);
        assert!((frame.camera_dir - DVec3::Z).length() < 1e-12);
    }

    /// Requested detail never increases with distance.
    #[test]
    fn test_detail_level_monotonic_in_distance() {
        let mut previous = u8::MAX;
        for step in 0..200 {
            let distance = 1.001 * 1.05f64.powi(step);
            let r = apparent_radius_px(1.0, distance, 1080.0, 0.35);
            let level = detail_level(r, 0.0, 14);
            assert!(level <= previous, "distance {distance}");
            previous = level;
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn test_detail_level_clamps() {
        assert_eq!(detail_level(0.0, 0.0, 14), 1);
        assert_eq!(detail_level(1.0e9, 0.0, 14), 14);
        assert_eq!(detail_level(100.0, 0.0, 14), 4);
        assert_eq!(detail_level(100.0, 1.0, 14), 5);
    }
}
