//! Tile geometry on the unit sphere: centres, extents, transforms and the
//! angular tests used by the traversal.
//!
//! Directions are expressed in the body frame. Southern tiles are described
//! with northern coordinates and mirrored through a 180 degree rotation about
//! the body X axis.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2, TAU};

use glam::{DAffine3, DMat3, DVec3};

use crate::base_table::{Hemisphere, TileCoord};

/// Rotation taking northern tile coordinates into the given hemisphere.
pub fn hemisphere_flip(hemisphere: Hemisphere) -> DMat3 {
    match hemisphere {
        Hemisphere::North => DMat3::IDENTITY,
        Hemisphere::South => DMat3::from_rotation_x(PI),
    }
}

/// Longitude of a tile's western edge. Offset by pi so textures wrap at 180 degrees.
pub fn tile_longitude(coord: &TileCoord) -> f64 {
    TAU * f64::from(coord.ilng) / f64::from(coord.nlng) + PI
}

/// Unit direction from the body centre to the tile centre.
pub fn tile_centre(hemisphere: Hemisphere, coord: &TileCoord) -> DVec3 {
    let lat = FRAC_PI_2 * (f64::from(coord.ilat) + 0.5) / f64::from(coord.nlat);
    let lng = TAU * (f64::from(coord.ilng) + 0.5) / f64::from(coord.nlng) + PI;
    let (slat, clat) = lat.sin_cos();
    let (slng, clng) = lng.sin_cos();
    match hemisphere {
        Hemisphere::North => DVec3::new(clat * clng, slat, clat * slng),
        Hemisphere::South => DVec3::new(clat * clng, -slat, -clat * slng),
    }
}

/// Angular radius used for the coarse visibility test of a tile.
pub fn angular_radius(nlat: u32) -> f64 {
    SQRT_2 * FRAC_PI_2 * 0.5 / f64::from(nlat)
}

/// Angular distance between the camera direction and the nearest point of
/// a tile's bounding cap. Negative when the camera is above the cap.
pub fn angular_distance(camera_dir: DVec3, centre: DVec3, radius: f64) -> f64 {
    camera_dir.dot(centre).clamp(-1.0, 1.0).acos() - radius
}

/// Whether a tile at `adist` lies outside the visible aperture. The boundary
/// itself counts as culled.
pub fn outside_aperture(adist: f64, aperture: f64) -> bool {
    adist >= aperture
}

/// Whether a bounding sphere at `distance` from the camera lies entirely
/// behind the horizon. A sphere touching the horizon is kept.
pub fn beyond_horizon(distance: f64, radius: f64, horizon_dist: f64) -> bool {
    distance - radius > horizon_dist
}

/// Latitude/longitude bounds of a tile, in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileExtents {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl TileExtents {
    pub fn new(hemisphere: Hemisphere, coord: &TileCoord) -> Self {
        let lat_min = FRAC_PI_2 * f64::from(coord.ilat) / f64::from(coord.nlat);
        let lat_max = lat_min + FRAC_PI_2 / f64::from(coord.nlat);
        let lng_min = tile_longitude(coord);
        let lng_max = lng_min + TAU / f64::from(coord.nlng);
        match hemisphere {
            Hemisphere::North => Self {
                lat_min,
                lat_max,
                lng_min,
                lng_max,
            },
            Hemisphere::South => {
                let (mut lng_min, mut lng_max) = (-lng_max, -lng_min);
                if lng_max < 0.0 {
                    lng_min += TAU;
                    lng_max += TAU;
                }
                Self {
                    lat_min: -lat_max,
                    lat_max: -lat_min,
                    lng_min,
                    lng_max,
                }
            }
        }
    }

    /// Angular distance from a point to these bounds, taking the larger of
    /// the latitude and longitude separations.
    pub fn distance_to(&self, lat: f64, lng: f64) -> f64 {
        let mut lng = lng;
        if lng < self.lng_min - PI {
            lng += TAU;
        } else if lng > self.lng_max + PI {
            lng -= TAU;
        }
        let dlng = if lng < self.lng_min {
            self.lng_min - lng
        } else if lng > self.lng_max {
            lng - self.lng_max
        } else {
            0.0
        };
        let dlat = if lat < self.lat_min {
            self.lat_min - lat
        } else if lat > self.lat_max {
            lat - self.lat_max
        } else {
            0.0
        };
        dlng.max(dlat)
    }
}

/// Latitude and longitude of a body-frame unit direction.
pub fn lat_lng(dir: DVec3) -> (f64, f64) {
    (dir.y.clamp(-1.0, 1.0).asin(), dir.z.atan2(dir.x))
}

/// Outcome of the oblique-view test for one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObliqueDecision {
    /// Subdivide as requested.
    StepDown,
    /// Render at this level.
    Veto,
    /// Render at this level with the parent's texture.
    CoarseTexture,
}

/// Decide whether a tile seen at angular distance `adist` (radians) from a
/// camera `cam_dist` body radii from the centre may be subdivided.
///
/// `stepdown_slope`, `coarse_slope` and `bias` scale the tilt cosine into
/// multiples of the tile's angular radius `rad`.
pub fn oblique_decision(
    adist: f64,
    rad: f64,
    cam_dist: f64,
    stepdown_slope: f64,
    coarse_slope: f64,
    bias: f64,
) -> ObliqueDecision {
    let (a, cosa) = adist.sin_cos();
    let b = cam_dist - cosa;
    let ctilt = b * cosa / (a * a * (1.0 + 2.0 * b) + b * b).sqrt();
    if adist > rad * (stepdown_slope * ctilt + bias) {
        if adist > rad * (coarse_slope * ctilt + bias) {
            ObliqueDecision::CoarseTexture
        } else {
            ObliqueDecision::Veto
        }
    } else {
        ObliqueDecision::StepDown
    }
}

/// Camera-relative world transform of a tile mesh.
///
/// `body` maps body-frame directions into the world frame for the tile's
/// hemisphere, `body_pos` is the body centre relative to the camera. Tiles
/// finer than eight latitude bands use meshes whose origin sits at the tile's
/// south-west corner; the corner offset is added to the translation in double
/// precision.
pub fn tile_world(body: DMat3, body_pos: DVec3, radius: f64, coord: &TileCoord) -> DAffine3 {
    let lng = tile_longitude(coord);
    let rotation = DMat3::from_rotation_y(-lng);
    let linear = body * rotation * radius;
    let translation = if coord.nlat > 8 {
        let lat = FRAC_PI_2 * f64::from(coord.ilat) / f64::from(coord.nlat);
        body_pos + linear * DVec3::new(lat.cos(), lat.sin(), 0.0)
    } else {
        body_pos
    };
    DAffine3::from_mat3_translation(linear, translation)
}

/// Largest axis scale of a transform, used to scale bounding radii.
pub fn max_scale(world: &DAffine3) -> f64 {
    let m = world.matrix3;
    m.x_axis.length().max(m.y_axis.length()).max(m.z_axis.length())
}
