//! Patch meshes and the geometry-free bounds provider.
//!
//! The traversal only needs a mesh's vertex count and bounding sphere, so
//! [`PatchTemplates`] reproduces the vertex layout of each patch template in
//! memory, records those figures and discards the vertices.

use glam::{DVec3, Vec3};
use rustc_hash::FxHashMap;

use crate::base_table::{MAX_PATCH_LEVEL, lat_bands, lng_tiles};

/// Identifies one patch template: a level and a latitude band.
///
/// Levels 1 to 3 have a single band, level 4 uses band 0/1 for the
/// northern/southern hemisphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshKey {
    pub level: u8,
    pub band: u32,
}

/// Bounding sphere in the patch's local frame, in units of body radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Static mesh metadata for one patch template.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchMesh {
    pub key: MeshKey,
    pub vertex_count: u32,
    pub face_count: u32,
    pub bounds: BoundingSphere,
}

/// Source of patch meshes, immutable once built.
pub trait MeshProvider: Send + Sync {
    fn mesh(&self, level: u8, band: u32) -> Option<&PatchMesh>;
}

/// Vertex layout parameters of a sphere patch.
#[derive(Clone, Copy, Debug)]
struct PatchShape {
    nlng: u32,
    nlat: u32,
    ilat: u32,
    res: u32,
    /// Longitude segments; `None` derives it from the band's distance to the pole.
    bseg: Option<u32>,
    /// Drop one longitude segment per latitude row (triangular polar caps).
    reduce: bool,
    /// Express vertices relative to the patch's south-west corner.
    shift_origin: bool,
}

impl PatchShape {
    fn new(nlng: u32, nlat: u32, ilat: u32, res: u32, bseg: Option<u32>, reduce: bool) -> Self {
        Self {
            nlng,
            nlat,
            ilat,
            res,
            bseg,
            reduce,
            shift_origin: false,
        }
    }

    fn segments(&self) -> u32 {
        match self.bseg {
            Some(bseg) if self.ilat + 1 != self.nlat => bseg,
            _ => (self.nlat - self.ilat) * self.res,
        }
    }

    fn vertices(&self) -> Vec<DVec3> {
        use std::f64::consts::{FRAC_PI_2, TAU};

        let bseg = self.segments();
        let min_lat = FRAC_PI_2 * f64::from(self.ilat) / f64::from(self.nlat);
        let max_lat = FRAC_PI_2 * f64::from(self.ilat + 1) / f64::from(self.nlat);
        let max_lng = TAU / f64::from(self.nlng);
        let origin = if self.shift_origin {
            DVec3::new(min_lat.cos(), min_lat.sin(), 0.0)
        } else {
            DVec3::ZERO
        };

        let mut out = Vec::new();
        for i in 0..=self.res {
            let lat = min_lat + (max_lat - min_lat) * f64::from(i) / f64::from(self.res);
            let nseg = if self.reduce { bseg - i } else { bseg };
            for j in 0..=nseg {
                let lng = if nseg > 0 {
                    max_lng * f64::from(j) / f64::from(nseg)
                } else {
                    0.0
                };
                let pos = DVec3::new(lat.cos() * lng.cos(), lat.sin(), lat.cos() * lng.sin());
                out.push(pos - origin);
            }
        }
        out
    }

    fn face_count(&self) -> u32 {
        let bseg = self.segments();
        if self.reduce {
            self.res * (2 * bseg - self.res)
        } else {
            2 * self.res * bseg
        }
    }
}

/// Centroid of the vertices and the largest distance from it.
fn bounding_sphere(vertices: &[DVec3]) -> BoundingSphere {
    if vertices.is_empty() {
        return BoundingSphere {
            center: Vec3::ZERO,
            radius: 0.0,
        };
    }
    let center = vertices.iter().copied().sum::<DVec3>() / vertices.len() as f64;
    let radius = vertices
        .iter()
        .map(|v| v.distance(center))
        .fold(0.0_f64, f64::max);
    BoundingSphere {
        center: center.as_vec3(),
        radius: radius as f32,
    }
}

/// Bounds-only patch templates for levels 1 up to a maximum level.
pub struct PatchTemplates {
    meshes: FxHashMap<MeshKey, PatchMesh>,
}

impl PatchTemplates {
    /// Build templates for every level up to `max_level` (capped at the
    /// absolute patch level limit).
    pub fn new(max_level: u8) -> Self {
        let max_level = max_level.min(MAX_PATCH_LEVEL);
        let mut meshes = FxHashMap::default();
        let mut insert = |mesh: PatchMesh| {
            meshes.insert(mesh.key, mesh);
        };

        for (level, nrings) in [(1u8, 6u32), (2, 8), (3, 12)] {
            if level <= max_level {
                insert(sphere_mesh(MeshKey { level, band: 0 }, nrings, false));
            }
        }
        if max_level >= 4 {
            for band in 0..2 {
                insert(sphere_mesh(MeshKey { level: 4, band }, 16, true));
            }
        }
        for level in 5..=max_level {
            for (band, shape) in patch_shapes(level).into_iter().enumerate() {
                let key = MeshKey {
                    level,
                    band: band as u32,
                };
                insert(patch_mesh(key, &shape));
            }
        }

        Self { meshes }
    }

    /// Number of templates built.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl MeshProvider for PatchTemplates {
    fn mesh(&self, level: u8, band: u32) -> Option<&PatchMesh> {
        self.meshes.get(&MeshKey { level, band })
    }
}

fn sphere_mesh(key: MeshKey, nrings: u32, hemisphere: bool) -> PatchMesh {
    let (vertex_count, face_count) = if hemisphere {
        (nrings * (nrings + 1) + 2, 2 * nrings * nrings)
    } else {
        (nrings * (2 * nrings + 1) + 2, 4 * nrings * nrings)
    };
    PatchMesh {
        key,
        vertex_count,
        face_count,
        bounds: BoundingSphere {
            center: Vec3::ZERO,
            radius: 1.0,
        },
    }
}

fn patch_mesh(key: MeshKey, shape: &PatchShape) -> PatchMesh {
    let vertices = shape.vertices();
    PatchMesh {
        key,
        vertex_count: vertices.len() as u32,
        face_count: shape.face_count(),
        bounds: bounding_sphere(&vertices),
    }
}

/// Band shapes of the templates at `level` (5 or deeper).
fn patch_shapes(level: u8) -> Vec<PatchShape> {
    const LEVEL8_SEGMENTS: [u32; 8] = [15, 15, 16, 12, 12, 12, 12, 12];

    match level {
        5 => vec![PatchShape::new(4, 1, 0, 18, None, true)],
        6 => vec![
            PatchShape::new(8, 2, 0, 10, Some(16), true),
            PatchShape::new(4, 2, 1, 12, None, true),
        ],
        7 => vec![
            PatchShape::new(16, 4, 0, 12, Some(12), false),
            PatchShape::new(16, 4, 1, 12, Some(12), false),
            PatchShape::new(12, 4, 2, 10, Some(16), true),
            PatchShape::new(6, 4, 3, 12, None, true),
        ],
        8 => {
            const RES: [u32; 8] = [12, 12, 12, 12, 12, 12, 10, 12];
            const SEGMENTS: [Option<u32>; 8] = [
                Some(15),
                Some(15),
                Some(16),
                Some(12),
                Some(12),
                Some(12),
                Some(16),
                None,
            ];
            (0..8u32)
                .map(|ilat| {
                    let i = ilat as usize;
                    PatchShape::new(lng_tiles(8, ilat), 8, ilat, RES[i], SEGMENTS[i], i >= 6)
                })
                .collect()
        }
        9..=MAX_PATCH_LEVEL => {
            let mult = 1u32 << (level - 8);
            let nlat = lat_bands(8) * mult;
            (0..nlat)
                .map(|ilat| {
                    let band8 = ilat / mult;
                    PatchShape {
                        shift_origin: true,
                        ..PatchShape::new(
                            lng_tiles(8, band8) * mult,
                            nlat,
                            ilat,
                            12,
                            Some(LEVEL8_SEGMENTS[band8 as usize]),
                            false,
                        )
                    }
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Whole-sphere templates use the closed-form vertex counts.
    #[test]
    fn test_sphere_vertex_counts() {
        let templates = PatchTemplates::new(4);
        assert_eq!(templates.mesh(1, 0).unwrap().vertex_count, 80);
        assert_eq!(templates.mesh(2, 0).unwrap().vertex_count, 138);
        assert_eq!(templates.mesh(3, 0).unwrap().vertex_count, 302);
        assert_eq!(templates.mesh(4, 1).unwrap().vertex_count, 274);
        assert!(templates.mesh(5, 0).is_none());
    }

    /// Reduced polar patches drop a triangle of vertices.
    #[test]
    fn test_reduced_patch_vertex_count() {
        let templates = PatchTemplates::new(5);
        let mesh = templates.mesh(5, 0).unwrap();
        // bseg = 18, res = 18: 19*19 - 19*18/2
        assert_eq!(mesh.vertex_count, 19 * 19 - 171);
        assert_eq!(mesh.face_count, 18 * (2 * 18 - 18));
    }

    /// Every level provides one template per latitude band.
    #[test]
    fn test_band_counts_per_level() {
        let templates = PatchTemplates::new(10);
        assert!(templates.mesh(8, 7).is_some());
        assert!(templates.mesh(8, 8).is_none());
        assert!(templates.mesh(9, 15).is_some());
        assert!(templates.mesh(10, 31).is_some());
        assert!(templates.mesh(10, 32).is_none());
        assert_eq!(templates.len(), 3 + 2 + 1 + 2 + 4 + 8 + 16 + 32);
    }

    /// Bounding spheres enclose unit-sphere patches tightly.
    #[test]
    fn test_bounding_sphere_is_near_surface() {
        let templates = PatchTemplates::new(8);
        let mesh = templates.mesh(8, 0).unwrap();
        let centre_dist = mesh.bounds.center.length();
        assert!(centre_dist > 0.9 && centre_dist <= 1.0, "{centre_dist}");
        assert!(mesh.bounds.radius > 0.0 && mesh.bounds.radius < 0.2);
    }

    /// Shifted-origin patches are centred near the local corner.
    #[test]
    fn test_shifted_origin_bounds() {
        let templates = PatchTemplates::new(9);
        let mesh = templates.mesh(9, 0).unwrap();
        assert!(mesh.bounds.center.length() < 0.2);
    }
}
