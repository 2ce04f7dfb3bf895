//! Renderer sink and the draw calls handed to it.

use glam::{Mat4, Vec3};

use crate::flags::CapabilityFlags;
use crate::mesh::PatchMesh;
use crate::node::TextureHandle;

/// Sub-rectangle of a texture in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexRange {
    pub u_min: f32,
    pub u_max: f32,
    pub v_min: f32,
    pub v_max: f32,
}

impl TexRange {
    /// The whole texture.
    pub const FULL: Self = Self {
        u_min: 0.0,
        u_max: 1.0,
        v_min: 0.0,
        v_max: 1.0,
    };

    /// The quarter of this range covered by child (`row`, `col`).
    ///
    /// Row 1 (poleward) maps to the top half of the texture, `col` 0 to the
    /// left half.
    #[must_use]
    pub fn quadrant(self, row: u32, col: u32) -> Self {
        let du = (self.u_max - self.u_min) * 0.5;
        let dv = (self.v_max - self.v_min) * 0.5;
        let u_min = self.u_min + col as f32 * du;
        let v_min = self.v_min + (1 - row.min(1)) as f32 * dv;
        Self {
            u_min,
            u_max: u_min + du,
            v_min,
            v_max: v_min + dv,
        }
    }
}

impl Default for TexRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Everything the renderer needs to draw one tile.
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    pub level: u8,
    pub mesh: &'a PatchMesh,
    /// Camera-relative world transform of the mesh.
    pub world: Mat4,
    pub surface: Option<&'a TextureHandle>,
    pub mask: Option<&'a TextureHandle>,
    /// Part of `surface`/`mask` mapped onto the mesh.
    pub tex_range: TexRange,
    pub flags: CapabilityFlags,
    pub ambient: Vec3,
    /// Angle between the sun direction and the tile centre, in radians.
    pub sun_angle: f32,
    pub fogged: bool,
}

/// Consumer of tile draw calls.
pub trait Renderer {
    /// Whether a camera-relative bounding sphere intersects the view volume.
    fn is_visible(&self, center: Vec3, radius: f32) -> bool;

    fn draw(&mut self, call: &DrawCall<'_>);

    /// Per-tile statistics hook.
    fn record_stats(&mut self, _level: u8, _vertex_count: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Quadrants tile the parent range with the poleward row on top.
    #[test]
    fn test_quadrants_split_range() {
        let nw = TexRange::FULL.quadrant(1, 0);
        assert_eq!((nw.u_min, nw.u_max, nw.v_min, nw.v_max), (0.0, 0.5, 0.0, 0.5));
        let se = TexRange::FULL.quadrant(0, 1);
        assert_eq!((se.u_min, se.u_max, se.v_min, se.v_max), (0.5, 1.0, 0.5, 1.0));

        let nested = se.quadrant(1, 1);
        assert_eq!(
            (nested.u_min, nested.u_max, nested.v_min, nested.v_max),
            (0.75, 1.0, 0.5, 0.75)
        );
    }
}
