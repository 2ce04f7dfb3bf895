//! Recursive view-dependent quadtree traversal.
//!
//! One [`Traversal`] walks the tiles of one hemisphere while holding the
//! store lock. For each tile it culls against the visible cap and the view
//! volume, decides between subdividing and drawing, creates and requests
//! children on demand, and evicts the subtrees of tiles that left the view.
//! Evicted tiles listed in the tile table are rebuilt from it on return.

use std::sync::Arc;

use glam::{DAffine3, DMat3, DVec3};
use tracing::warn;

use crate::base_table::{Hemisphere, MAX_PATCH_LEVEL, TileCoord};
use crate::cache::TileStore;
use crate::flags::CapabilityFlags;
use crate::frame::{FrameParams, LodTuning};
use crate::geometry::{
    ObliqueDecision, TileExtents, angular_distance, angular_radius, beyond_horizon, max_scale,
    oblique_decision, outside_aperture, tile_centre, tile_world,
};
use crate::mesh::{MeshProvider, PatchMesh};
use crate::node::{NodeId, TextureHandle, TileNode};
use crate::renderer::{DrawCall, Renderer, TexRange};
use crate::table::TileTable;

/// Counters collected while rendering one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tiles drawn per level.
    pub tiles: [u32; MAX_PATCH_LEVEL as usize + 1],
    pub vertices: u64,
    pub draws: u32,
    /// Load requests accepted by the cache.
    pub load_requests: u32,
    /// Child nodes created or rebuilt from the tile table.
    pub nodes_created: u32,
}

impl FrameStats {
    pub fn total_tiles(&self) -> u32 {
        self.tiles.iter().sum()
    }

    /// Deepest level drawn this frame.
    pub fn max_level(&self) -> Option<u8> {
        self.tiles.iter().rposition(|&n| n > 0).map(|l| l as u8)
    }

    pub(crate) fn record_draw(&mut self, level: u8, vertex_count: u32) {
        if let Some(count) = self.tiles.get_mut(level as usize) {
            *count += 1;
        }
        self.vertices += u64::from(vertex_count);
        self.draws += 1;
    }
}

/// Textures a tile is drawn with: a texture range plus surface, mask and
/// the flags that describe them.
#[derive(Clone, Debug)]
pub(crate) struct TileTextures {
    pub range: TexRange,
    pub surface: Option<TextureHandle>,
    pub mask: Option<TextureHandle>,
    pub flags: CapabilityFlags,
}

impl TileTextures {
    fn with_range(&self, range: TexRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }
}

/// Traversal state for one hemisphere of one frame.
pub(crate) struct Traversal<'a> {
    pub frame: &'a FrameParams,
    pub tuning: &'a LodTuning,
    pub store: &'a mut TileStore,
    pub meshes: &'a dyn MeshProvider,
    pub renderer: &'a mut dyn Renderer,
    pub archive_name: &'a Arc<str>,
    pub hemisphere: Hemisphere,
    pub stats: &'a mut FrameStats,
    table: Option<&'a TileTable>,
    body: DMat3,
    camera_lat: f64,
    camera_lng: f64,
}

impl<'a> Traversal<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frame: &'a FrameParams,
        tuning: &'a LodTuning,
        store: &'a mut TileStore,
        meshes: &'a dyn MeshProvider,
        renderer: &'a mut dyn Renderer,
        archive_name: &'a Arc<str>,
        hemisphere: Hemisphere,
        stats: &'a mut FrameStats,
    ) -> Self {
        let (camera_lat, camera_lng) = frame.camera_lat_lng();
        Self {
            frame,
            tuning,
            store,
            meshes,
            renderer,
            archive_name,
            hemisphere,
            stats,
            table: None,
            body: frame.hemisphere_rotation(hemisphere),
            camera_lat,
            camera_lng,
        }
    }

    /// Rebuild missing children from `table` instead of creating blank ones.
    pub fn with_table(mut self, table: Option<&'a TileTable>) -> Self {
        self.table = table;
        self
    }

    /// Process a base tile with its own textures over the full range.
    pub fn process_root(&mut self, coord: TileCoord, root: NodeId) {
        let Some(node) = self.store.pool().get(root) else {
            return;
        };
        let own = TileTextures {
            range: TexRange::FULL,
            surface: node.surface.texture().cloned(),
            mask: node.mask.texture().cloned(),
            flags: node.flags,
        };
        self.process_tile(coord, root, own.clone(), own);
    }

    /// Cull, subdivide or draw one tile.
    ///
    /// `own` are the textures the tile is drawn with normally; `fallback`
    /// are the parent's, used when the tile is seen too obliquely to
    /// justify its own resolution.
    pub fn process_tile(
        &mut self,
        coord: TileCoord,
        node: NodeId,
        own: TileTextures,
        fallback: TileTextures,
    ) {
        let frame = self.frame;
        let centre = tile_centre(self.hemisphere, &coord);
        let rad = angular_radius(coord.nlat);
        let adist = angular_distance(frame.camera_dir, centre, rad);
        if outside_aperture(adist, frame.view_aperture) {
            return;
        }

        let meshes = self.meshes;
        let Some(mesh) = meshes.mesh(coord.level, coord.ilat) else {
            warn!(level = coord.level, band = coord.ilat, "no mesh for tile");
            return;
        };
        let world = tile_world(self.body, frame.body_position, frame.body_radius, &coord);
        let (bs_centre, bs_radius) = world_bounds(&world, mesh);
        if !self
            .renderer
            .is_visible(bs_centre.as_vec3(), bs_radius as f32)
        {
            self.store.pool_mut().reclaim_children(node);
            return;
        }

        let mut step_down = coord.level < frame.target_level;
        let mut coarse = false;
        if step_down && coord.level >= self.tuning.oblique_min_level && adist > 0.0 {
            let extents = TileExtents::new(self.hemisphere, &coord);
            let adist2 = extents.distance_to(self.camera_lat, self.camera_lng);
            match oblique_decision(
                adist2,
                rad,
                self.tuning.tilt_reference_dist,
                self.tuning.tilt_stepdown_slope,
                self.tuning.tilt_coarse_slope,
                self.tuning.tilt_bias,
            ) {
                ObliqueDecision::StepDown => {}
                ObliqueDecision::Veto => step_down = false,
                ObliqueDecision::CoarseTexture => {
                    step_down = false;
                    coarse = true;
                }
            }
        }

        if step_down {
            self.subdivide(coord, node, &own);
        } else {
            let textures = if coarse { fallback } else { own };
            self.draw(coord, mesh, &world, centre, &textures);
        }
    }

    fn subdivide(&mut self, coord: TileCoord, node: NodeId, own: &TileTextures) {
        let parent_pending = self
            .store
            .pool()
            .get(node)
            .is_none_or(|n| n.flags.is_pending());

        let mut quadrant = 0;
        for row in [1, 0] {
            for col in [0, 1] {
                let child_coord = coord.child(row, col);
                let inherited = own.with_range(own.range.quadrant(row, col));
                let q = quadrant;
                quadrant += 1;

                let child = match self.store.pool().child(node, q) {
                    Some(child) => child,
                    None => {
                        let created = match self.rebuild_child(node, q, child_coord.level) {
                            Some(rebuilt) => self.store.pool_mut().insert_child(node, q, rebuilt),
                            None => self.store.pool_mut().create_child(node, q),
                        };
                        match created {
                            Ok(child) => {
                                self.stats.nodes_created += 1;
                                child
                            }
                            Err(err) => {
                                warn!(%err, level = child_coord.level, "skipping tile subtree");
                                continue;
                            }
                        }
                    }
                };

                let Some(tile) = self.store.pool().get(child) else {
                    continue;
                };
                let pending = tile.flags.is_pending();
                let own_textures = (!pending)
                    .then(|| tile.surface.texture().cloned())
                    .flatten()
                    .map(|surface| TileTextures {
                        range: TexRange::FULL,
                        surface: Some(surface),
                        mask: tile.mask.texture().cloned(),
                        flags: tile.flags,
                    });

                if pending && !parent_pending && self.store.enqueue(self.archive_name, child) {
                    self.stats.load_requests += 1;
                }

                match own_textures {
                    Some(child_own) => {
                        self.process_tile(child_coord, child, child_own, inherited);
                    }
                    None => {
                        self.process_tile(child_coord, child, inherited.clone(), inherited);
                    }
                }
            }
        }
    }

    /// Table node for child `quadrant` of `parent`, if the table lists one.
    fn rebuild_child(&self, parent: NodeId, quadrant: usize, level: u8) -> Option<TileNode> {
        let table = self.table?;
        let index = self.store.pool().get(parent)?.toc_index?;
        let child = table.child_index(index, quadrant)?;
        match table.node(child, level) {
            Ok(node) => node,
            Err(err) => {
                warn!(%err, level, "skipping tile table entry");
                None
            }
        }
    }

    fn draw(
        &mut self,
        coord: TileCoord,
        mesh: &PatchMesh,
        world: &DAffine3,
        centre: DVec3,
        textures: &TileTextures,
    ) {
        let frame = self.frame;
        let (bs_centre, bs_radius) = world_bounds(world, mesh);
        if beyond_horizon(bs_centre.length(), bs_radius, frame.horizon_dist) {
            return;
        }
        if !self
            .renderer
            .is_visible(bs_centre.as_vec3(), bs_radius as f32)
        {
            return;
        }

        let sun_angle = frame.sun_dir.dot(centre).clamp(-1.0, 1.0).acos();
        self.stats.record_draw(coord.level, mesh.vertex_count);
        self.renderer.record_stats(coord.level, mesh.vertex_count);
        self.renderer.draw(&DrawCall {
            level: coord.level,
            mesh,
            world: glam::DMat4::from(*world).as_mat4(),
            surface: textures.surface.as_ref(),
            mask: textures.mask.as_ref(),
            tex_range: textures.range,
            flags: textures.flags,
            ambient: frame.ambient,
            sun_angle: sun_angle as f32,
            fogged: frame.fogged,
        });
    }
}

/// Camera-relative bounding sphere of a mesh under `world`.
fn world_bounds(world: &DAffine3, mesh: &PatchMesh) -> (DVec3, f64) {
    let centre = world.transform_point3(mesh.bounds.center.as_dvec3());
    let radius = f64::from(mesh.bounds.radius) * max_scale(world);
    (centre, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_table::{BaseTile, PATCH_COUNT, base_tiles};
    use crate::cache::CacheSettings;
    use crate::frame::{ViewParams, apparent_radius_px, detail_level};
    use crate::mesh::PatchTemplates;
    use crate::node::{TextureSlot, TileNode};
    use crate::testing::{RecordingRenderer, tagged_texture};
    use glam::Vec3;

    struct Fixture {
        store: TileStore,
        roots: Vec<NodeId>,
        meshes: PatchTemplates,
        archive_name: Arc<str>,
        tuning: LodTuning,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = TileStore::new(&CacheSettings::default());
            let roots = (0..PATCH_COUNT[8])
                .map(|i| {
                    let mut node = TileNode::new(8);
                    node.surface = TextureSlot::Loaded(Arc::new(tagged_texture(i as u32)));
                    node.flags = CapabilityFlags::FORCE_OPAQUE;
                    store.pool_mut().allocate_root(node).unwrap()
                })
                .collect();
            Self {
                store,
                roots,
                meshes: PatchTemplates::new(14),
                archive_name: Arc::from("Vesta"),
                tuning: LodTuning::default(),
            }
        }

        /// Runs both hemisphere passes, like the manager does.
        fn run(&mut self, frame: &FrameParams, renderer: &mut RecordingRenderer) -> FrameStats {
            let mut stats = FrameStats::default();
            let start = frame.target_level.min(8);
            for hemisphere in Hemisphere::BOTH {
                let mut pass = Traversal::new(
                    frame,
                    &self.tuning,
                    &mut self.store,
                    &self.meshes,
                    renderer,
                    &self.archive_name,
                    hemisphere,
                    &mut stats,
                );
                for tile in base_tiles(start).filter(|t| t.hemisphere == hemisphere) {
                    pass.process_root(tile.coord, self.roots[tile.index]);
                }
            }
            stats
        }
    }

    /// A northern mid-latitude level-8 tile.
    fn mid_tile() -> BaseTile {
        base_tiles(8)
            .find(|t| t.hemisphere == Hemisphere::North && t.coord.ilat == 3 && t.coord.ilng == 0)
            .unwrap()
    }

    fn centre_of(tile: &BaseTile) -> DVec3 {
        tile_centre(tile.hemisphere, &tile.coord)
    }

    /// A direction 0.6 rad east of the tile centre.
    fn beside(tile: &BaseTile) -> DVec3 {
        let centre = centre_of(tile);
        let side = centre.cross(DVec3::Y).normalize();
        (centre * 0.6_f64.cos() + side * 0.6_f64.sin()).normalize()
    }

    /// Camera above the given body-frame direction at `altitude` radii.
    fn frame_above(dir: DVec3, altitude: f64, level: u8) -> FrameParams {
        let view = ViewParams {
            body_rotation: DMat3::IDENTITY,
            body_position: -dir.normalize() * (1.0 + altitude),
            body_radius: 1.0,
            requested_level: level,
            view_aperture: None,
            sun_direction: DVec3::X,
            fogged: false,
        };
        FrameParams::new(&view, 14, &LodTuning::default(), None, Vec3::splat(0.1))
    }

    /// From high above, only tiles facing the camera are drawn at the base level.
    #[test]
    fn test_far_view_draws_base_level_only() {
        let mut fx = Fixture::new();
        let mut renderer = RecordingRenderer::new();
        let frame = frame_above(DVec3::X, 3.0, 8);
        let stats = fx.run(&frame, &mut renderer);

        assert!(stats.draws > 0);
        assert_eq!(stats.max_level(), Some(8));
        assert!(stats.total_tiles() < 364, "back side must be culled");
        assert_eq!(stats.nodes_created, 0);
        assert_eq!(renderer.stats.len(), stats.draws as usize);
        assert!(renderer.draws.iter().all(|d| d.surface_tag.is_some()));
        assert!(renderer.draws.iter().all(|d| d.ambient == Vec3::splat(0.1)));
    }

    /// Directly above a tile the drawn depth follows the target level.
    #[test]
    fn test_depth_follows_target_level() {
        let tile = mid_tile();
        for level in [8, 9, 10] {
            let mut fx = Fixture::new();
            let mut renderer = RecordingRenderer::new();
            let stats = fx.run(&frame_above(centre_of(&tile), 0.01, level), &mut renderer);
            assert_eq!(stats.max_level(), Some(level));
        }
    }

    /// Stepping down creates children that borrow the parent's texture quadrant.
    #[test]
    fn test_lazy_children_inherit_parent_texture() {
        let mut fx = Fixture::new();
        let mut renderer = RecordingRenderer::new();
        let tile = mid_tile();
        let stats = fx.run(&frame_above(centre_of(&tile), 0.01, 9), &mut renderer);

        assert!(stats.nodes_created > 0);
        assert_eq!(stats.load_requests, 0, "bare children have nothing to load");
        let level9: Vec<_> = renderer.draws.iter().filter(|d| d.level == 9).collect();
        assert!(!level9.is_empty());
        for draw in level9 {
            assert!(draw.surface_tag.is_some());
            assert_ne!(draw.tex_range, TexRange::FULL);
        }
    }

    /// Culled tiles lose their bare descendants.
    #[test]
    fn test_culled_tiles_evict_children() {
        let mut fx = Fixture::new();
        let mut renderer = RecordingRenderer::new();
        let dir = centre_of(&mid_tile());
        fx.run(&frame_above(dir, 0.01, 10), &mut renderer);
        assert!(fx.store.pool().len() > PATCH_COUNT[8]);

        renderer.max_visible_distance = Some(-1.0);
        let stats = fx.run(&frame_above(dir, 0.01, 10), &mut renderer);
        assert_eq!(stats.draws, 0);
        assert_eq!(fx.store.pool().len(), PATCH_COUNT[8]);
    }

    fn unloaded_child(level: u8, index: u32) -> TileNode {
        let mut node = TileNode::new(level);
        node.surface = TextureSlot::Unloaded(index);
        node.flags = CapabilityFlags::FORCE_OPAQUE;
        node.sync_pending_flag();
        node
    }

    /// Unloaded children are requested once their parent has a texture.
    #[test]
    fn test_pending_child_is_requested() {
        let mut fx = Fixture::new();
        let tile = mid_tile();
        let root = fx.roots[tile.index];
        let child = fx.store.pool_mut().allocate(unloaded_child(9, 42)).unwrap();
        fx.store.pool_mut().set_child(root, 0, child);

        let mut renderer = RecordingRenderer::new();
        let stats = fx.run(&frame_above(centre_of(&tile), 0.01, 9), &mut renderer);
        assert_eq!(stats.load_requests, 1);
        assert!(fx.store.is_queued(child));
    }

    /// Children of a pending parent are not requested.
    #[test]
    fn test_pending_parent_blocks_child_request() {
        let mut fx = Fixture::new();
        let tile = mid_tile();
        let root = fx.roots[tile.index];
        let parent = fx.store.pool_mut().allocate(unloaded_child(9, 1)).unwrap();
        fx.store.pool_mut().set_child(root, 0, parent);
        let grandchild = fx.store.pool_mut().allocate(unloaded_child(10, 2)).unwrap();
        fx.store.pool_mut().set_child(parent, 1, grandchild);

        let mut renderer = RecordingRenderer::new();
        fx.run(&frame_above(centre_of(&tile), 0.01, 10), &mut renderer);
        assert!(fx.store.is_queued(parent));
        assert!(!fx.store.is_queued(grandchild));
    }

    /// A loaded child is drawn with its own texture over the full range.
    #[test]
    fn test_loaded_child_uses_own_texture() {
        let mut fx = Fixture::new();
        let tile = mid_tile();
        let root = fx.roots[tile.index];
        for q in 0..4 {
            let mut child = TileNode::new(9);
            child.surface = TextureSlot::Loaded(Arc::new(tagged_texture(1000 + q as u32)));
            child.flags = CapabilityFlags::FORCE_OPAQUE;
            let id = fx.store.pool_mut().allocate(child).unwrap();
            fx.store.pool_mut().set_child(root, q, id);
        }

        let mut renderer = RecordingRenderer::new();
        fx.run(&frame_above(centre_of(&tile), 0.01, 9), &mut renderer);
        let own: Vec<_> = renderer
            .draws
            .iter()
            .filter(|d| d.surface_tag.is_some_and(|t| t >= 1000))
            .collect();
        assert!(!own.is_empty());
        assert!(own.iter().all(|d| d.level == 9 && d.tex_range == TexRange::FULL));
    }

    /// Grazing tiles stay at their level without requesting children, then
    /// request them once the camera is overhead.
    #[test]
    fn test_oblique_view_defers_child_load() {
        let mut fx = Fixture::new();
        let tile = mid_tile();
        let root = fx.roots[tile.index];
        let child = fx.store.pool_mut().allocate(unloaded_child(9, 7)).unwrap();
        fx.store.pool_mut().set_child(root, 0, child);

        let mut renderer = RecordingRenderer::new();
        fx.run(&frame_above(beside(&tile), 0.2, 10), &mut renderer);
        assert!(!fx.store.is_queued(child));
        let root_draws = renderer
            .draws
            .iter()
            .filter(|d| d.level == 8 && d.surface_tag == Some(tile.index as u32))
            .count();
        assert_eq!(root_draws, 1);

        let mut renderer = RecordingRenderer::new();
        fx.run(&frame_above(centre_of(&tile), 0.01, 10), &mut renderer);
        assert!(fx.store.is_queued(child));
    }

    /// Level of the tile holding the quadrant-0 descendants of `root`.
    fn first_quadrant_depth(store: &TileStore, root: NodeId) -> u8 {
        let mut node = root;
        let mut level = 8;
        while let Some(child) = store.pool().child(node, 0) {
            node = child;
            level += 1;
        }
        level
    }

    /// Backing away from an off-nadir tile never refines it, whether the
    /// requested level is held or follows the altitude.
    #[test]
    fn test_level_never_rises_with_distance() {
        let tile = mid_tile();
        let mut target = tile.coord;
        for _ in 0..6 {
            target = target.child(1, 0);
        }
        let point = tile_centre(tile.hemisphere, &target);
        let side = point.cross(DVec3::Y).normalize();
        let camera_dir = point * 0.1_f64.cos() + side * 0.1_f64.sin();

        for follow_altitude in [false, true] {
            let mut previous: Option<(u8, Option<u8>)> = None;
            for k in 0..12 {
                let altitude = 0.006 * 1.35_f64.powi(k);
                let requested = if follow_altitude {
                    detail_level(apparent_radius_px(1.0, altitude, 1080.0, 0.35), 0.0, 14)
                } else {
                    14
                };
                let mut fx = Fixture::new();
                let mut renderer = RecordingRenderer::new();
                let stats = fx.run(&frame_above(camera_dir, altitude, requested), &mut renderer);
                let depth = first_quadrant_depth(&fx.store, fx.roots[tile.index]);

                if let Some((prev_depth, prev_max)) = previous {
                    assert!(
                        depth <= prev_depth,
                        "altitude {altitude}: tile level {prev_depth} -> {depth}"
                    );
                    assert!(
                        stats.max_level() <= prev_max,
                        "altitude {altitude}: deepest {prev_max:?} -> {:?}",
                        stats.max_level()
                    );
                }
                previous = Some((depth, stats.max_level()));
            }
        }
    }

    /// Coarse mode draws with the parent's texture and range.
    #[test]
    fn test_coarse_mode_uses_fallback_texture() {
        let mut fx = Fixture::new();
        let mut renderer = RecordingRenderer::new();
        let own = TileTextures {
            range: TexRange::FULL,
            surface: Some(Arc::new(tagged_texture(5))),
            mask: None,
            flags: CapabilityFlags::FORCE_OPAQUE,
        };
        let fallback = TileTextures {
            range: TexRange::FULL.quadrant(0, 1),
            surface: Some(Arc::new(tagged_texture(6))),
            ..own.clone()
        };

        let tile = mid_tile();
        let frame = frame_above(beside(&tile), 0.2, 10);
        let mut stats = FrameStats::default();
        let mut pass = Traversal::new(
            &frame,
            &fx.tuning,
            &mut fx.store,
            &fx.meshes,
            &mut renderer,
            &fx.archive_name,
            tile.hemisphere,
            &mut stats,
        );
        pass.process_tile(tile.coord, fx.roots[tile.index], own, fallback);

        assert_eq!(renderer.draws.len(), 1);
        assert_eq!(renderer.draws[0].surface_tag, Some(6));
        assert_eq!(renderer.draws[0].tex_range, TexRange::FULL.quadrant(0, 1));
    }
}
