//! Per-body surface tile manager.
//!
//! A [`TileManager`] owns one body's base-table roots inside the shared
//! [`TileCache`] store. Construction loads capability flags, base textures,
//! base masks and the high-resolution table of contents; [`TileManager::render`]
//! then draws the body each frame, either as a handful of whole-sphere meshes
//! or through the quadtree traversal.

use std::sync::Arc;

use glam::{DAffine3, DVec3, Vec3};
use tracing::{debug, info, warn};

use crate::archive::ArchiveKind;
use crate::base_table::{
    BASE_LEVELS, Hemisphere, LEVEL8_TILE_COUNT, MAX_PATCH_LEVEL, PATCH_COUNT,
    SIMPLE_RENDER_LEVELS, base_tiles,
};
use crate::cache::{TileCache, TileStore};
use crate::capability::{CapabilityRecord, CapabilityTable};
use crate::error::TileError;
use crate::flags::CapabilityFlags;
use crate::frame::{FrameParams, LodTuning, ViewParams};
use crate::mesh::MeshProvider;
use crate::node::{NodeId, TextureSlot, TileNode};
use crate::renderer::{DrawCall, Renderer, TexRange};
use crate::table::TileTable;
use crate::traversal::{FrameStats, Traversal};

/// Immutable per-body settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceSettings {
    /// Deepest level this body is rendered at.
    pub max_level: u8,
    /// Render water reflections; without it every tile is opaque.
    pub specular: bool,
    /// Render night lights.
    pub lights: bool,
    /// Load every tile texture at construction instead of on demand.
    pub preload: bool,
    pub lod: LodTuning,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            max_level: MAX_PATCH_LEVEL,
            specular: true,
            lights: true,
            preload: false,
            lod: LodTuning::default(),
        }
    }
}

impl SurfaceSettings {
    fn features_enabled(&self) -> bool {
        self.specular || self.lights
    }
}

/// Renders the surface of one body.
pub struct TileManager {
    body: Arc<str>,
    cache: TileCache,
    meshes: Arc<dyn MeshProvider>,
    settings: SurfaceSettings,
    max_level: u8,
    base_level: u8,
    /// Base-table roots in table order.
    roots: Vec<NodeId>,
    /// High-resolution tile table, kept to rebuild evicted subtrees.
    table: Option<TileTable>,
    textured: bool,
    ambient: Vec3,
    previous_camera_dir: Option<DVec3>,
}

impl TileManager {
    /// Set up the surface of `body`.
    ///
    /// Missing or malformed archives only disable the features they feed;
    /// the only hard failure is running out of pool capacity for the roots.
    pub fn new(
        body: &str,
        cache: TileCache,
        capabilities: &dyn CapabilityTable,
        meshes: Arc<dyn MeshProvider>,
        settings: SurfaceSettings,
    ) -> Result<Self, TileError> {
        let max_level = settings
            .max_level
            .min(settings.lod.max_patch_level)
            .clamp(1, MAX_PATCH_LEVEL);
        let mut manager = Self {
            body: Arc::from(body),
            cache,
            meshes,
            base_level: max_level.min(BASE_LEVELS),
            max_level,
            settings,
            roots: Vec::new(),
            table: None,
            textured: false,
            ambient: Vec3::ZERO,
            previous_camera_dir: None,
        };

        let flags = manager.base_flags(capabilities);
        manager.allocate_roots(&flags)?;
        manager.load_base_textures();
        manager.load_base_masks();
        if manager.max_level > BASE_LEVELS && manager.base_level == BASE_LEVELS {
            manager.load_tile_tree();
        }
        if manager.settings.preload {
            manager.preload();
        }

        info!(
            body,
            max_level = manager.max_level,
            base_level = manager.base_level,
            textured = manager.textured,
            nodes = manager.node_count(),
            "surface tile manager ready"
        );
        Ok(manager)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Deepest level rendered, after any reduction for missing base textures.
    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Deepest base level with textures.
    pub fn base_level(&self) -> u8 {
        self.base_level
    }

    /// Whether base textures were found.
    pub fn is_textured(&self) -> bool {
        self.textured
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Root node of base-table entry `index`.
    pub fn root(&self, index: usize) -> Option<NodeId> {
        self.roots.get(index).copied()
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    /// Nodes reachable from this body's roots.
    pub fn node_count(&self) -> usize {
        let store = self.cache.lock_store();
        self.roots.iter().map(|&root| subtree(&store, root).len()).sum()
    }

    /// Draw the body for one frame.
    pub fn render(&mut self, view: &ViewParams, renderer: &mut dyn Renderer) -> FrameStats {
        let frame = FrameParams::new(
            view,
            self.max_level,
            &self.settings.lod,
            self.previous_camera_dir,
            self.ambient,
        );
        self.previous_camera_dir = Some(frame.camera_dir);

        let mut stats = FrameStats::default();
        if frame.target_level <= SIMPLE_RENDER_LEVELS {
            self.render_simple(&frame, renderer, &mut stats);
            return stats;
        }

        let start = frame.target_level.min(BASE_LEVELS);
        for hemisphere in Hemisphere::BOTH {
            let mut store = self.cache.lock_store();
            let mut pass = Traversal::new(
                &frame,
                &self.settings.lod,
                &mut store,
                self.meshes.as_ref(),
                &mut *renderer,
                &self.body,
                hemisphere,
                &mut stats,
            )
            .with_table(self.table.as_ref());
            for tile in base_tiles(start).filter(|t| t.hemisphere == hemisphere) {
                if let Some(&root) = self.roots.get(tile.index) {
                    pass.process_root(tile.coord, root);
                }
            }
        }
        if stats.load_requests > 0 {
            self.cache.wake();
        }
        stats
    }

    fn render_simple(
        &self,
        frame: &FrameParams,
        renderer: &mut dyn Renderer,
        stats: &mut FrameStats,
    ) {
        let level = frame.target_level.min(self.base_level);
        let first = PATCH_COUNT[level as usize - 1];
        let bands = if level == SIMPLE_RENDER_LEVELS { 2 } else { 1 };
        let world = DAffine3::from_mat3_translation(
            frame.body_rotation * frame.body_radius,
            frame.body_position,
        );
        let store = self.cache.lock_store();
        for band in 0..bands {
            let Some(mesh) = self.meshes.mesh(level, band) else {
                warn!(level, band, "no mesh for base tile");
                continue;
            };
            let node = self
                .roots
                .get(first + band as usize)
                .and_then(|&id| store.pool().get(id));
            let surface = node.and_then(|n| n.surface.texture());
            let mask = node.and_then(|n| n.mask.texture());
            let flags = node.map_or(CapabilityFlags::FORCE_OPAQUE, |n| n.flags);

            stats.record_draw(level, mesh.vertex_count);
            renderer.record_stats(level, mesh.vertex_count);
            renderer.draw(&DrawCall {
                level,
                mesh,
                world: glam::DMat4::from(world).as_mat4(),
                surface,
                mask,
                tex_range: TexRange::FULL,
                flags,
                ambient: frame.ambient,
                sun_angle: 0.0,
                fogged: frame.fogged,
            });
        }
    }

    /// Capability flags of each base tile, feature switches applied.
    fn base_flags(&self, capabilities: &dyn CapabilityTable) -> Vec<CapabilityFlags> {
        let count = PATCH_COUNT[self.base_level as usize];
        let record = if self.settings.features_enabled() {
            match capabilities.load_capabilities(&self.body) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(body = %self.body, %err, "no capability table, surface is opaque");
                    None
                }
            }
        } else {
            None
        };
        (0..count)
            .map(|i| {
                record
                    .as_ref()
                    .map_or(CapabilityFlags::FORCE_OPAQUE, |r: &CapabilityRecord| r.flags_for(i))
            })
            .collect()
    }

    fn allocate_roots(&mut self, flags: &[CapabilityFlags]) -> Result<(), TileError> {
        let mut store = self.cache.lock_store();
        for (index, &flags) in flags.iter().enumerate() {
            let mut node = TileNode::new(base_level_of(index));
            node.flags = flags;
            let id = store.pool_mut().allocate_root(node)?;
            self.roots.push(id);
        }
        Ok(())
    }

    /// Load the base textures, lowering the base level until the archive
    /// covers it.
    fn load_base_textures(&mut self) {
        let name = ArchiveKind::Base.file_name(&self.body);
        let wanted = PATCH_COUNT[self.base_level as usize];
        let textures = match self.cache.archive().read_sequence(&name, wanted) {
            Ok(textures) => textures,
            Err(err) => {
                warn!(archive = %name, %err, "no base textures, surface is untextured");
                return;
            }
        };
        if textures.is_empty() {
            warn!(archive = %name, "base archive is empty, surface is untextured");
            return;
        }

        let loaded = textures.len();
        while loaded < PATCH_COUNT[self.base_level as usize] {
            self.base_level -= 1;
            self.max_level = self.base_level;
        }
        let keep = PATCH_COUNT[self.base_level as usize];
        if keep < wanted {
            warn!(
                archive = %name,
                loaded,
                base_level = self.base_level,
                "base archive incomplete, reducing resolution"
            );
        }

        let mut store = self.cache.lock_store();
        for surplus in self.roots.drain(keep..) {
            store.remove_tree(surplus);
        }
        for (&root, texture) in self.roots.iter().zip(textures) {
            if let Some(node) = store.pool_mut().get_mut(root) {
                node.surface = TextureSlot::Loaded(Arc::new(texture));
            }
        }
        self.textured = true;
    }

    /// Load masks for the base tiles that need one and apply the global
    /// feature switches.
    fn load_base_masks(&mut self) {
        let specular = self.settings.specular;
        let lights = self.settings.lights;
        let mut store = self.cache.lock_store();
        if !self.settings.features_enabled() {
            for &root in &self.roots {
                if let Some(node) = store.pool_mut().get_mut(root) {
                    node.flags = CapabilityFlags::FORCE_OPAQUE;
                }
            }
            return;
        }

        let needing: Vec<NodeId> = self
            .roots
            .iter()
            .copied()
            .filter(|&id| store.pool().get(id).is_some_and(|n| n.flags.needs_mask()))
            .collect();
        if !needing.is_empty() {
            let name = ArchiveKind::BaseMask.file_name(&self.body);
            let masks = match self.cache.archive().read_sequence(&name, needing.len()) {
                Ok(masks) if masks.len() == needing.len() => Some(masks),
                Ok(masks) => {
                    warn!(
                        archive = %name,
                        found = masks.len(),
                        wanted = needing.len(),
                        "too few base masks, masks disabled"
                    );
                    None
                }
                Err(err) => {
                    warn!(archive = %name, %err, "no base masks, masks disabled");
                    None
                }
            };
            match masks {
                Some(masks) => {
                    for (&id, mask) in needing.iter().zip(masks) {
                        if let Some(node) = store.pool_mut().get_mut(id) {
                            node.mask = TextureSlot::Loaded(Arc::new(mask));
                        }
                    }
                }
                None => {
                    for &root in &self.roots {
                        if let Some(node) = store.pool_mut().get_mut(root) {
                            node.flags = CapabilityFlags::FORCE_OPAQUE;
                        }
                    }
                }
            }
        }

        for &root in &self.roots {
            if let Some(node) = store.pool_mut().get_mut(root) {
                node.flags = node.flags.with_features(specular, lights);
            }
        }
    }

    /// Attach the persisted high-resolution tiles below the level-8 roots.
    fn load_tile_tree(&mut self) {
        let toc = match self.cache.archive().load_toc(&self.body) {
            Ok(toc) => toc,
            Err(err) => {
                info!(body = %self.body, %err, "no high-resolution tiles");
                return;
            }
        };
        if toc.entries.len() < LEVEL8_TILE_COUNT {
            warn!(
                body = %self.body,
                entries = toc.entries.len(),
                "tile table shorter than the level-8 base, ignored"
            );
            return;
        }
        let table = TileTable::new(
            format!("{}_tile.bin", self.body),
            toc,
            self.max_level,
            self.settings.specular,
            self.settings.lights,
        );

        let mut store = self.cache.lock_store();
        let mut ingest = TocIngest::new(&table, &mut store);
        for (i, &root) in self.roots[PATCH_COUNT[7]..].iter().enumerate() {
            let index = i as u32;
            if let Some(node) = ingest.store.pool_mut().get_mut(root) {
                node.toc_index = Some(index);
            }
            for quadrant in 0..4 {
                if let Some(child) = table.child_index(index, quadrant) {
                    ingest.attach(root, quadrant, child, BASE_LEVELS + 1);
                }
            }
        }
        let added = ingest.added;
        drop(store);
        info!(
            body = %self.body,
            nodes = added,
            versioned = table.is_versioned(),
            "loaded tile table"
        );
        self.table = Some(table);
    }

    /// Load every pending texture below the level-8 roots before the first frame.
    fn preload(&self) {
        let pending: Vec<NodeId> = {
            let store = self.cache.lock_store();
            self.roots
                .iter()
                .flat_map(|&root| subtree(&store, root))
                .filter(|&id| store.pool().get(id).is_some_and(|n| n.flags.is_pending()))
                .collect()
        };
        self.cache.hold(true);
        let mut loaded = 0;
        for id in pending {
            if self.cache.load_blocking(&self.body, id) {
                loaded += 1;
            }
        }
        self.cache.hold(false);
        debug!(body = %self.body, loaded, "preloaded tile textures");
    }
}

impl Drop for TileManager {
    fn drop(&mut self) {
        let mut store = self.cache.lock_store();
        let removed: usize = self.roots.drain(..).map(|root| store.remove_tree(root)).sum();
        debug!(body = %self.body, removed, "released surface tiles");
    }
}

/// Base level of table entry `index`.
fn base_level_of(index: usize) -> u8 {
    PATCH_COUNT[1..]
        .iter()
        .position(|&end| index < end)
        .map_or(BASE_LEVELS, |l| l as u8 + 1)
}

/// All nodes of the subtree under `root`, root first.
fn subtree(store: &TileStore, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(node) = store.pool().get(id) else {
            continue;
        };
        out.push(id);
        stack.extend(node.children.iter().flatten().copied());
    }
    out
}

/// Depth-first walk of the tile table that attaches every listed node.
struct TocIngest<'a> {
    table: &'a TileTable,
    store: &'a mut TileStore,
    added: usize,
    /// Set once the pool is full; the walk stops there.
    exhausted: bool,
}

impl<'a> TocIngest<'a> {
    fn new(table: &'a TileTable, store: &'a mut TileStore) -> Self {
        Self {
            table,
            store,
            added: 0,
            exhausted: false,
        }
    }

    fn attach(&mut self, parent: NodeId, quadrant: usize, index: u32, level: u8) {
        if self.exhausted {
            return;
        }
        let node = match self.table.node(index, level) {
            Ok(Some(node)) => node,
            Ok(None) => return,
            Err(err) => {
                warn!(%err, level, "skipping tile table entry");
                return;
            }
        };

        let id = match self.store.pool_mut().insert_child(parent, quadrant, node) {
            Ok(id) => id,
            Err(err) => {
                warn!(%err, level, added = self.added, "tile table truncated");
                self.exhausted = true;
                return;
            }
        };
        self.added += 1;

        for q in 0..4 {
            if let Some(child) = self.table.child_index(index, q) {
                self.attach(id, q, child, level + 1);
            }
        }
    }
}
