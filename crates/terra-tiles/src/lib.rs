//! Level-of-detail surface tiles for planetary bodies: a per-body quadtree of
//! texture tiles, refined around the camera and fed by a background loader.

pub mod archive;
pub mod base_table;
pub mod cache;
pub mod capability;
pub mod error;
pub mod flags;
pub mod frame;
pub mod geometry;
pub mod manager;
pub mod mesh;
pub mod node;
pub mod pool;
pub mod renderer;
mod table;
mod traversal;

#[cfg(test)]
pub mod testing;

pub use archive::{
    AddressingMode, ArchiveKind, LEGACY_BLOCK_SIZE, TableOfContents, TextureArchive, TocEntry,
};
pub use base_table::{Hemisphere, MAX_PATCH_LEVEL, PATCH_COUNT, TileCoord};
pub use cache::{CacheSettings, LoadRequest, TileCache, TileStore};
pub use capability::{CapabilityRecord, CapabilityTable};
pub use error::{ArchiveError, TileError};
pub use flags::CapabilityFlags;
pub use frame::{LodTuning, ViewParams, apparent_radius_px, detail_level};
pub use manager::{SurfaceSettings, TileManager};
pub use mesh::{BoundingSphere, MeshKey, MeshProvider, PatchMesh, PatchTemplates};
pub use node::{NO_TILE, NodeId, Texture, TextureHandle, TextureSlot, TileNode};
pub use pool::TilePool;
pub use renderer::{DrawCall, Renderer, TexRange};
pub use traversal::FrameStats;
