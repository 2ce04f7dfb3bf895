//! Quadtree node storage types: node ids, texture slots and tile nodes.

use std::fmt;
use std::sync::Arc;

use crate::flags::CapabilityFlags;

/// Archive index meaning "this tile has no texture".
pub const NO_TILE: u32 = u32::MAX;

/// Stable handle to a node in the [`TilePool`](crate::TilePool).
///
/// The generation distinguishes successive occupants of a reused slot, so a
/// handle held past its node's eviction never aliases a newer node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Slot index inside the pool.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// Decoded texture data as delivered by a texture archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Raw (typically block-compressed) texel payload.
    pub data: Vec<u8>,
}

impl Texture {
    /// Create a texture from its dimensions and payload.
    #[must_use]
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Shared handle to a loaded texture. Dropping the last handle releases it.
pub type TextureHandle = Arc<Texture>;

/// Load state of one texture of a tile.
#[derive(Clone, Debug, Default)]
pub enum TextureSlot {
    /// Known to the archive at this index (or [`NO_TILE`]), not requested yet.
    Unloaded(u32),
    /// A load request for this slot is outstanding.
    Pending(u32),
    /// Texture resident.
    Loaded(TextureHandle),
    /// No texture for this slot.
    #[default]
    Absent,
}

impl TextureSlot {
    /// The resident texture, if any.
    #[must_use]
    pub fn texture(&self) -> Option<&TextureHandle> {
        match self {
            Self::Loaded(tex) => Some(tex),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether the slot still waits for the loader (unloaded or pending).
    #[must_use]
    pub fn awaits_load(&self) -> bool {
        matches!(self, Self::Unloaded(_) | Self::Pending(_))
    }

    /// Archive index of an unloaded or pending slot.
    #[must_use]
    pub fn archive_index(&self) -> Option<u32> {
        match self {
            Self::Unloaded(idx) | Self::Pending(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Slot state for a texture index read from the table of contents.
    #[must_use]
    pub fn from_archive_index(index: u32) -> Self {
        Self::Unloaded(index)
    }

    /// Transition `Unloaded -> Pending`, returning the archive index.
    pub(crate) fn begin_load(&mut self) -> Option<u32> {
        match *self {
            Self::Unloaded(idx) => {
                *self = Self::Pending(idx);
                Some(idx)
            }
            _ => None,
        }
    }

    /// Transition `Pending -> Unloaded` for a request that was discarded.
    pub(crate) fn cancel_load(&mut self) {
        if let Self::Pending(idx) = *self {
            *self = Self::Unloaded(idx);
        }
    }
}

impl From<Option<TextureHandle>> for TextureSlot {
    fn from(texture: Option<TextureHandle>) -> Self {
        texture.map_or(Self::Absent, Self::Loaded)
    }
}

/// One quadtree cell.
#[derive(Clone, Debug, Default)]
pub struct TileNode {
    /// LOD level of the cell.
    pub level: u8,
    /// Child cells in quadrant order (north-west, north-east, south-west, south-east).
    pub children: [Option<NodeId>; 4],
    /// Surface (colour) texture.
    pub surface: TextureSlot,
    /// Specular/night-light mask texture.
    pub mask: TextureSlot,
    /// Capability and load-state flags.
    pub flags: CapabilityFlags,
    /// Table-of-contents entry the node was built from.
    pub toc_index: Option<u32>,
    /// Base-table roots are pinned and never evicted.
    pub(crate) pinned: bool,
}

impl TileNode {
    /// A node at `level` with no texture data.
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Whether the node owns any texture state that eviction must preserve.
    #[must_use]
    pub fn holds_texture(&self) -> bool {
        !self.surface.is_absent() || !self.mask.is_absent()
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// Whether the tile table can rebuild this node after it is freed.
    ///
    /// Only unpinned table nodes with no load outstanding qualify; their
    /// textures can be read again from the archive.
    #[must_use]
    pub fn is_rebuildable(&self) -> bool {
        self.toc_index.is_some()
            && !self.pinned
            && !self.surface.awaits_load()
            && !self.mask.awaits_load()
    }

    /// Whether the node is a base-table root.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Recompute `PENDING_LOAD` from the texture slots.
    pub(crate) fn sync_pending_flag(&mut self) {
        if self.surface.awaits_load() || self.mask.awaits_load() {
            self.flags.insert(CapabilityFlags::PENDING_LOAD);
        } else {
            self.flags.remove(CapabilityFlags::PENDING_LOAD);
        }
    }
}
