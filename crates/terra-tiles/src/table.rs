//! Node construction from a body's high-resolution tile table.
//!
//! The table is kept for the lifetime of the manager so that subtrees freed
//! after leaving the view can be rebuilt on the next visit.

use crate::archive::TableOfContents;
use crate::error::ArchiveError;
use crate::flags::CapabilityFlags;
use crate::node::{NO_TILE, TextureSlot, TileNode};

/// Raw capability bits a table entry may carry.
const ENTRY_FLAG_BITS: u8 = 0x07;

/// A table of contents plus the settings that shape nodes built from it.
#[derive(Debug)]
pub(crate) struct TileTable {
    name: String,
    toc: TableOfContents,
    max_level: u8,
    specular: bool,
    lights: bool,
}

impl TileTable {
    pub fn new(name: String, toc: TableOfContents, max_level: u8, specular: bool, lights: bool) -> Self {
        Self {
            name,
            toc,
            max_level,
            specular,
            lights,
        }
    }

    pub fn len(&self) -> usize {
        self.toc.entries.len()
    }

    pub fn is_versioned(&self) -> bool {
        self.toc.versioned
    }

    /// Entry index of child `quadrant` of entry `index`.
    pub fn child_index(&self, index: u32, quadrant: usize) -> Option<u32> {
        let child = *self.toc.entries.get(index as usize)?.children.get(quadrant)?;
        (child != 0).then_some(child)
    }

    /// Unloaded node for entry `index` placed at `level`.
    ///
    /// Entries below the maximum level, and entries with neither flags nor
    /// children, yield `Ok(None)`. A reference past the end of the table is
    /// malformed.
    pub fn node(&self, index: u32, level: u8) -> Result<Option<TileNode>, ArchiveError> {
        if level > self.max_level {
            return Ok(None);
        }
        let Some(entry) = self.toc.entries.get(index as usize) else {
            return Err(ArchiveError::Malformed {
                name: self.name.clone(),
                reason: format!("entry {index} out of range ({} entries)", self.len()),
            });
        };
        if entry.flags == 0 && !entry.has_children() {
            return Ok(None);
        }

        let mut node = TileNode::new(level);
        node.toc_index = Some(index);
        node.surface = TextureSlot::from_archive_index(entry.surface);
        if self.specular || self.lights {
            node.flags = CapabilityFlags::from_bits(entry.flags & ENTRY_FLAG_BITS)
                .with_features(self.specular, self.lights);
            if entry.mask != NO_TILE {
                node.mask = TextureSlot::from_archive_index(entry.mask);
            }
        } else {
            node.flags = CapabilityFlags::FORCE_OPAQUE;
        }
        if !self.toc.versioned {
            node.flags.insert(CapabilityFlags::LEGACY_ADDRESSING);
        }
        node.sync_pending_flag();
        Ok(Some(node))
    }
}
