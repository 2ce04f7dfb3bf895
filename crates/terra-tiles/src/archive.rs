//! Texture archive interface and table-of-contents records.
//!
//! Container parsing lives behind [`TextureArchive`]; the tile core only
//! deals in archive names, byte offsets and decoded [`Texture`]s.

use crate::error::ArchiveError;
use crate::flags::CapabilityFlags;
use crate::node::{NO_TILE, Texture};

/// Byte size of one slot in archives that use legacy slot addressing.
pub const LEGACY_BLOCK_SIZE: u64 = 32896;

/// How a texture index from the table of contents maps to a byte offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressingMode {
    /// The index is the byte offset.
    #[default]
    Direct,
    /// The index counts fixed-size blocks.
    Legacy,
}

impl AddressingMode {
    pub fn for_flags(flags: CapabilityFlags) -> Self {
        if flags.contains(CapabilityFlags::LEGACY_ADDRESSING) {
            Self::Legacy
        } else {
            Self::Direct
        }
    }

    /// Byte offset of `index`, or `None` for the no-texture sentinel.
    pub fn resolve(self, index: u32, block_size: u64) -> Option<u64> {
        if index == NO_TILE {
            return None;
        }
        Some(match self {
            Self::Direct => u64::from(index),
            Self::Legacy => u64::from(index) * block_size,
        })
    }
}

/// The archives belonging to one body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Base textures for levels 1 to 8, stored in table order.
    Base,
    /// Base mask textures, one per base tile that needs a mask.
    BaseMask,
    /// Surface textures of level 9 and deeper.
    Tile,
    /// Mask textures of level 9 and deeper.
    TileMask,
}

impl ArchiveKind {
    /// File name of this archive for `body`.
    pub fn file_name(self, body: &str) -> String {
        let suffix = match self {
            Self::Base => ".tex",
            Self::BaseMask => "_lmask.tex",
            Self::Tile => "_tile.tex",
            Self::TileMask => "_tile_lmask.tex",
        };
        format!("{body}{suffix}")
    }
}

/// One persisted tile record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TocEntry {
    /// Surface texture index, [`NO_TILE`] if none.
    pub surface: u32,
    /// Mask texture index, [`NO_TILE`] if none.
    pub mask: u32,
    /// Raw capability byte.
    pub flags: u8,
    /// Entry indices of the four children; 0 means no child.
    pub children: [u32; 4],
}

impl TocEntry {
    pub fn has_children(&self) -> bool {
        self.children.iter().any(|&c| c != 0)
    }
}

/// Table of contents of the high-resolution tile archive.
///
/// Entries `0..364` describe the level-8 base tiles in base-table order;
/// deeper tiles are reached through child references.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableOfContents {
    /// `false` for headerless files whose indices use legacy addressing.
    pub versioned: bool,
    pub entries: Vec<TocEntry>,
}

/// Read access to a body's texture archives.
pub trait TextureArchive: Send + Sync {
    /// Read the texture stored at `offset` in `archive`.
    ///
    /// `Ok(None)` means the archive holds no texture at that offset.
    fn read_block(&self, archive: &str, offset: u64) -> Result<Option<Texture>, ArchiveError>;

    /// Read up to `max` consecutive textures from the start of `archive`.
    fn read_sequence(&self, archive: &str, max: usize) -> Result<Vec<Texture>, ArchiveError>;

    /// Load the tile table of contents for `body`.
    fn load_toc(&self, body: &str) -> Result<TableOfContents, ArchiveError>;

    /// Byte offset of texture `index` under `mode`.
    fn resolve_offset(&self, index: u32, mode: AddressingMode) -> Option<u64> {
        mode.resolve(index, LEGACY_BLOCK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Legacy addressing multiplies the index by the block size.
    #[test]
    fn test_legacy_offset() {
        assert_eq!(
            AddressingMode::Legacy.resolve(5, LEGACY_BLOCK_SIZE),
            Some(5 * 32896)
        );
        assert_eq!(AddressingMode::Direct.resolve(5, LEGACY_BLOCK_SIZE), Some(5));
    }

    /// The no-texture sentinel never produces an offset.
    #[test]
    fn test_sentinel_has_no_offset() {
        assert_eq!(AddressingMode::Legacy.resolve(NO_TILE, LEGACY_BLOCK_SIZE), None);
        assert_eq!(AddressingMode::Direct.resolve(NO_TILE, LEGACY_BLOCK_SIZE), None);
    }

    /// The legacy flag selects the addressing mode.
    #[test]
    fn test_mode_from_flags() {
        let legacy = CapabilityFlags::LEGACY_ADDRESSING | CapabilityFlags::FORCE_OPAQUE;
        assert_eq!(AddressingMode::for_flags(legacy), AddressingMode::Legacy);
        assert_eq!(
            AddressingMode::for_flags(CapabilityFlags::FORCE_OPAQUE),
            AddressingMode::Direct
        );
    }

    #[test]
    fn test_archive_file_names() {
        assert_eq!(ArchiveKind::Base.file_name("Earth"), "Earth.tex");
        assert_eq!(ArchiveKind::BaseMask.file_name("Earth"), "Earth_lmask.tex");
        assert_eq!(ArchiveKind::Tile.file_name("Earth"), "Earth_tile.tex");
        assert_eq!(
            ArchiveKind::TileMask.file_name("Earth"),
            "Earth_tile_lmask.tex"
        );
    }
}
