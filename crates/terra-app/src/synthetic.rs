//! Procedural archives standing in for a body's texture files.

use terra_tiles::{
    ArchiveError, ArchiveKind, CapabilityFlags, CapabilityRecord, CapabilityTable, NO_TILE,
    PATCH_COUNT, TableOfContents, Texture, TextureArchive, TocEntry,
};

/// Number of level-8 base tiles, the first entries of a tile table.
const ROOT_ENTRIES: usize = PATCH_COUNT[8] - PATCH_COUNT[7];

/// Generates textures on demand instead of reading files.
///
/// Every tile gets a small solid-colour texture derived from its index. The
/// tile table describes a complete quadtree `tile_depth` levels below
/// level 8, with masks on every third tile.
pub struct SyntheticArchive {
    body: String,
    base_textures: usize,
    tile_depth: u8,
    texture_size: u32,
}

impl SyntheticArchive {
    pub fn new(body: &str, tile_depth: u8) -> Self {
        Self {
            body: body.to_string(),
            base_textures: PATCH_COUNT[8],
            tile_depth,
            texture_size: 8,
        }
    }

    /// Serve only the first `count` base textures.
    #[cfg(test)]
    pub fn with_base_textures(mut self, count: usize) -> Self {
        self.base_textures = count;
        self
    }

    fn texture(&self, seed: u64) -> Texture {
        let texels = (self.texture_size * self.texture_size) as usize;
        let rgba = [
            (seed * 37 % 256) as u8,
            (seed * 91 % 256) as u8,
            (seed * 13 % 256) as u8,
            0xff,
        ];
        Texture::new(self.texture_size, self.texture_size, rgba.repeat(texels))
    }

    fn kind(&self, archive: &str) -> Option<ArchiveKind> {
        [
            ArchiveKind::Base,
            ArchiveKind::BaseMask,
            ArchiveKind::Tile,
            ArchiveKind::TileMask,
        ]
        .into_iter()
        .find(|kind| kind.file_name(&self.body) == archive)
    }

    fn missing(name: &str) -> ArchiveError {
        ArchiveError::Missing {
            name: name.to_string(),
        }
    }
}

impl TextureArchive for SyntheticArchive {
    fn read_block(&self, archive: &str, offset: u64) -> Result<Option<Texture>, ArchiveError> {
        match self.kind(archive) {
            Some(ArchiveKind::Tile | ArchiveKind::TileMask) => Ok(Some(self.texture(offset))),
            _ => Err(Self::missing(archive)),
        }
    }

    fn read_sequence(&self, archive: &str, max: usize) -> Result<Vec<Texture>, ArchiveError> {
        let count = match self.kind(archive) {
            Some(ArchiveKind::Base) => self.base_textures.min(max),
            Some(ArchiveKind::BaseMask) => max,
            _ => return Err(Self::missing(archive)),
        };
        Ok((0..count as u64).map(|i| self.texture(i)).collect())
    }

    fn load_toc(&self, body: &str) -> Result<TableOfContents, ArchiveError> {
        if body != self.body || self.tile_depth == 0 {
            return Err(Self::missing(&format!("{body}_tile.bin")));
        }

        let mut entries = vec![TocEntry::default(); ROOT_ENTRIES];
        // Breadth-first: each pass appends the children of the previous one.
        let mut parents: Vec<usize> = (0..ROOT_ENTRIES).collect();
        for depth in 1..=self.tile_depth {
            let mut next = Vec::with_capacity(parents.len() * 4);
            for parent in parents {
                for quadrant in 0..4 {
                    let index = entries.len();
                    entries[parent].children[quadrant] = index as u32;
                    let masked = index % 3 == 0;
                    entries.push(TocEntry {
                        surface: index as u32,
                        mask: if masked { index as u32 } else { NO_TILE },
                        flags: if masked {
                            (CapabilityFlags::FORCE_OPAQUE | CapabilityFlags::HAS_SPECULAR).bits()
                        } else {
                            CapabilityFlags::FORCE_OPAQUE.bits()
                        },
                        children: [0; 4],
                    });
                    if depth < self.tile_depth {
                        next.push(index);
                    }
                }
            }
            parents = next;
        }

        Ok(TableOfContents {
            versioned: true,
            entries,
        })
    }
}

/// Capability table alternating land, coast and lit tiles.
pub struct SyntheticCapabilities;

impl CapabilityTable for SyntheticCapabilities {
    fn load_capabilities(&self, _body: &str) -> Result<CapabilityRecord, ArchiveError> {
        let flags = (0..PATCH_COUNT[8])
            .map(|i| match i % 4 {
                0 => CapabilityFlags::FORCE_OPAQUE,
                1 => CapabilityFlags::FORCE_OPAQUE | CapabilityFlags::HAS_SPECULAR,
                2 => CapabilityFlags::HAS_SPECULAR,
                _ => CapabilityFlags::FORCE_OPAQUE | CapabilityFlags::HAS_LIGHTS,
            })
            .map(CapabilityFlags::bits)
            .collect();
        Ok(CapabilityRecord {
            min_level: 1,
            max_level: 8,
            flags,
        })
    }
}
