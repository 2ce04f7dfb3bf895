//! Per-tile capability tables for the base levels.

use crate::base_table::PATCH_COUNT;
use crate::error::ArchiveError;
use crate::flags::CapabilityFlags;

/// Capability flags for a contiguous range of base levels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityRecord {
    /// First level covered by `flags`.
    pub min_level: u8,
    /// Last level covered by `flags`.
    pub max_level: u8,
    /// One raw flag byte per tile, starting at the first tile of `min_level`.
    pub flags: Vec<u8>,
}

impl CapabilityRecord {
    /// Flags of the base tile at table index `index`.
    ///
    /// Tiles below the covered range are opaque; tiles above it, or past
    /// the end of the recorded flags, are blank.
    pub fn flags_for(&self, index: usize) -> CapabilityFlags {
        let first = PATCH_COUNT
            .get(self.min_level.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(0);
        if index < first {
            return CapabilityFlags::FORCE_OPAQUE;
        }
        let end = PATCH_COUNT
            .get(self.max_level as usize)
            .copied()
            .unwrap_or(usize::MAX);
        if index >= end {
            return CapabilityFlags::EMPTY;
        }
        self.flags
            .get(index - first)
            .map_or(CapabilityFlags::EMPTY, |&bits| {
                CapabilityFlags::from_bits(bits)
            })
    }
}

/// Source of capability records.
pub trait CapabilityTable: Send + Sync {
    fn load_capabilities(&self, body: &str) -> Result<CapabilityRecord, ArchiveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tiles below the first covered level default to opaque.
    #[test]
    fn test_below_range_is_opaque() {
        let record = CapabilityRecord {
            min_level: 5,
            max_level: 8,
            flags: vec![0x03; 4],
        };
        assert_eq!(record.flags_for(0), CapabilityFlags::FORCE_OPAQUE);
        assert_eq!(record.flags_for(4), CapabilityFlags::FORCE_OPAQUE);
        assert_eq!(record.flags_for(5).bits(), 0x03);
    }

    /// Tiles past the recorded flags are blank.
    #[test]
    fn test_above_range_is_blank() {
        let record = CapabilityRecord {
            min_level: 1,
            max_level: 2,
            flags: vec![0x04, 0x01],
        };
        assert_eq!(record.flags_for(0), CapabilityFlags::HAS_LIGHTS);
        assert_eq!(record.flags_for(2), CapabilityFlags::EMPTY);
    }

    /// Flags recorded past the last covered level are ignored.
    #[test]
    fn test_flags_beyond_max_level_are_blank() {
        let record = CapabilityRecord {
            min_level: 1,
            max_level: 1,
            flags: vec![0x04, 0x01],
        };
        assert_eq!(record.flags_for(0), CapabilityFlags::HAS_LIGHTS);
        assert_eq!(record.flags_for(1), CapabilityFlags::EMPTY);
    }
}
