//! Per-tile capability flags.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bit set describing the auxiliary data a tile carries and its load state.
///
/// Bit values match the byte stored in capability tables and TOC records, so
/// a raw byte from either source can be wrapped directly.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilityFlags(u8);

impl CapabilityFlags {
    /// No flags set (blank tile).
    pub const EMPTY: Self = Self(0);
    /// The tile has opaque land coverage.
    pub const FORCE_OPAQUE: Self = Self(0x01);
    /// The tile has specular (water) coverage.
    pub const HAS_SPECULAR: Self = Self(0x02);
    /// The tile has night-light data.
    pub const HAS_LIGHTS: Self = Self(0x04);
    /// Archive offsets for this tile are legacy slot indices.
    pub const LEGACY_ADDRESSING: Self = Self(0x40);
    /// At least one texture of this tile has not been loaded yet.
    pub const PENDING_LOAD: Self = Self(0x80);

    /// Wrap a raw flag byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw flag byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Whether the tile needs a mask texture.
    ///
    /// A mask separates land from water on tiles that have both, and carries
    /// the night-light channel.
    #[must_use]
    pub const fn needs_mask(self) -> bool {
        self.contains(Self(Self::FORCE_OPAQUE.0 | Self::HAS_SPECULAR.0))
            || self.contains(Self::HAS_LIGHTS)
    }

    /// Whether the tile's textures are still waiting on the loader.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        self.contains(Self::PENDING_LOAD)
    }

    /// Apply the global feature switches: without specular support a tile is
    /// treated as fully opaque, without lights the light bit is dropped.
    #[must_use]
    pub fn with_features(mut self, specular: bool, lights: bool) -> Self {
        if !lights {
            self.remove(Self::HAS_LIGHTS);
        }
        if !specular {
            self.remove(Self::HAS_SPECULAR);
            self.insert(Self::FORCE_OPAQUE);
        }
        self
    }
}

impl BitOr for CapabilityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CapabilityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CapabilityFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(CapabilityFlags, &str); 5] = [
            (CapabilityFlags::FORCE_OPAQUE, "FORCE_OPAQUE"),
            (CapabilityFlags::HAS_SPECULAR, "HAS_SPECULAR"),
            (CapabilityFlags::HAS_LIGHTS, "HAS_LIGHTS"),
            (CapabilityFlags::LEGACY_ADDRESSING, "LEGACY_ADDRESSING"),
            (CapabilityFlags::PENDING_LOAD, "PENDING_LOAD"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
