//! Layout of the coarse base tiles (levels 1 to 8).
//!
//! Base tiles are stored in one flat table. Levels 1 to 3 are a single
//! whole-sphere tile each, level 4 splits into two hemispheres, and levels 5
//! to 8 divide each hemisphere into latitude bands with a per-band number of
//! longitude tiles. Within a level, tiles are ordered northern hemisphere
//! first, bands from the pole towards the equator, longitudes eastwards.

/// Cumulative tile count at the end of each base level.
///
/// Tiles of level `l` occupy indices `PATCH_COUNT[l - 1]..PATCH_COUNT[l]`.
pub const PATCH_COUNT: [usize; 9] = [0, 1, 2, 3, 5, 13, 37, 137, 501];

/// Deepest level held in the base table.
pub const BASE_LEVELS: u8 = 8;

/// Number of tiles at level 8, the roots of the dynamic quadtree.
pub const LEVEL8_TILE_COUNT: usize = PATCH_COUNT[8] - PATCH_COUNT[7];

/// Absolute upper bound on quadtree depth.
pub const MAX_PATCH_LEVEL: u8 = 14;

/// Deepest level rendered without the quadtree.
pub const SIMPLE_RENDER_LEVELS: u8 = 4;

const LAT_BANDS: [u32; 9] = [0, 1, 1, 1, 1, 1, 2, 4, 8];
const LNG_LEVEL5: [u32; 1] = [4];
const LNG_LEVEL6: [u32; 2] = [8, 4];
const LNG_LEVEL7: [u32; 4] = [16, 16, 12, 6];
const LNG_LEVEL8: [u32; 8] = [32, 32, 30, 28, 24, 18, 12, 6];

/// Half of the sphere a tile belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    pub const BOTH: [Self; 2] = [Self::North, Self::South];
}

/// Position of a tile in its level's latitude/longitude grid of one hemisphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: u8,
    /// Latitude band, 0 at the equator.
    pub ilat: u32,
    /// Number of latitude bands per hemisphere at this level.
    pub nlat: u32,
    pub ilng: u32,
    /// Number of longitude tiles in this band.
    pub nlng: u32,
}

impl TileCoord {
    /// Coordinates of a child. `row` 1 is the poleward half, `col` 0 the western half.
    #[must_use]
    pub fn child(self, row: u32, col: u32) -> Self {
        Self {
            level: self.level + 1,
            ilat: self.ilat * 2 + row,
            nlat: self.nlat * 2,
            ilng: self.ilng * 2 + col,
            nlng: self.nlng * 2,
        }
    }
}

/// A base-table entry with its table index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseTile {
    pub index: usize,
    pub hemisphere: Hemisphere,
    pub coord: TileCoord,
}

/// Number of latitude bands per hemisphere at a base level.
pub fn lat_bands(level: u8) -> u32 {
    LAT_BANDS.get(level as usize).copied().unwrap_or(0)
}

/// Longitude tile count of band `ilat` at base level `level` (5 to 8).
pub fn lng_tiles(level: u8, ilat: u32) -> u32 {
    let table: &[u32] = match level {
        5 => &LNG_LEVEL5,
        6 => &LNG_LEVEL6,
        7 => &LNG_LEVEL7,
        8 => &LNG_LEVEL8,
        _ => return 0,
    };
    table.get(ilat as usize).copied().unwrap_or(0)
}

/// Enumerate the gridded base tiles of `level` (5 to 8) in table order.
///
/// Levels outside that range yield nothing; they are drawn as whole-sphere
/// or hemisphere meshes instead.
pub fn base_tiles(level: u8) -> impl Iterator<Item = BaseTile> {
    let nlat = if (5..=BASE_LEVELS).contains(&level) {
        lat_bands(level)
    } else {
        0
    };
    let first = if nlat > 0 {
        PATCH_COUNT[level as usize - 1]
    } else {
        0
    };

    Hemisphere::BOTH
        .into_iter()
        .flat_map(move |hemisphere| {
            (0..nlat).rev().flat_map(move |ilat| {
                let nlng = lng_tiles(level, ilat);
                (0..nlng).map(move |ilng| {
                    (
                        hemisphere,
                        TileCoord {
                            level,
                            ilat,
                            nlat,
                            ilng,
                            nlng,
                        },
                    )
                })
            })
        })
        .enumerate()
        .map(move |(offset, (hemisphere, coord))| BaseTile {
            index: first + offset,
            hemisphere,
            coord,
        })
}
