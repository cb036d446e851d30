use serde::Deserialize;

/// 1-based block kind id. 0 never names a registered kind.
pub type BlockId = u16;
/// 2-bit rotation index (0..=3).
pub type Orientation = u8;
pub type PlayerId = u16;

pub const ORIENTATION_MASK: Orientation = 0b11;

/// Arena handle of a chunk inside the world's chunk manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkKey(pub u32);

/// A placed voxel. `id == 0` is an empty slot regardless of any other field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
    pub id: BlockId,
    pub orientation: Orientation,
}

impl Block {
    pub const EMPTY: Block = Block {
        id: 0,
        orientation: 0,
    };

    #[inline]
    pub const fn new(id: BlockId, orientation: Orientation) -> Self {
        Self {
            id,
            orientation: orientation & ORIENTATION_MASK,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// Wire/storage form: `id << 2 | orientation`.
    #[inline]
    pub const fn packed(&self) -> u16 {
        (self.id << 2) | (self.orientation & ORIENTATION_MASK) as u16
    }

    #[inline]
    pub const fn from_packed(v: u16) -> Self {
        Self {
            id: v >> 2,
            orientation: (v & 0b11) as u8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Cube,
    Slope,
    Slab,
    Cross,
}

impl GeometryKind {
    /// Kinds whose silhouette changes with orientation get one mesh variant per rotation.
    #[inline]
    pub const fn requires_rotation_variants(self) -> bool {
        matches!(self, GeometryKind::Slope)
    }

    /// Number of consecutive voxel ids reserved for this kind.
    #[inline]
    pub const fn variant_count(self) -> u8 {
        if self.requires_rotation_variants() { 4 } else { 1 }
    }
}

/// Face slots used by texture tables, in voxel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Face {
    East = 0,
    North = 1,
    West = 2,
    South = 3,
    Up = 4,
    Down = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::East,
        Face::North,
        Face::West,
        Face::South,
        Face::Up,
        Face::Down,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Which process a hook runs in. Server hooks are authoritative, client hooks cosmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

/// Context handed to dynamic-block hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookCtx {
    pub side: Side,
    pub player: Option<PlayerId>,
}

impl HookCtx {
    pub const fn server(player: Option<PlayerId>) -> Self {
        Self {
            side: Side::Server,
            player,
        }
    }

    pub const fn client() -> Self {
        Self {
            side: Side::Client,
            player: None,
        }
    }
}

/// Where a dynamic block lives: owning chunk plus local voxel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSite {
    pub chunk: ChunkKey,
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub block: Block,
}
