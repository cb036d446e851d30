use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::config::BlocksConfig;
use super::dynamic::{BlockFactory, DynamicBlock};
use super::types::{BlockId, GeometryKind, Orientation, ORIENTATION_MASK};

pub const DEFAULT_CAPACITY: usize = 512;
/// Geometry codes are a byte; id 0 is the empty voxel.
pub const MAX_VOXEL_IDS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("block registry full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("no free geometry codes left for block `{0}`")]
    VoxelTableFull(String),
    #[error("block `{0}` is already registered")]
    DuplicateName(String),
    #[error("invalid block definitions: {0}")]
    Config(#[from] toml::de::Error),
    #[error("reading block definitions: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to register a block kind.
#[derive(Clone, Debug)]
pub struct BlockDescriptor {
    pub name: String,
    pub geometry: GeometryKind,
    pub textures: [u8; 6],
    pub occludes: bool,
    pub factory: BlockFactory,
}

impl BlockDescriptor {
    pub fn new(name: impl Into<String>, geometry: GeometryKind) -> Self {
        Self {
            name: name.into(),
            geometry,
            textures: [0; 6],
            occludes: true,
            factory: BlockFactory::Static,
        }
    }

    pub fn textures(mut self, textures: [u8; 6]) -> Self {
        self.textures = textures;
        self
    }

    pub fn occludes(mut self, occludes: bool) -> Self {
        self.occludes = occludes;
        self
    }

    pub fn dynamic(mut self, make: fn() -> Box<dyn DynamicBlock>) -> Self {
        self.factory = BlockFactory::Dynamic(make);
        self
    }
}

#[derive(Clone, Debug)]
pub struct BlockInfo {
    pub id: BlockId,
    pub name: String,
    pub geometry: GeometryKind,
    pub textures: [u8; 6],
    pub occludes: bool,
    pub factory: BlockFactory,
    /// First geometry code owned by this kind.
    pub voxel_id: u8,
}

impl BlockInfo {
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.factory.is_dynamic()
    }

    /// Geometry code for a placed block; slopes pick one of their four variants.
    #[inline]
    pub fn voxel_id_for(&self, orientation: Orientation) -> u8 {
        if self.geometry.requires_rotation_variants() {
            self.voxel_id + (orientation & ORIENTATION_MASK)
        } else {
            self.voxel_id
        }
    }

    /// Occlusion byte written into the padded voxel array: 0 hides neighbor faces.
    #[inline]
    pub fn occlusion_byte(&self) -> u8 {
        if self.occludes { 0 } else { 255 }
    }

    pub fn create_dynamic(&self) -> Option<Box<dyn DynamicBlock>> {
        self.factory.create()
    }
}

/// One row of the mesher's geometry-code table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryEntry {
    pub kind: Option<GeometryKind>,
    pub rotation: u8,
}

#[derive(Clone, Debug)]
pub struct BlockRegistry {
    capacity: usize,
    blocks: Vec<BlockInfo>,
    by_name: HashMap<String, BlockId>,
    geometry: Vec<GeometryEntry>,
    textures: Vec<[u8; 6]>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            blocks: Vec::new(),
            by_name: HashMap::new(),
            geometry: vec![GeometryEntry::default()],
            textures: vec![[0; 6]],
        }
    }

    /// Registry preloaded with the built-in kinds.
    pub fn with_builtin() -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        reg.register_builtin()?;
        Ok(reg)
    }

    pub fn register(&mut self, desc: BlockDescriptor) -> Result<BlockId, RegistryError> {
        if self.blocks.len() >= self.capacity {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }
        if self.by_name.contains_key(&desc.name) {
            return Err(RegistryError::DuplicateName(desc.name));
        }
        let variants = desc.geometry.variant_count();
        let first = self.geometry.len();
        if first + variants as usize > MAX_VOXEL_IDS {
            return Err(RegistryError::VoxelTableFull(desc.name));
        }
        for rotation in 0..variants {
            self.geometry.push(GeometryEntry {
                kind: Some(desc.geometry),
                rotation,
            });
            self.textures.push(desc.textures);
        }

        let id = (self.blocks.len() + 1) as BlockId;
        log::info!(
            target: "registry",
            "registered block `{}` id={} voxel_id={} geometry={:?}",
            desc.name, id, first, desc.geometry
        );
        self.by_name.insert(desc.name.clone(), id);
        self.blocks.push(BlockInfo {
            id,
            name: desc.name,
            geometry: desc.geometry,
            textures: desc.textures,
            occludes: desc.occludes,
            factory: desc.factory,
            voxel_id: first as u8,
        });
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&BlockInfo> {
        if id == 0 {
            return None;
        }
        self.blocks.get(id as usize - 1)
    }

    #[inline]
    pub fn is_valid_id(&self, id: BlockId) -> bool {
        id != 0 && (id as usize) <= self.blocks.len()
    }

    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter()
    }

    /// Indexed by geometry code; entry 0 is the empty voxel.
    pub fn geometry_table(&self) -> &[GeometryEntry] {
        &self.geometry
    }

    /// Per-geometry-code face textures, same layout as [`Self::geometry_table`].
    pub fn texture_table(&self) -> &[[u8; 6]] {
        &self.textures
    }

    /// Registers every `[[blocks]]` entry as a static kind, in file order.
    pub fn register_from_toml_str(&mut self, toml_str: &str) -> Result<Vec<BlockId>, RegistryError> {
        let cfg: BlocksConfig = toml::from_str(toml_str)?;
        let mut ids = Vec::with_capacity(cfg.blocks.len());
        for def in cfg.blocks {
            let desc = BlockDescriptor::new(def.name, def.geometry)
                .textures(def.textures)
                .occludes(def.occludes);
            ids.push(self.register(desc)?);
        }
        Ok(ids)
    }

    pub fn load_blocks_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<BlockId>, RegistryError> {
        let text = fs::read_to_string(path)?;
        self.register_from_toml_str(&text)
    }
}
