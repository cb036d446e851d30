use serde::Deserialize;

use super::types::GeometryKind;

// Top-level block definitions file
#[derive(Deserialize, Debug, Default)]
pub struct BlocksConfig {
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
}

/// A static decoration block declared in TOML.
#[derive(Deserialize, Debug, Clone)]
pub struct BlockDef {
    pub name: String,
    #[serde(default = "default_geometry")]
    pub geometry: GeometryKind,
    // east, north, west, south, up, down
    #[serde(default)]
    pub textures: [u8; 6],
    #[serde(default = "default_occludes")]
    pub occludes: bool,
}

fn default_geometry() -> GeometryKind {
    GeometryKind::Cube
}

fn default_occludes() -> bool {
    true
}
