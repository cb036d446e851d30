//! Networked voxel world: authoritative server, replicating client, and the
//! world context they share.
#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod player;
pub mod server;
pub mod world;

use std::path::Path;
use std::sync::Arc;

use vox_blocks::{BlockRegistry, RegistryError};

pub use client::{Client, ClientEvent, ConnectionState, DisconnectReason};
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use error::{HandlerError, StartupError};
pub use player::{Player, PlayerManager, PlayerState};
pub use server::Server;
pub use world::World;

/// Built-in block kinds plus any extra kinds from `blocks_file`.
pub fn load_registry(blocks_file: Option<&Path>) -> Result<Arc<BlockRegistry>, RegistryError> {
    let mut reg = BlockRegistry::with_builtin()?;
    if let Some(path) = blocks_file {
        let ids = reg.load_blocks_file(path)?;
        log::info!(target: "registry", "loaded {} block kinds from {}", ids.len(), path.display());
    }
    Ok(Arc::new(reg))
}
