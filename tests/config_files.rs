use std::path::{Path, PathBuf};

use vox::{ClientConfig, ServerConfig, load_registry};

fn shipped(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[test]
fn shipped_configs_parse() {
    let server = ServerConfig::load(&shipped("server.toml")).unwrap();
    assert_eq!(server.port, vox_net::DEFAULT_PORT);
    assert_eq!(server.start_plane_radius, 1);
    let client = ClientConfig::load(&shipped("client.toml")).unwrap();
    assert_eq!(client.address, "127.0.0.1");
    assert_eq!(client.port, server.port);
}

#[test]
fn shipped_blocks_extend_the_registry() {
    let base = load_registry(None).unwrap();
    let full = load_registry(Some(&shipped("blocks.toml"))).unwrap();
    assert_eq!(full.len(), base.len() + 3);
}
