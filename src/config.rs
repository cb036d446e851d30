//! TOML-backed server and client settings. Missing keys fall back to defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use vox_net::DEFAULT_PORT;
use vox_net::udp::UdpConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: usize,
    pub tick_ms: u64,
    /// The start plane spans `(2r+1)^2` chunks.
    pub start_plane_radius: i32,
    pub chunk_size: u8,
    /// Re-broadcast neighborhood transforms every N ticks; 0 disables.
    pub transform_broadcast_ticks: u64,
    pub connection_timeout_ms: u64,
    pub log_file: PathBuf,
    pub log_level: String,
    pub blocks_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: 10,
            tick_ms: 10,
            start_plane_radius: 1,
            chunk_size: 24,
            transform_broadcast_ticks: 100,
            connection_timeout_ms: 10_000,
            log_file: PathBuf::from("server.out"),
            log_level: "info".into(),
            blocks_file: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path)?)
    }

    /// Defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.log_level)
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            timeout: Duration::from_millis(self.connection_timeout_ms),
            ..UdpConfig::default()
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub address: String,
    pub port: u16,
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
    pub tick_ms: u64,
    pub log_file: PathBuf,
    pub log_level: String,
    pub blocks_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            connect_attempts: 100,
            connect_retry_ms: 10,
            tick_ms: 16,
            log_file: PathBuf::from("client.out"),
            log_level: "info".into(),
            blocks_file: None,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read(path)?)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.log_level)
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            connect_attempts: self.connect_attempts,
            connect_retry: Duration::from_millis(self.connect_retry_ms),
            ..UdpConfig::default()
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Unknown level names fall back to `info`.
pub fn parse_level(s: &str) -> LevelFilter {
    LevelFilter::from_str(s.trim()).unwrap_or_else(|_| {
        eprintln!("unknown log level {s:?}, using info");
        LevelFilter::Info
    })
}
