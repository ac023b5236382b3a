use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Accepted file layouts: `[server]` + `[storage]`, or one `[rekdb]` table.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    server: Option<ServerConfig>,
    storage: Option<StorageConfig>,
    rekdb: Option<RekdbTable>,
}

/// Single-table layout: `address`, `port`, `database_location`.
#[derive(Debug, Deserialize)]
struct RekdbTable {
    address: String,
    port: u16,
    database_location: PathBuf,
    #[serde(default)]
    worker_threads: Option<usize>,
}

impl TryFrom<ConfigFile> for AppConfig {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        match file {
            ConfigFile { server: Some(server), storage: Some(storage), .. } => Ok(Self { server, storage }),
            ConfigFile { server: None, storage: None, rekdb: Some(t) } => Ok(Self {
                server: ServerConfig { address: t.address, port: t.port, worker_threads: t.worker_threads },
                storage: StorageConfig { path: t.database_location },
            }),
            _ => Err(ConfigError::Invalid(
                "expected [server] and [storage] tables, or a [rekdb] table".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

/// Resolve the config path: explicit argument, then `CONFIG_PATH`, then `config.toml`.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_with_origin(&content, path)
}

/// Parse and validate configuration from TOML text.
pub fn from_toml_str(content: &str) -> Result<AppConfig, ConfigError> {
    parse_with_origin(content, Path::new("<inline>"))
}

fn parse_with_origin(content: &str, origin: &Path) -> Result<AppConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    let mut cfg = AppConfig::try_from(file)?;
    cfg.normalize_and_validate()?;
    Ok(cfg)
}

impl AppConfig {
    /// Load from the resolved path and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        load_from_file(resolve_path(explicit))
    }

    pub fn normalize_and_validate(&mut self) -> Result<(), ConfigError> {
        self.server.normalize()?;
        self.storage.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<(), ConfigError> {
        self.address = self.address.trim().to_string();
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("server.address must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("server.port must be in 1..=65535".into()));
        }
        match self.worker_threads {
            Some(w) if w > 0 => {}
            _ => self.worker_threads = Some(DEFAULT_WORKER_THREADS),
        }
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.path must not be empty".into()));
        }
        Ok(())
    }
}
