//! minemap configuration
//!
//! Resolution order: built-in defaults, then the YAML file, then environment.
//!
//! ```text
//! ~/.config/minemap/config.yaml
//!
//! server:
//!   host: 0.0.0.0
//!   port: 5000
//! database:
//!   url: postgres://postgres@localhost:5432/mining_map_db
//!   max_connections: 5
//! client:
//!   api_url: http://localhost:5000
//!   debounce_ms: 500
//! log:
//!   filter: minemap=info,tower_http=info
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Create the PostGIS extension and `listings` table on startup
    pub init_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/mining_map_db".to_string(),
            max_connections: 5,
            init_schema: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub debounce_ms: u64,
    pub geocoder_url: String,
    /// Nominatim's usage policy requires an identifying agent
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            debounce_ms: 500,
            geocoder_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("minemap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "minemap=info,tower_http=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub client: ClientConfig,
    pub log: LogConfig,
}

impl Config {
    /// Default file location (`<config_dir>/minemap/config.yaml`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("minemap")
            .join("config.yaml")
    }

    /// Load from an explicit path, or the default path if it exists, then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::debug!("No config at {}, using defaults", default.display());
                    Self::default()
                }
            }
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file. Missing sections and keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Plain `PORT` and `DATABASE_URL` are read too. The `MINEMAP_` names
    /// win when both are set.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MINEMAP_HOST") {
            self.server.host = host;
        }
        for key in ["PORT", "MINEMAP_PORT"] {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse() {
                    Ok(port) => self.server.port = port,
                    Err(_) => tracing::warn!("Ignoring {key}={raw:?}: not a port number"),
                }
            }
        }
        for key in ["DATABASE_URL", "MINEMAP_DATABASE_URL"] {
            if let Some(url) = lookup(key) {
                self.database.url = url;
            }
        }
        if let Some(url) = lookup("MINEMAP_API_URL") {
            self.client.api_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.client.debounce_ms == 0 {
            return Err(ConfigError::Invalid("client.debounce_ms must be positive".into()));
        }
        Ok(())
    }
}
