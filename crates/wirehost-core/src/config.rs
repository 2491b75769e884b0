//! Startup configuration and address advertisement.
//!
//! Settings live in `~/.wirehost/config.json`:
//!
//! ```json
//! { "Port": 8080, "ReturnIP": "10.0.2.2", "ReturnPort": 9000 }
//! ```
//!
//! Every key is optional. `ReturnIP`/`ReturnPort` override the address the
//! server advertises in `~/.wirehost/address.json` for the deployment
//! tooling that needs to reach it (for example through port forwarding).
//!
//! # Example
//!
//! ```no_run
//! use wirehost_core::config::DriverConfig;
//!
//! // Returns defaults if the file is missing or unreadable
//! let config = DriverConfig::load();
//! println!("listening on port {}", config.port);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;

const CONFIG_FILENAME: &str = "config.json";
const ADDRESS_FILENAME: &str = "address.json";

/// Errors while reading configuration or writing the advertisement.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file was not valid configuration JSON.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// No home directory to hold `~/.wirehost`.
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Listen port.
    #[serde(rename = "Port", default = "default_port")]
    pub port: u16,
    /// Address to advertise instead of the bound one.
    #[serde(rename = "ReturnIP", default, skip_serializing_if = "Option::is_none")]
    pub return_ip: Option<String>,
    /// Port to advertise instead of the bound one.
    #[serde(rename = "ReturnPort", default, skip_serializing_if = "Option::is_none")]
    pub return_port: Option<u16>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            return_ip: None,
            return_port: None,
        }
    }
}

/// The address document written for deployment tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub ip: String,
    pub port: u16,
}

/// Returns `~/.wirehost/`, creating it if needed.
pub fn wirehost_dir() -> Result<PathBuf, ConfigError> {
    let dir = dirs::home_dir()
        .ok_or(ConfigError::NoHomeDir)?
        .join(".wirehost");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl DriverConfig {
    /// Loads `~/.wirehost/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        wirehost_dir()
            .ok()
            .and_then(|dir| Self::load_from(dir.join(CONFIG_FILENAME)).ok())
            .unwrap_or_default()
    }

    /// Loads configuration from `path`, failing on any error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The address to advertise for a server bound to `bound`.
    pub fn advertised_addr(&self, bound: SocketAddr) -> Advertisement {
        Advertisement {
            ip: self
                .return_ip
                .clone()
                .unwrap_or_else(|| bound.ip().to_string()),
            port: self.return_port.unwrap_or(bound.port()),
        }
    }
}

impl Advertisement {
    /// Default location, `~/.wirehost/address.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(wirehost_dir()?.join(ADDRESS_FILENAME))
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Removes a previously written advertisement. A missing file is fine.
    pub fn remove(path: impl AsRef<Path>) -> Result<(), ConfigError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
