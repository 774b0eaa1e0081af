//! Configuration loaded from `kila.toml`.
//!
//! ```toml
//! database = "kila.db"
//! public_base_url = "https://camp.example.org"
//! log_level = "info"
//!
//! [editor]
//! allowed_block_types = ["heading", "text", "image", "link"]
//! restrict_beside_media = true
//! ```
//!
//! Every key is optional. The file is looked up at an explicit path, then
//! `$KILA_CONFIG`, then `./kila.toml`, then `~/.config/kila/kila.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use kila_types::BlockType;

use crate::layout::InsertPolicy;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "KILA_CONFIG";

/// File name looked for in the working and config directories.
pub const CONFIG_FILE: &str = "kila.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilaConfig {
    /// SQLite content database.
    pub database: PathBuf,
    /// Base of public blob URLs.
    pub public_base_url: String,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub editor: EditorConfig,
}

impl Default for KilaConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("kila.db"),
            public_base_url: "http://localhost:54321".to_string(),
            log_level: "info".to_string(),
            editor: EditorConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Types offered by the block type picker.
    pub allowed_block_types: Vec<BlockType>,
    /// Offer only textual types in slots beside images and galleries.
    pub restrict_beside_media: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        let policy = InsertPolicy::default();
        Self {
            allowed_block_types: policy.allowed,
            restrict_beside_media: policy.restrict_beside_media,
        }
    }
}

impl KilaConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load one file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source, path)
    }

    /// Load from the first location that applies.
    ///
    /// An explicit path (argument or `$KILA_CONFIG`) must exist; the implicit
    /// locations fall back to defaults when absent.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        if let Some(path) = explicit.map(Path::to_path_buf).or(env) {
            info!(path = %path.display(), "loading config");
            return Self::from_file(&path);
        }
        for path in implicit_paths() {
            if path.is_file() {
                info!(path = %path.display(), "loading config");
                return Self::from_file(&path);
            }
        }
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Insert-slot policy for the section panel.
    pub fn insert_policy(&self) -> InsertPolicy {
        InsertPolicy {
            allowed: self.editor.allowed_block_types.clone(),
            restrict_beside_media: self.editor.restrict_beside_media,
        }
    }
}

/// `./kila.toml`, then `<config dir>/kila/kila.toml`.
pub fn implicit_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("kila").join(CONFIG_FILE));
    }
    paths
}
