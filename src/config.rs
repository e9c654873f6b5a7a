use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::richtext::history::DEFAULT_HISTORY_LIMIT;
use crate::richtext::keymap::ShortcutModifier;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "Scribe";
const APPLICATION: &str = "scribe";
const CONFIG_FILE_NAME: &str = "editor.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Number of undo steps kept
    pub history_limit: usize,
    pub shortcut_modifier: ShortcutModifier,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            history_limit: DEFAULT_HISTORY_LIMIT,
            shortcut_modifier: ShortcutModifier::Auto,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("toml serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

pub fn config_file_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load the configuration at `path`; a missing file yields the defaults
pub fn load_config(path: &Path) -> Result<EditorConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(EditorConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str::<EditorConfig>(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_config(path: &Path, config: &EditorConfig) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let toml = toml::to_string_pretty(config)?;
    fs::write(path, toml).map_err(write_error)
}

impl EditorConfig {
    /// Load from the per-user config directory, if there is one
    pub fn load_default() -> Result<EditorConfig, ConfigError> {
        match config_file_path() {
            Some(path) => load_config(&path),
            None => Ok(EditorConfig::default()),
        }
    }
}
