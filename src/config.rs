//! Configuration for locating and driving MEGAcmd.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the MEGAcmd entry point that takes the subcommand as its first argument.
pub const DEFAULT_EXECUTABLE: &str = "mega-exec";

/// Configuration for the shim, readable from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// MEGAcmd executable. Bare names are looked up in `PATH`.
    pub executable: PathBuf,
    /// Whether the CLI prints JSON instead of text by default.
    pub json: bool,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            json: false,
        }
    }
}

impl ShimConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the MEGAcmd executable.
    #[must_use]
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Sets whether the CLI prints JSON by default.
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Returns `$XDG_CONFIG_HOME/megashim/config.toml` (or the platform equivalent).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("megashim").join("config.toml"))
    }

    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads configuration from [`default_path`](Self::default_path).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        Self::default_path().map_or_else(|| Ok(Self::default()), |path| Self::load(&path))
    }
}
