//! Startup configuration: grid geometry, spawn area and seed.
//!
//! Loaded once from YAML and validated before any world is built. A world
//! refuses to start on a configuration that fails validation.

use std::path::Path;

use aoiworld_grid::{GridConfig, GridError};
use serde::{Deserialize, Serialize};

use crate::spawn::SpawnArea;

/// Errors from loading or validating a [`WorldConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("spawn area {spawn:?} does not fit inside the world bounds")]
    SpawnOutsideWorld { spawn: SpawnArea },
}

/// Everything a world needs at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub grid: GridConfig,
    pub spawn: SpawnArea,
    /// Seed for spawn placement.
    pub seed: u64,
}

impl WorldConfig {
    /// Read and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        if !self.spawn.fits(&self.grid) {
            return Err(ConfigError::SpawnOutsideWorld { spawn: self.spawn });
        }
        Ok(())
    }
}
