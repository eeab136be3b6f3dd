use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::unit::UnitConfig;

pub const CONFIG_ENV_VAR: &str = "ISO_ENGINE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "iso_engine.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Red-channel ramp shown after a unit is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HitFlashConfig {
    pub start: u8,
    pub end: u8,
    pub step: u8,
    pub period_ms: u64,
}

impl Default for HitFlashConfig {
    fn default() -> Self {
        Self {
            start: 150,
            end: 255,
            step: 4,
            period_ms: 10,
        }
    }
}

impl HitFlashConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorConfig {
    pub probe_size: f64,
    pub local_static_pick_distance: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        EngineConfig::default().selector_config()
    }
}

/// Engine tuning shared by the renderer, units and selector. Every field has a
/// default, so a config file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world_width: u32,
    pub world_height: u32,
    pub culling_margin: f64,
    pub frame_period_ms: u64,
    pub hit_flash: HitFlashConfig,
    pub max_pending_positions: usize,
    pub probe_size: f64,
    pub local_static_pick_distance: f64,
    pub tile_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_width: 1280,
            world_height: 720,
            culling_margin: 64.0,
            frame_period_ms: 150,
            hit_flash: HitFlashConfig::default(),
            max_pending_positions: 256,
            probe_size: 10.0,
            local_static_pick_distance: 65.0,
            tile_size: 64.0,
        }
    }
}

impl EngineConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn unit_config(&self) -> UnitConfig {
        UnitConfig {
            frame_period: self.frame_period(),
            hit_flash: self.hit_flash,
            max_pending_positions: self.max_pending_positions,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            probe_size: self.probe_size,
            local_static_pick_distance: self.local_static_pick_distance,
        }
    }

    pub fn parse_json(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: EngineConfig = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| {
                let field = error.path().to_string();
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    field,
                    source: error.into_inner(),
                }
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_json(&raw, path)
    }

    /// Loads from `ISO_ENGINE_CONFIG` when set, otherwise from
    /// `<root>/iso_engine.json`. A missing default file yields defaults; a
    /// missing file named by the env var is an error.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(value) => {
                let path = PathBuf::from(value);
                let config = Self::load_from_path(&path)?;
                info!(path = %path.display(), source = "env", "engine_config_loaded");
                Ok(config)
            }
            Err(env::VarError::NotPresent) => {
                let path = root.join(DEFAULT_CONFIG_FILE);
                if !path.is_file() {
                    info!(path = %path.display(), "engine_config_defaults");
                    return Ok(Self::default());
                }
                let config = Self::load_from_path(&path)?;
                info!(path = %path.display(), source = "root", "engine_config_loaded");
                Ok(config)
            }
            Err(source) => Err(ConfigError::EnvVar {
                var: CONFIG_ENV_VAR,
                source,
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.world_width == 0 || self.world_height == 0 {
            return Err(ConfigError::Invalid {
                field: "world_width/world_height",
                message: format!("must be non-zero, got {}x{}", self.world_width, self.world_height),
            });
        }
        if !self.culling_margin.is_finite() || self.culling_margin < 0.0 {
            return Err(ConfigError::Invalid {
                field: "culling_margin",
                message: format!("must be a finite non-negative number, got {}", self.culling_margin),
            });
        }
        if self.frame_period_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_period_ms",
                message: "must be non-zero".to_string(),
            });
        }
        if self.hit_flash.start > self.hit_flash.end {
            return Err(ConfigError::Invalid {
                field: "hit_flash",
                message: format!(
                    "start {} exceeds end {}",
                    self.hit_flash.start, self.hit_flash.end
                ),
            });
        }
        if self.max_pending_positions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_pending_positions",
                message: "must be non-zero".to_string(),
            });
        }
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "tile_size",
                message: format!("must be positive, got {}", self.tile_size),
            });
        }
        Ok(())
    }
}
