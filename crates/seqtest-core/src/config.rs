//! Harness configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`HarnessConfig::default`])
//! 2. A TOML file (optional; missing files are ignored)
//! 3. Environment variables prefixed with `SEQTEST_`, nested keys split on
//!    `__` (e.g. `SEQTEST_CAMERA__WIDTH=256`)
//!
//! # Example
//! ```no_run
//! use seqtest_core::config::HarnessConfig;
//!
//! let config = HarnessConfig::load_from("seqtest.toml")?;
//! println!("camera: {}x{}", config.camera.width, config.camera.height);
//! # Ok::<(), seqtest_core::error::ConfigError>(())
//! ```

use crate::encoding::ImageGeometry;
use crate::error::ConfigError;
use crate::logging::{parse_log_level, OutputFormat};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub stage: StageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

/// Synthetic image geometry of every tester camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_bytes_per_pixel")]
    pub bytes_per_pixel: u32,
}

fn default_width() -> u32 {
    128
}
fn default_height() -> u32 {
    128
}
fn default_bytes_per_pixel() -> u32 {
    1
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            bytes_per_pixel: default_bytes_per_pixel(),
        }
    }
}

impl CameraConfig {
    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry::new(self.width, self.height, self.bytes_per_pixel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Step resolution shared by XY and Z stages
    pub steps_per_um: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { steps_per_um: 10.0 }
    }
}

impl HarnessConfig {
    /// Layered sources: defaults, then `path`, then `SEQTEST_` variables.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SEQTEST_").split("__"))
    }

    /// Load and validate configuration from `path` and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: HarnessConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_log_level(&self.logging.level).map_err(ConfigError::Invalid)?;

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Camera resolution must be non-zero, got {}x{}",
                self.camera.width, self.camera.height
            )));
        }
        if ![1, 2, 4].contains(&self.camera.bytes_per_pixel) {
            return Err(ConfigError::Invalid(format!(
                "Invalid bytes_per_pixel {}. Must be 1, 2 or 4",
                self.camera.bytes_per_pixel
            )));
        }
        if self.camera.geometry().checked_buffer_len().is_none() {
            return Err(ConfigError::Invalid(format!(
                "Camera image {}x{}x{} is too large",
                self.camera.width, self.camera.height, self.camera.bytes_per_pixel
            )));
        }
        if self.stage.steps_per_um.is_nan() || self.stage.steps_per_um <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "steps_per_um must be positive, got {}",
                self.stage.steps_per_um
            )));
        }

        Ok(())
    }
}
