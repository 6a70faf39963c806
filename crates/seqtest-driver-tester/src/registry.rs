//! Device registry and factories.
//!
//! The harness builds one [`DeviceRegistry`] explicitly and owns it; nothing
//! is registered process-wide. Device construction dispatches on the name:
//! `"THub"` matches exactly, every other kind matches on its prefix, so any
//! number of `TCamera-<n>`, `TShutter-<n>`, ... can be created.
//!
//! # Example
//!
//! ```rust
//! use seqtest_driver_tester::{DeviceContext, DeviceRegistry, RecordingPipeline};
//! use seqtest_core::SettingLogger;
//! use std::sync::Arc;
//!
//! let context = DeviceContext::new(SettingLogger::shared(), Arc::new(RecordingPipeline::new()));
//! let registry = DeviceRegistry::with_tester_devices(context);
//!
//! let camera = registry.create_device("TCamera-7").unwrap();
//! assert!(camera.as_sequenceable().is_some());
//! assert!(registry.create_device("Nonexistent").is_err());
//! ```

use crate::autofocus::TesterAutofocusFactory;
use crate::camera::TesterCameraFactory;
use crate::common::DeviceContext;
use crate::device::TesterDevice;
use crate::hub::TesterHubFactory;
use crate::shutter::TesterShutterFactory;
use crate::xy_stage::TesterXYStageFactory;
use crate::z_stage::{TesterAFStageFactory, TesterZStageFactory};
use anyhow::{anyhow, Result};
use seqtest_core::driver::{Capability, DeviceKind};
use seqtest_core::error::DeviceError;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

/// Description announced for the hub.
pub const HUB_DESCRIPTION: &str = "Fake devices for automated testing";

/// Builds devices of one kind from per-device TOML configuration.
pub trait DeviceFactory: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    /// Check `config` without building anything.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    fn build(&self, name: &str, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice>;
}

/// Configuration of devices that take none. Only an empty table is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoConfig {}

/// Per-device stage configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Overrides the harness-wide steps per micrometre.
    pub steps_per_um: Option<f64>,
}

impl StageConfig {
    pub fn steps_per_um(&self, context: &DeviceContext) -> f64 {
        self.steps_per_um.unwrap_or(context.steps_per_um)
    }

    pub fn validate(&self) -> Result<()> {
        match self.steps_per_um {
            Some(v) if v.is_nan() || v <= 0.0 => Err(anyhow!("steps_per_um must be positive, got {}", v)),
            _ => Ok(()),
        }
    }
}

/// A device announced by `register_device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDevice {
    pub name: String,
    pub kind: DeviceKind,
    pub description: String,
}

/// Harness-owned registry of devices and the factories that build them.
pub struct DeviceRegistry {
    context: DeviceContext,
    factories: HashMap<DeviceKind, Box<dyn DeviceFactory>>,
    registered: Vec<RegisteredDevice>,
}

impl DeviceRegistry {
    /// Empty registry; devices built from it share `context`.
    pub fn new(context: DeviceContext) -> Self {
        Self {
            context,
            factories: HashMap::new(),
            registered: Vec::new(),
        }
    }

    /// Registry with a factory for every tester kind and the hub announced.
    pub fn with_tester_devices(context: DeviceContext) -> Self {
        let mut registry = Self::new(context);
        registry.register_factory(Box::new(TesterHubFactory));
        registry.register_factory(Box::new(TesterCameraFactory));
        registry.register_factory(Box::new(TesterShutterFactory));
        registry.register_factory(Box::new(TesterXYStageFactory));
        registry.register_factory(Box::new(TesterZStageFactory));
        registry.register_factory(Box::new(TesterAFStageFactory));
        registry.register_factory(Box::new(TesterAutofocusFactory));
        registry.register_device(DeviceKind::Hub.prefix(), DeviceKind::Hub, HUB_DESCRIPTION);
        registry
    }

    /// Register `factory` for its kind, returning the one it replaces.
    pub fn register_factory(&mut self, factory: Box<dyn DeviceFactory>) -> Option<Box<dyn DeviceFactory>> {
        info!(
            kind = %factory.kind(),
            description = factory.description(),
            capabilities = ?factory.capabilities(),
            "Registering device factory"
        );
        self.factories.insert(factory.kind(), factory)
    }

    pub fn has_factory(&self, kind: DeviceKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Announce a device that can be created by name.
    pub fn register_device(&mut self, name: impl Into<String>, kind: DeviceKind, description: impl Into<String>) {
        let device = RegisteredDevice {
            name: name.into(),
            kind,
            description: description.into(),
        };
        info!(name = %device.name, kind = %device.kind, "Registering device");
        self.registered.push(device);
    }

    pub fn registered_devices(&self) -> &[RegisteredDevice] {
        &self.registered
    }

    /// Factory responsible for `name`, by exact hub name or kind prefix.
    pub fn factory_for(&self, name: &str) -> Option<&dyn DeviceFactory> {
        let kind = DeviceKind::from_name(name)?;
        self.factories.get(&kind).map(|factory| factory.as_ref())
    }

    /// Create `name` with default configuration.
    pub fn create_device(&self, name: &str) -> Result<TesterDevice> {
        self.create_device_with_config(name, toml::Value::Table(toml::map::Map::new()))
    }

    /// Validate `config` with the matching factory, then build `name`.
    pub fn create_device_with_config(&self, name: &str, config: toml::Value) -> Result<TesterDevice> {
        let factory = self
            .factory_for(name)
            .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))?;
        factory
            .validate(&config)
            .map_err(|e| e.context(format!("Invalid configuration for {}", name)))?;
        let device = factory.build(name, &self.context, config)?;
        info!(name, kind = %device.kind(), "Device created");
        Ok(device)
    }
}
