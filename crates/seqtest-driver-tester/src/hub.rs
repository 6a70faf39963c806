//! Tester hub: owns and enumerates the fixed device roster.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::{DeviceFactory, NoConfig};
use anyhow::Result;
use parking_lot::Mutex;
use seqtest_core::capabilities::{Device, Settable};
use seqtest_core::driver::DeviceKind;
use seqtest_core::error::DeviceResult;
use seqtest_core::logger::SettingLogger;
use seqtest_core::property::PropertyTable;
use std::sync::Arc;
use tracing::info;

/// Devices of each kind the hub installs.
pub const DEVICES_PER_KIND: usize = 2;

/// Factory for the `THub` device.
pub struct TesterHubFactory;

impl DeviceFactory for TesterHubFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Hub
    }

    fn description(&self) -> &'static str {
        crate::registry::HUB_DESCRIPTION
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: NoConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, name: &str, context: &DeviceContext, _config: toml::Value) -> Result<TesterDevice> {
        Ok(TesterDevice::Hub(Arc::new(TesterHub::new(name, context))))
    }
}

/// Names of the roster, in installation order.
pub fn roster() -> Vec<(DeviceKind, String)> {
    DeviceKind::peripherals()
        .iter()
        .flat_map(|kind| (0..DEVICES_PER_KIND).map(move |i| (*kind, format!("{}-{}", kind.prefix(), i))))
        .collect()
}

/// Simulated hub.
pub struct TesterHub {
    name: String,
    context: DeviceContext,
    logger: Arc<SettingLogger>,
    lifecycle: Lifecycle,
    properties: PropertyTable,
    installed: Mutex<Vec<TesterDevice>>,
}

impl TesterHub {
    pub fn new(name: &str, context: &DeviceContext) -> Self {
        Self {
            name: name.to_string(),
            context: context.clone(),
            logger: context.logger.clone(),
            lifecycle: Lifecycle::new(),
            properties: PropertyTable::new(name, context.logger.clone()),
            installed: Mutex::new(Vec::new()),
        }
    }

    /// Replace the installed devices with a fresh roster: two of each
    /// peripheral kind, named `<prefix>-<index>`, in [`roster`] order.
    pub fn detect_installed_devices(&self) -> DeviceResult<()> {
        let devices: Vec<TesterDevice> = roster()
            .into_iter()
            .map(|(kind, name)| TesterDevice::build(kind, &name, &self.context))
            .collect();
        info!(hub = %self.name, count = devices.len(), "Detected installed devices");
        *self.installed.lock() = devices;
        Ok(())
    }

    pub fn installed_devices(&self) -> Vec<TesterDevice> {
        self.installed.lock().clone()
    }

    pub fn installed_device(&self, name: &str) -> Option<TesterDevice> {
        self.installed
            .lock()
            .iter()
            .find(|device| device.name() == name)
            .cloned()
    }
}

impl Settable for TesterHub {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterHub {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Hub
    }

    fn initialize(&self) -> DeviceResult<()> {
        self.lifecycle.initialize(&self.name);
        Ok(())
    }

    fn shutdown(&self) -> DeviceResult<()> {
        self.lifecycle.shutdown(&self.name);
        Ok(())
    }

    fn busy(&self) -> bool {
        self.logger.is_busy(&self.name)
    }
}
