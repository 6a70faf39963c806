//! Tester shutter.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::{DeviceFactory, NoConfig};
use anyhow::Result;
use seqtest_core::capabilities::{Device, Settable, ShutterControl};
use seqtest_core::driver::DeviceKind;
use seqtest_core::error::DeviceResult;
use seqtest_core::logger::SettingLogger;
use seqtest_core::property::PropertyTable;
use seqtest_core::setting::BoolSetting;
use std::sync::Arc;

/// Factory for `TShutter*` devices.
pub struct TesterShutterFactory;

impl DeviceFactory for TesterShutterFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Shutter
    }

    fn description(&self) -> &'static str {
        "Test shutter"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: NoConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, name: &str, context: &DeviceContext, _config: toml::Value) -> Result<TesterDevice> {
        Ok(TesterDevice::Shutter(Arc::new(TesterShutter::new(name, context))))
    }
}

/// Simulated shutter. `ShutterState` is exposed as the `State` property.
pub struct TesterShutter {
    name: String,
    logger: Arc<SettingLogger>,
    lifecycle: Lifecycle,
    state: Arc<BoolSetting>,
    properties: PropertyTable,
}

impl TesterShutter {
    pub fn new(name: &str, context: &DeviceContext) -> Self {
        let logger = context.logger.clone();
        let state = Arc::new(BoolSetting::new(logger.clone(), name, "ShutterState", false));
        Self {
            name: name.to_string(),
            properties: PropertyTable::new(name, logger.clone()).with("State", state.clone()),
            logger,
            lifecycle: Lifecycle::new(),
            state,
        }
    }
}

impl Settable for TesterShutter {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterShutter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Shutter
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

impl ShutterControl for TesterShutter {
    fn set_open(&self, open: bool) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        self.state.set_guarded(&mut guard, open)
    }

    fn is_open(&self) -> bool {
        self.state.get()
    }
}
