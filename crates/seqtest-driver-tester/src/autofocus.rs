//! Tester autofocus device.
//!
//! The focus scores are fixed policy: the last score is always `0.0` and the
//! current score is never available.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::{DeviceFactory, NoConfig};
use anyhow::Result;
use seqtest_core::capabilities::{Device, FocusCapable, Settable};
use seqtest_core::driver::DeviceKind;
use seqtest_core::error::{DeviceError, DeviceResult};
use seqtest_core::logger::SettingLogger;
use seqtest_core::property::PropertyTable;
use seqtest_core::setting::{BoolSetting, FloatSetting, OneShotSetting};
use std::sync::Arc;

/// Factory for `TAutofocus*` devices.
pub struct TesterAutofocusFactory;

impl DeviceFactory for TesterAutofocusFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Autofocus
    }

    fn description(&self) -> &'static str {
        "Test autofocus"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let _: NoConfig = config.clone().try_into()?;
        Ok(())
    }

    fn build(&self, name: &str, context: &DeviceContext, _config: toml::Value) -> Result<TesterDevice> {
        Ok(TesterDevice::Autofocus(Arc::new(TesterAutofocus::new(name, context))))
    }
}

/// Simulated autofocus.
pub struct TesterAutofocus {
    name: String,
    logger: Arc<SettingLogger>,
    lifecycle: Lifecycle,
    continuous_focus_enabled: Arc<BoolSetting>,
    offset: Arc<FloatSetting>,
    full_focus: Arc<OneShotSetting>,
    incremental_focus: Arc<OneShotSetting>,
    properties: PropertyTable,
}

impl TesterAutofocus {
    pub fn new(name: &str, context: &DeviceContext) -> Self {
        let logger = context.logger.clone();
        let continuous_focus_enabled = Arc::new(BoolSetting::new(
            logger.clone(),
            name,
            "ContinuousFocusEnabled",
            false,
        ));
        let offset = Arc::new(FloatSetting::new(logger.clone(), name, "Offset", 0.0));
        let full_focus = Arc::new(OneShotSetting::new(logger.clone(), name, "FullFocus"));
        let incremental_focus = Arc::new(OneShotSetting::new(logger.clone(), name, "IncrementalFocus"));
        let properties = PropertyTable::new(name, logger.clone())
            .with("ContinuousFocusEnabled", continuous_focus_enabled.clone())
            .with("Offset", offset.clone())
            .with("FullFocus", full_focus.clone())
            .with("IncrementalFocus", incremental_focus.clone());

        Self {
            name: name.to_string(),
            logger,
            lifecycle: Lifecycle::new(),
            continuous_focus_enabled,
            offset,
            full_focus,
            incremental_focus,
            properties,
        }
    }
}

impl Settable for TesterAutofocus {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterAutofocus {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Autofocus
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

impl FocusCapable for TesterAutofocus {
    fn set_continuous_focusing(&self, enabled: bool) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        self.continuous_focus_enabled.set_guarded(&mut guard, enabled)
    }

    fn continuous_focusing(&self) -> bool {
        self.continuous_focus_enabled.get()
    }

    /// Always locked while continuous focus is on.
    fn is_continuous_focus_locked(&self) -> bool {
        self.continuous_focus_enabled.get()
    }

    fn full_focus(&self) -> DeviceResult<()> {
        self.full_focus.set()
    }

    fn incremental_focus(&self) -> DeviceResult<()> {
        self.incremental_focus.set()
    }

    fn offset(&self) -> f64 {
        self.offset.get()
    }

    fn set_offset(&self, offset: f64) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        self.offset.set_guarded(&mut guard, offset)
    }

    fn last_focus_score(&self) -> DeviceResult<f64> {
        Ok(0.0)
    }

    fn current_focus_score(&self) -> DeviceResult<f64> {
        Err(DeviceError::Unsupported("current_focus_score"))
    }
}
