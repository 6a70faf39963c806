//! Tester XY stage.
//!
//! Positions are integer steps. `Home`, `Stop` and `SetOrigin` are one-shot
//! settings: triggering them records an entry and moves nothing.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::{DeviceFactory, StageConfig};
use anyhow::Result;
use seqtest_core::capabilities::{Device, Settable, XYLimits, XYPositionable};
use seqtest_core::driver::DeviceKind;
use seqtest_core::error::DeviceResult;
use seqtest_core::logger::SettingLogger;
use seqtest_core::property::PropertyTable;
use seqtest_core::setting::{IntegerSetting, OneShotSetting};
use std::sync::Arc;

/// Travel in steps, symmetric around the origin on both axes.
pub const XY_STEP_LIMIT: i64 = 10_000_000;

/// Factory for `TXYStage*` devices.
pub struct TesterXYStageFactory;

impl DeviceFactory for TesterXYStageFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::XYStage
    }

    fn description(&self) -> &'static str {
        "Test XY stage"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: StageConfig = config.clone().try_into()?;
        cfg.validate()
    }

    fn build(&self, name: &str, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice> {
        let cfg: StageConfig = config.try_into()?;
        let context = context.clone().with_steps_per_um(cfg.steps_per_um(context));
        Ok(TesterDevice::XYStage(Arc::new(TesterXYStage::new(name, &context))))
    }
}

/// Simulated XY stage.
pub struct TesterXYStage {
    name: String,
    logger: Arc<SettingLogger>,
    lifecycle: Lifecycle,
    steps_per_um: f64,
    x: Arc<IntegerSetting>,
    y: Arc<IntegerSetting>,
    home: Arc<OneShotSetting>,
    stop: Arc<OneShotSetting>,
    set_origin: Arc<OneShotSetting>,
    properties: PropertyTable,
}

impl TesterXYStage {
    pub fn new(name: &str, context: &DeviceContext) -> Self {
        let logger = context.logger.clone();
        let x = Arc::new(IntegerSetting::new(logger.clone(), name, "XPositionSteps", 0));
        let y = Arc::new(IntegerSetting::new(logger.clone(), name, "YPositionSteps", 0));
        let home = Arc::new(OneShotSetting::new(logger.clone(), name, "Home"));
        let stop = Arc::new(OneShotSetting::new(logger.clone(), name, "Stop"));
        let set_origin = Arc::new(OneShotSetting::new(logger.clone(), name, "SetOrigin"));
        let properties = PropertyTable::new(name, logger.clone())
            .with("XPositionSteps", x.clone())
            .with("YPositionSteps", y.clone())
            .with("Home", home.clone())
            .with("Stop", stop.clone())
            .with("SetOrigin", set_origin.clone());

        Self {
            name: name.to_string(),
            logger,
            lifecycle: Lifecycle::new(),
            steps_per_um: context.steps_per_um,
            x,
            y,
            home,
            stop,
            set_origin,
            properties,
        }
    }

    pub fn steps_per_um(&self) -> f64 {
        self.steps_per_um
    }

    fn trigger(&self, action: &OneShotSetting) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        action.set_guarded(&mut guard)
    }
}

impl Settable for TesterXYStage {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterXYStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::XYStage
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

impl XYPositionable for TesterXYStage {
    /// Both axes are attempted under one guard; the first failure is returned.
    fn set_position_steps(&self, x: i64, y: i64) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        let x_result = self.x.set_guarded(&mut guard, x);
        let y_result = self.y.set_guarded(&mut guard, y);
        x_result.and(y_result)
    }

    fn position_steps(&self) -> (i64, i64) {
        (self.x.get(), self.y.get())
    }

    fn set_position_um(&self, x: f64, y: f64) -> DeviceResult<()> {
        let to_steps = |um: f64| (um * self.steps_per_um).round() as i64;
        self.set_position_steps(to_steps(x), to_steps(y))
    }

    fn position_um(&self) -> (f64, f64) {
        let (x, y) = self.position_steps();
        (x as f64 / self.steps_per_um, y as f64 / self.steps_per_um)
    }

    fn home(&self) -> DeviceResult<()> {
        self.trigger(&self.home)
    }

    fn stop(&self) -> DeviceResult<()> {
        self.trigger(&self.stop)
    }

    fn set_origin(&self) -> DeviceResult<()> {
        self.trigger(&self.set_origin)
    }

    fn step_limits(&self) -> XYLimits<i64> {
        XYLimits {
            x_min: -XY_STEP_LIMIT,
            x_max: XY_STEP_LIMIT,
            y_min: -XY_STEP_LIMIT,
            y_max: XY_STEP_LIMIT,
        }
    }

    fn limits_um(&self) -> XYLimits<f64> {
        let limit = XY_STEP_LIMIT as f64 / self.steps_per_um;
        XYLimits {
            x_min: -limit,
            x_max: limit,
            y_min: -limit,
            y_max: limit,
        }
    }
}
