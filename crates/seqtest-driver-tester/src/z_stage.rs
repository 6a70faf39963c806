//! Tester single-axis stage, used for both `TZStage` and `TAFStage`.

use crate::common::{DeviceContext, Lifecycle};
use crate::device::TesterDevice;
use crate::registry::{DeviceFactory, StageConfig};
use anyhow::Result;
use seqtest_core::capabilities::{Device, Settable, ZPositionable};
use seqtest_core::driver::DeviceKind;
use seqtest_core::error::DeviceResult;
use seqtest_core::logger::SettingLogger;
use seqtest_core::property::PropertyTable;
use seqtest_core::setting::{FloatSetting, OneShotSetting};
use std::sync::Arc;

/// Travel in micrometres, symmetric around the origin.
pub const Z_LIMIT_UM: f64 = 10_000.0;

/// Factory for `TZStage*` devices.
pub struct TesterZStageFactory;

/// Factory for `TAFStage*` devices.
pub struct TesterAFStageFactory;

fn build_z(name: &str, kind: DeviceKind, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice> {
    let cfg: StageConfig = config.try_into()?;
    let context = context.clone().with_steps_per_um(cfg.steps_per_um(context));
    let stage = Arc::new(TesterZStage::new(name, kind, &context));
    Ok(match kind {
        DeviceKind::AutofocusStage => TesterDevice::AutofocusStage(stage),
        _ => TesterDevice::ZStage(stage),
    })
}

impl DeviceFactory for TesterZStageFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::ZStage
    }

    fn description(&self) -> &'static str {
        "Test Z stage"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: StageConfig = config.clone().try_into()?;
        cfg.validate()
    }

    fn build(&self, name: &str, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice> {
        build_z(name, DeviceKind::ZStage, context, config)
    }
}

impl DeviceFactory for TesterAFStageFactory {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AutofocusStage
    }

    fn description(&self) -> &'static str {
        "Test autofocus stage"
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: StageConfig = config.clone().try_into()?;
        cfg.validate()
    }

    fn build(&self, name: &str, context: &DeviceContext, config: toml::Value) -> Result<TesterDevice> {
        build_z(name, DeviceKind::AutofocusStage, context, config)
    }
}

/// Simulated focus drive.
pub struct TesterZStage {
    name: String,
    kind: DeviceKind,
    logger: Arc<SettingLogger>,
    lifecycle: Lifecycle,
    steps_per_um: f64,
    position_um: Arc<FloatSetting>,
    set_origin: Arc<OneShotSetting>,
    properties: PropertyTable,
}

impl TesterZStage {
    pub fn new(name: &str, kind: DeviceKind, context: &DeviceContext) -> Self {
        let logger = context.logger.clone();
        let position_um = Arc::new(FloatSetting::new(logger.clone(), name, "ZPositionUm", 0.0).sequenceable());
        let set_origin = Arc::new(OneShotSetting::new(logger.clone(), name, "SetOrigin"));
        let properties = PropertyTable::new(name, logger.clone())
            .with("ZPositionUm", position_um.clone())
            .with("SetOrigin", set_origin.clone());

        Self {
            name: name.to_string(),
            kind,
            logger,
            lifecycle: Lifecycle::new(),
            steps_per_um: context.steps_per_um,
            position_um,
            set_origin,
            properties,
        }
    }

    pub fn is_position_sequenceable(&self) -> bool {
        self.position_um.is_sequenceable()
    }
}

impl Settable for TesterZStage {
    fn properties(&self) -> &PropertyTable {
        &self.properties
    }
}

impl Device for TesterZStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        self.kind
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

impl ZPositionable for TesterZStage {
    fn set_position_um(&self, z: f64) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        self.position_um.set_guarded(&mut guard, z)
    }

    fn position_um(&self) -> f64 {
        self.position_um.get()
    }

    fn set_position_steps(&self, steps: i64) -> DeviceResult<()> {
        self.set_position_um(steps as f64 / self.steps_per_um)
    }

    fn position_steps(&self) -> i64 {
        (self.position_um.get() * self.steps_per_um).round() as i64
    }

    fn set_origin(&self) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.name);
        self.set_origin.set_guarded(&mut guard)
    }

    fn limits_um(&self) -> (f64, f64) {
        (-Z_LIMIT_UM, Z_LIMIT_UM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordingPipeline;
    use seqtest_core::logger::SettingValue;

    fn stage(kind: DeviceKind) -> (TesterZStage, Arc<SettingLogger>) {
        let logger = SettingLogger::shared();
        let context = DeviceContext::new(logger.clone(), Arc::new(RecordingPipeline::new()))
            .with_steps_per_um(4.0);
        (TesterZStage::new("TZStage-0", kind, &context), logger)
    }

    #[test]
    fn test_move_and_steps() {
        let (stage, logger) = stage(DeviceKind::ZStage);
        stage.set_position_um(12.5).unwrap();
        assert_eq!(stage.position_um(), 12.5);
        assert_eq!(stage.position_steps(), 50);

        stage.set_position_steps(-6).unwrap();
        assert_eq!(stage.position_um(), -1.5);

        let last = logger.entries().pop().unwrap();
        assert_eq!(last.setting, "ZPositionUm");
        assert_eq!(last.old, SettingValue::Float(12.5));
        assert_eq!(last.new, SettingValue::Float(-1.5));
        assert!(stage.busy());
    }

    #[test]
    fn test_af_stage_kind_and_metadata() {
        let (stage, _) = stage(DeviceKind::AutofocusStage);
        assert_eq!(stage.kind(), DeviceKind::AutofocusStage);
        assert!(stage.is_position_sequenceable());
        assert_eq!(stage.limits_um(), (-10_000.0, 10_000.0));
        assert_eq!(stage.property_names(), vec!["SetOrigin", "ZPositionUm"]);
    }
}
