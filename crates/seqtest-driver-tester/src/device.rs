//! Closed set of concrete tester devices.
//!
//! A test driver holds [`TesterDevice`] values and dispatches on capability:
//! every device is [`Settable`], and the `as_*` accessors return the
//! capability interface when the device has it.

use crate::autofocus::TesterAutofocus;
use crate::camera::TesterCamera;
use crate::common::DeviceContext;
use crate::hub::TesterHub;
use crate::shutter::TesterShutter;
use crate::xy_stage::TesterXYStage;
use crate::z_stage::TesterZStage;
use seqtest_core::capabilities::{
    Device, FocusCapable, Sequenceable, Settable, ShutterControl, XYPositionable, ZPositionable,
};
use seqtest_core::driver::{Capability, DeviceKind};
use std::fmt;
use std::sync::Arc;

/// Shared handle to one tester device.
#[derive(Clone)]
pub enum TesterDevice {
    Hub(Arc<TesterHub>),
    Camera(Arc<TesterCamera>),
    Shutter(Arc<TesterShutter>),
    XYStage(Arc<TesterXYStage>),
    ZStage(Arc<TesterZStage>),
    AutofocusStage(Arc<TesterZStage>),
    Autofocus(Arc<TesterAutofocus>),
}

impl TesterDevice {
    /// Build a device of `kind` named `name` with default configuration.
    pub fn build(kind: DeviceKind, name: &str, context: &DeviceContext) -> Self {
        match kind {
            DeviceKind::Hub => TesterDevice::Hub(Arc::new(TesterHub::new(name, context))),
            DeviceKind::Camera => TesterDevice::Camera(Arc::new(TesterCamera::new(name, context))),
            DeviceKind::Shutter => TesterDevice::Shutter(Arc::new(TesterShutter::new(name, context))),
            DeviceKind::XYStage => TesterDevice::XYStage(Arc::new(TesterXYStage::new(name, context))),
            DeviceKind::ZStage => {
                TesterDevice::ZStage(Arc::new(TesterZStage::new(name, DeviceKind::ZStage, context)))
            }
            DeviceKind::AutofocusStage => TesterDevice::AutofocusStage(Arc::new(TesterZStage::new(
                name,
                DeviceKind::AutofocusStage,
                context,
            ))),
            DeviceKind::Autofocus => {
                TesterDevice::Autofocus(Arc::new(TesterAutofocus::new(name, context)))
            }
        }
    }

    pub fn as_device(&self) -> &dyn Device {
        match self {
            TesterDevice::Hub(d) => d.as_ref(),
            TesterDevice::Camera(d) => d.as_ref(),
            TesterDevice::Shutter(d) => d.as_ref(),
            TesterDevice::XYStage(d) => d.as_ref(),
            TesterDevice::ZStage(d) | TesterDevice::AutofocusStage(d) => d.as_ref(),
            TesterDevice::Autofocus(d) => d.as_ref(),
        }
    }

    pub fn as_settable(&self) -> &dyn Settable {
        match self {
            TesterDevice::Hub(d) => d.as_ref(),
            TesterDevice::Camera(d) => d.as_ref(),
            TesterDevice::Shutter(d) => d.as_ref(),
            TesterDevice::XYStage(d) => d.as_ref(),
            TesterDevice::ZStage(d) | TesterDevice::AutofocusStage(d) => d.as_ref(),
            TesterDevice::Autofocus(d) => d.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.as_device().name()
    }

    pub fn kind(&self) -> DeviceKind {
        self.as_device().kind()
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_sequenceable(&self) -> Option<&dyn Sequenceable> {
        match self {
            TesterDevice::Camera(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_shutter(&self) -> Option<&dyn ShutterControl> {
        match self {
            TesterDevice::Shutter(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_xy_stage(&self) -> Option<&dyn XYPositionable> {
        match self {
            TesterDevice::XYStage(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_z_stage(&self) -> Option<&dyn ZPositionable> {
        match self {
            TesterDevice::ZStage(d) | TesterDevice::AutofocusStage(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_focus_capable(&self) -> Option<&dyn FocusCapable> {
        match self {
            TesterDevice::Autofocus(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    pub fn as_hub(&self) -> Option<&TesterHub> {
        match self {
            TesterDevice::Hub(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    /// Concrete camera, for camera-only inspection (counters, sequence state).
    pub fn as_camera(&self) -> Option<&Arc<TesterCamera>> {
        match self {
            TesterDevice::Camera(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Debug for TesterDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TesterDevice")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordingPipeline;
    use seqtest_core::logger::SettingLogger;

    fn context() -> DeviceContext {
        DeviceContext::new(SettingLogger::shared(), Arc::new(RecordingPipeline::new()))
    }

    #[test]
    fn test_accessors_match_declared_capabilities() {
        let context = context();
        for kind in DeviceKind::peripherals().iter().copied().chain([DeviceKind::Hub]) {
            let device = TesterDevice::build(kind, kind.prefix(), &context);
            assert_eq!(device.kind(), kind);
            assert!(device.has_capability(Capability::Settable));
            assert_eq!(
                device.as_sequenceable().is_some(),
                device.has_capability(Capability::Sequenceable)
            );
            assert_eq!(
                device.as_shutter().is_some(),
                device.has_capability(Capability::ShutterControl)
            );
            assert_eq!(
                device.as_xy_stage().is_some(),
                device.has_capability(Capability::XYPositionable)
            );
            assert_eq!(
                device.as_z_stage().is_some(),
                device.has_capability(Capability::ZPositionable)
            );
            assert_eq!(
                device.as_focus_capable().is_some(),
                device.has_capability(Capability::FocusCapable)
            );
            assert_eq!(device.as_hub().is_some(), device.has_capability(Capability::Hub));
        }
    }

    #[test]
    fn test_debug_shows_identity() {
        let device = TesterDevice::build(DeviceKind::Shutter, "TShutter-1", &context());
        assert_eq!(
            format!("{:?}", device),
            "TesterDevice { name: \"TShutter-1\", kind: Shutter }"
        );
    }
}
