//! Device kinds and capability flags.
//!
//! [`Capability`] mirrors the capability traits in
//! [`crate::capabilities`] as plain values, so a dispatcher can list and
//! filter devices without probing each trait. [`DeviceKind`] names the
//! concrete simulated device families and their factory name prefixes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime capability flags for device introspection.
///
/// # Example
///
/// ```rust,ignore
/// if device.capabilities().contains(&Capability::Sequenceable) {
///     device.as_sequenceable().unwrap().start_sequence_acquisition(10, 0.0, true)?;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Has named properties.
    /// Corresponds to [`crate::capabilities::Settable`]
    Settable,

    /// Snaps images and runs sequence acquisitions (cameras)
    /// Corresponds to [`crate::capabilities::Sequenceable`]
    Sequenceable,

    /// Opens and closes (shutters)
    /// Corresponds to [`crate::capabilities::ShutterControl`]
    ShutterControl,

    /// Moves in X and Y in steps
    /// Corresponds to [`crate::capabilities::XYPositionable`]
    XYPositionable,

    /// Moves along a single focus axis
    /// Corresponds to [`crate::capabilities::ZPositionable`]
    ZPositionable,

    /// Runs focus searches and continuous focus
    /// Corresponds to [`crate::capabilities::FocusCapable`]
    FocusCapable,

    /// Enumerates sub-devices
    Hub,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::Settable => "settable",
            Capability::Sequenceable => "sequenceable",
            Capability::ShutterControl => "shutter_control",
            Capability::XYPositionable => "xy_positionable",
            Capability::ZPositionable => "z_positionable",
            Capability::FocusCapable => "focus_capable",
            Capability::Hub => "hub",
        };
        write!(f, "{}", label)
    }
}

/// Concrete simulated device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Hub,
    Camera,
    Shutter,
    XYStage,
    ZStage,
    AutofocusStage,
    Autofocus,
}

impl DeviceKind {
    /// Name prefix the factory dispatches on.
    pub fn prefix(&self) -> &'static str {
        match self {
            DeviceKind::Hub => "THub",
            DeviceKind::Camera => "TCamera",
            DeviceKind::Shutter => "TShutter",
            DeviceKind::XYStage => "TXYStage",
            DeviceKind::ZStage => "TZStage",
            DeviceKind::AutofocusStage => "TAFStage",
            DeviceKind::Autofocus => "TAutofocus",
        }
    }

    /// Capabilities every device of this kind declares.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            DeviceKind::Hub => &[Capability::Settable, Capability::Hub],
            DeviceKind::Camera => &[Capability::Settable, Capability::Sequenceable],
            DeviceKind::Shutter => &[Capability::Settable, Capability::ShutterControl],
            DeviceKind::XYStage => &[Capability::Settable, Capability::XYPositionable],
            DeviceKind::ZStage | DeviceKind::AutofocusStage => {
                &[Capability::Settable, Capability::ZPositionable]
            }
            DeviceKind::Autofocus => &[Capability::Settable, Capability::FocusCapable],
        }
    }

    /// Kinds the hub installs, in roster order.
    pub fn peripherals() -> &'static [DeviceKind] {
        &[
            DeviceKind::Camera,
            DeviceKind::Shutter,
            DeviceKind::XYStage,
            DeviceKind::ZStage,
            DeviceKind::AutofocusStage,
            DeviceKind::Autofocus,
        ]
    }

    /// Kind whose prefix `name` starts with, if any. `THub` only matches
    /// exactly.
    pub fn from_name(name: &str) -> Option<DeviceKind> {
        if name == DeviceKind::Hub.prefix() {
            return Some(DeviceKind::Hub);
        }
        Self::peripherals()
            .iter()
            .copied()
            .find(|kind| name.starts_with(kind.prefix()))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceKind::Hub => "hub",
            DeviceKind::Camera => "camera",
            DeviceKind::Shutter => "shutter",
            DeviceKind::XYStage => "xy_stage",
            DeviceKind::ZStage => "z_stage",
            DeviceKind::AutofocusStage => "autofocus_stage",
            DeviceKind::Autofocus => "autofocus",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_prefix_dispatch() {
        assert_eq!(DeviceKind::from_name("THub"), Some(DeviceKind::Hub));
        assert_eq!(DeviceKind::from_name("THub-2"), None);
        assert_eq!(DeviceKind::from_name("TCamera-7"), Some(DeviceKind::Camera));
        assert_eq!(DeviceKind::from_name("TCameraExtra"), Some(DeviceKind::Camera));
        assert_eq!(DeviceKind::from_name("TAFStage-0"), Some(DeviceKind::AutofocusStage));
        assert_eq!(DeviceKind::from_name("TAutofocus-1"), Some(DeviceKind::Autofocus));
        assert_eq!(DeviceKind::from_name("Camera-0"), None);
    }

    #[test]
    fn test_every_kind_is_settable() {
        for kind in DeviceKind::peripherals().iter().chain([DeviceKind::Hub].iter()) {
            assert!(kind.capabilities().contains(&Capability::Settable));
        }
    }

    #[test]
    fn test_capability_serde_names() {
        let json = serde_json::to_string(&Capability::FocusCapable).unwrap();
        assert_eq!(json, "\"focus_capable\"");
    }
}
