//! Device Capabilities
//!
//! Fine-grained capability traits implemented by the simulated devices.
//! Instead of one deep device hierarchy, each device implements [`Device`]
//! (identity and lifecycle), [`Settable`] (named properties), and the
//! capabilities it actually has:
//!
//! - A camera implements [`Sequenceable`]
//! - A shutter implements [`ShutterControl`]
//! - An XY stage implements [`XYPositionable`]
//! - Z and autofocus stages implement [`ZPositionable`]
//! - An autofocus device implements [`FocusCapable`]
//!
//! A test driver dispatches on capability (see [`crate::driver::Capability`])
//! and never needs to know the concrete device.
//!
//! # Design
//!
//! Each capability trait:
//! - Is synchronous; the only blocking call is `stop_sequence_acquisition`
//! - Is thread-safe (requires Send + Sync)
//! - Returns [`DeviceResult`] for anything that can fail
//!
//! Every mutating method takes the shared setting guard for its whole
//! duration, so a method that changes several settings records them under a
//! single epoch.

use crate::driver::{Capability, DeviceKind};
use crate::encoding::ImageGeometry;
use crate::error::DeviceResult;
use crate::logger::SettingValue;
use crate::property::PropertyTable;
use bytes::Bytes;

/// Capability: Named Properties
///
/// Get and set any setting a device exposes, by property name.
pub trait Settable: Send + Sync {
    fn properties(&self) -> &PropertyTable;

    fn property_names(&self) -> Vec<String> {
        self.properties().names().map(str::to_string).collect()
    }

    fn get_property(&self, name: &str) -> DeviceResult<SettingValue> {
        self.properties().get(name)
    }

    /// Set a property; records one log entry and marks the device busy.
    fn set_property(&self, name: &str, value: SettingValue) -> DeviceResult<()> {
        self.properties().set(name, value)
    }
}

/// Identity and lifecycle shared by every simulated device.
pub trait Device: Settable {
    fn name(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    fn capabilities(&self) -> &'static [Capability] {
        self.kind().capabilities()
    }

    /// Safe to call more than once.
    fn initialize(&self) -> DeviceResult<()>;

    fn shutdown(&self) -> DeviceResult<()>;

    /// `true` once after each guarded mutation of this device.
    fn busy(&self) -> bool;
}

/// Region of interest in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Capability: Image Acquisition
///
/// Single snaps and background sequence acquisitions.
///
/// # Contract
/// - `start_*` returns immediately; frames are published from a capture thread
/// - Starting while a sequence is active fails with `AlreadyRunning`
/// - `stop_sequence_acquisition` blocks until the capture thread exits and
///   returns the error it ended with, if any; on an idle camera it succeeds
///   without side effects
pub trait Sequenceable: Send + Sync {
    fn image_geometry(&self) -> ImageGeometry;

    fn image_buffer_size(&self) -> usize {
        self.image_geometry().buffer_len()
    }

    /// Capture one image into the snap buffer.
    fn snap_image(&self) -> DeviceResult<()>;

    /// Most recent snap, if any.
    fn image_buffer(&self) -> Option<Bytes>;

    /// Exposure in milliseconds.
    fn exposure(&self) -> f64;

    fn set_exposure(&self, exposure_ms: f64) -> DeviceResult<()>;

    fn binning(&self) -> i64;

    fn set_binning(&self, binning: i64) -> DeviceResult<()>;

    fn roi(&self) -> Roi;

    fn set_roi(&self, roi: Roi) -> DeviceResult<()>;

    /// Acquire `count` frames, at least `interval_ms` apart.
    fn start_sequence_acquisition(
        &self,
        count: i64,
        interval_ms: f64,
        stop_on_overflow: bool,
    ) -> DeviceResult<()>;

    /// Acquire frames until stopped.
    fn start_continuous_sequence_acquisition(&self, interval_ms: f64) -> DeviceResult<()>;

    fn stop_sequence_acquisition(&self) -> DeviceResult<()>;

    fn is_capturing(&self) -> bool;
}

/// Capability: Shutter
pub trait ShutterControl: Send + Sync {
    fn set_open(&self, open: bool) -> DeviceResult<()>;

    fn is_open(&self) -> bool;
}

/// Travel limits of an XY stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XYLimits<T> {
    pub x_min: T,
    pub x_max: T,
    pub y_min: T,
    pub y_max: T,
}

/// Capability: XY Motion
///
/// Positions are in integer steps; micrometre variants convert through the
/// stage's steps-per-µm.
pub trait XYPositionable: Send + Sync {
    /// Set X and Y together under one guard.
    fn set_position_steps(&self, x: i64, y: i64) -> DeviceResult<()>;

    fn position_steps(&self) -> (i64, i64);

    fn set_position_um(&self, x: f64, y: f64) -> DeviceResult<()>;

    fn position_um(&self) -> (f64, f64);

    fn home(&self) -> DeviceResult<()>;

    fn stop(&self) -> DeviceResult<()>;

    fn set_origin(&self) -> DeviceResult<()>;

    fn step_limits(&self) -> XYLimits<i64>;

    fn limits_um(&self) -> XYLimits<f64>;
}

/// Capability: Single-Axis (Focus) Motion
pub trait ZPositionable: Send + Sync {
    fn set_position_um(&self, z: f64) -> DeviceResult<()>;

    fn position_um(&self) -> f64;

    fn set_position_steps(&self, steps: i64) -> DeviceResult<()>;

    fn position_steps(&self) -> i64;

    fn set_origin(&self) -> DeviceResult<()>;

    /// `(min, max)` travel in micrometres.
    fn limits_um(&self) -> (f64, f64);
}

/// Capability: Autofocus
///
/// # Contract
/// - `last_focus_score` always succeeds with a constant; callers in the
///   acquisition engine treat any error from it as fatal
/// - `current_focus_score` always fails with `Unsupported`
pub trait FocusCapable: Send + Sync {
    fn set_continuous_focusing(&self, enabled: bool) -> DeviceResult<()>;

    fn continuous_focusing(&self) -> bool;

    fn is_continuous_focus_locked(&self) -> bool;

    fn full_focus(&self) -> DeviceResult<()>;

    fn incremental_focus(&self) -> DeviceResult<()>;

    fn offset(&self) -> f64;

    fn set_offset(&self, offset: f64) -> DeviceResult<()>;

    fn last_focus_score(&self) -> DeviceResult<f64>;

    fn current_focus_score(&self) -> DeviceResult<f64>;
}
