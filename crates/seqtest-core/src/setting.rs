//! Setting<T> - bounded, audited device state
//!
//! A setting is one named piece of device state. Its value only changes while
//! a [`SettingGuard`] is held, and every successful change appends exactly one
//! [`LogEntry`](crate::logger::LogEntry) to the shared [`SettingLogger`].
//!
//! # Variants
//!
//! - [`IntegerSetting`], [`FloatSetting`], [`BoolSetting`]: persisted values,
//!   optionally bounded by an inclusive `[min, max]`.
//! - [`OneShotSetting`]: a triggerable action; each trigger records an entry
//!   carrying [`SettingValue::OneShot`] and nothing is stored.
//!
//! # Data Flow
//!
//! ```text
//! set(v)
//!   │
//!   ├─ read-only?        ── yes ─▶ Err(ReadOnly)      (no entry)
//!   ├─ outside [min,max]? ── yes ─▶ Err(OutOfRange)    (no entry)
//!   ▼
//! swap value, guard.record(owner, name, old, new)
//! ```
//!
//! # Example
//!
//! ```rust
//! use seqtest_core::logger::SettingLogger;
//! use seqtest_core::setting::FloatSetting;
//!
//! let logger = SettingLogger::shared();
//! let exposure = FloatSetting::new(logger.clone(), "TCamera-0", "Exposure", 100.0)
//!     .with_range(0.1, 1000.0);
//!
//! exposure.set(25.0).unwrap();
//! assert!(exposure.set(5000.0).is_err());
//! assert_eq!(exposure.get(), 25.0);
//! assert_eq!(logger.len(), 1);
//! ```

use crate::error::{DeviceError, DeviceResult};
use crate::logger::{SettingGuard, SettingLogger, SettingValue};
use parking_lot::Mutex;
use std::fmt::{Debug, Display};
use std::sync::Arc;

/// Value types a [`Setting`] can hold.
pub trait SettingType: Copy + PartialOrd + Debug + Display + Send + Sync + 'static {
    /// Human-readable type name used in mismatch errors.
    const TYPE_NAME: &'static str;

    fn into_value(self) -> SettingValue;

    /// Convert a property value, accepting the coercions the property
    /// interface allows (integers for floats, 0/1 for bools).
    fn from_value(value: SettingValue) -> Option<Self>;
}

impl SettingType for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn into_value(self) -> SettingValue {
        SettingValue::Integer(self)
    }

    fn from_value(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Integer(v) => Some(v),
            _ => None,
        }
    }
}

impl SettingType for f64 {
    const TYPE_NAME: &'static str = "float";

    fn into_value(self) -> SettingValue {
        SettingValue::Float(self)
    }

    fn from_value(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(v) => Some(v),
            SettingValue::Integer(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl SettingType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn into_value(self) -> SettingValue {
        SettingValue::Bool(self)
    }

    fn from_value(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(v) => Some(v),
            SettingValue::Integer(0) => Some(false),
            SettingValue::Integer(1) => Some(true),
            _ => None,
        }
    }
}

/// Typed mutable setting owned by one device.
pub struct Setting<T: SettingType> {
    logger: Arc<SettingLogger>,
    owner: String,
    name: String,
    value: Mutex<T>,
    bounds: Option<(T, T)>,
    mutable: bool,
    sequenceable: bool,
}

pub type IntegerSetting = Setting<i64>;
pub type FloatSetting = Setting<f64>;
pub type BoolSetting = Setting<bool>;

impl<T: SettingType> Setting<T> {
    /// Create a mutable, unbounded setting.
    pub fn new(
        logger: Arc<SettingLogger>,
        owner: impl Into<String>,
        name: impl Into<String>,
        initial: T,
    ) -> Self {
        Self {
            logger,
            owner: owner.into(),
            name: name.into(),
            value: Mutex::new(initial),
            bounds: None,
            mutable: true,
            sequenceable: false,
        }
    }

    /// Restrict values to the inclusive range `[min, max]`.
    pub fn with_range(mut self, min: T, max: T) -> Self {
        self.bounds = Some((min, max));
        self
    }

    /// Reject every `set` with `ReadOnly`.
    pub fn read_only(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Mark the setting as hardware-sequenceable.
    pub fn sequenceable(mut self) -> Self {
        self.sequenceable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn bounds(&self) -> Option<(T, T)> {
        self.bounds
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn is_sequenceable(&self) -> bool {
        self.sequenceable
    }

    pub fn get(&self) -> T {
        *self.value.lock()
    }

    /// Set under a freshly acquired guard.
    pub fn set(&self, value: T) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        self.set_guarded(&mut guard, value)
    }

    /// Set under a guard the caller already holds.
    ///
    /// Used by device operations that change several settings atomically.
    pub fn set_guarded(&self, guard: &mut SettingGuard<'_>, value: T) -> DeviceResult<()> {
        debug_assert!(guard.belongs_to(&self.logger), "guard from a different logger");

        if !self.mutable {
            return Err(DeviceError::ReadOnly(self.name.clone()));
        }
        if let Some((min, max)) = self.bounds {
            // Written so that NaN is rejected as well.
            if !(value >= min && value <= max) {
                return Err(DeviceError::out_of_range(&self.name, value, min, max));
            }
        }

        let old = std::mem::replace(&mut *self.value.lock(), value);
        guard.record(&self.owner, &self.name, old.into_value(), value.into_value());
        Ok(())
    }

    /// Set from an untyped property value.
    pub fn set_value_guarded(&self, guard: &mut SettingGuard<'_>, value: SettingValue) -> DeviceResult<()> {
        let typed = T::from_value(value).ok_or_else(|| DeviceError::TypeMismatch {
            setting: self.name.clone(),
            expected: T::TYPE_NAME,
        })?;
        self.set_guarded(guard, typed)
    }
}

impl<T: SettingType> Debug for Setting<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("value", &self.get())
            .field("bounds", &self.bounds)
            .field("mutable", &self.mutable)
            .finish()
    }
}

/// Triggerable action with no persisted value.
#[derive(Debug)]
pub struct OneShotSetting {
    logger: Arc<SettingLogger>,
    owner: String,
    name: String,
}

impl OneShotSetting {
    pub fn new(logger: Arc<SettingLogger>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            logger,
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger under a freshly acquired guard.
    pub fn set(&self) -> DeviceResult<()> {
        let mut guard = self.logger.guard();
        self.set_guarded(&mut guard)
    }

    pub fn set_guarded(&self, guard: &mut SettingGuard<'_>) -> DeviceResult<()> {
        debug_assert!(guard.belongs_to(&self.logger), "guard from a different logger");
        guard.record(&self.owner, &self.name, SettingValue::OneShot, SettingValue::OneShot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_within_bounds_records_one_entry() {
        let logger = SettingLogger::shared();
        let exposure = FloatSetting::new(logger.clone(), "TCamera-0", "Exposure", 100.0).with_range(0.1, 1000.0);

        exposure.set(0.1).unwrap();
        exposure.set(1000.0).unwrap();

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].old, SettingValue::Float(100.0));
        assert_eq!(entries[0].new, SettingValue::Float(0.1));
        assert!(entries[1].epoch > entries[0].epoch);
        assert_eq!(exposure.get(), 1000.0);
    }

    #[test]
    fn test_out_of_range_leaves_value_and_log_untouched() {
        let logger = SettingLogger::shared();
        let binning = IntegerSetting::new(logger.clone(), "TCamera-0", "Binning", 1).with_range(1, 1);

        let err = binning.set(2).unwrap_err();
        assert!(matches!(err, DeviceError::OutOfRange { .. }));
        assert_eq!(binning.get(), 1);
        assert!(logger.is_empty());

        assert!(binning.set(0).is_err());
        binning.set(1).unwrap();
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn test_nan_is_out_of_range() {
        let logger = SettingLogger::shared();
        let exposure = FloatSetting::new(logger.clone(), "TCamera-0", "Exposure", 100.0).with_range(0.1, 1000.0);
        assert!(exposure.set(f64::NAN).is_err());
        assert_eq!(exposure.get(), 100.0);
    }

    #[test]
    fn test_read_only_rejects_set() {
        let logger = SettingLogger::shared();
        let depth = IntegerSetting::new(logger.clone(), "TCamera-0", "BitDepth", 8).read_only();

        assert_eq!(depth.set(16), Err(DeviceError::ReadOnly("BitDepth".into())));
        assert_eq!(depth.get(), 8);
        assert!(logger.is_empty());
    }

    #[test]
    fn test_one_shot_records_sentinel() {
        let logger = SettingLogger::shared();
        let home = OneShotSetting::new(logger.clone(), "TXYStage-0", "Home");

        home.set().unwrap();
        home.set().unwrap();

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.new == SettingValue::OneShot && e.setting == "Home"));
    }

    #[test]
    fn test_set_value_coercions() {
        let logger = SettingLogger::shared();
        let open = BoolSetting::new(logger.clone(), "TShutter-0", "ShutterState", false);
        let offset = FloatSetting::new(logger.clone(), "TAutofocus-0", "Offset", 0.0);

        let mut guard = logger.guard();
        open.set_value_guarded(&mut guard, SettingValue::Integer(1)).unwrap();
        offset.set_value_guarded(&mut guard, SettingValue::Integer(3)).unwrap();
        let err = open
            .set_value_guarded(&mut guard, SettingValue::Float(0.5))
            .unwrap_err();
        drop(guard);

        assert!(open.get());
        assert_eq!(offset.get(), 3.0);
        assert!(matches!(err, DeviceError::TypeMismatch { expected: "bool", .. }));
    }

    #[test]
    fn test_builder_flags() {
        let logger = SettingLogger::shared();
        let z = FloatSetting::new(logger, "TZStage-0", "ZPositionUm", 0.0).sequenceable();
        assert!(z.is_sequenceable());
        assert!(z.is_mutable());
        assert_eq!(z.bounds(), None);
        assert_eq!(z.owner(), "TZStage-0");
    }
}
