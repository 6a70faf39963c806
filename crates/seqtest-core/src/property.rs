//! Name-addressed access to a device's settings.
//!
//! A [`PropertyTable`] maps property names to the settings a device owns, so
//! a test driver can get and set any of them by name without knowing the
//! concrete device. Property names usually equal setting names; a device may
//! expose a setting under a different property name (the shutter exposes
//! `ShutterState` as `State`).

use crate::error::{DeviceError, DeviceResult};
use crate::logger::{SettingLogger, SettingValue};
use crate::setting::{BoolSetting, FloatSetting, IntegerSetting, OneShotSetting};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to one setting of any type.
#[derive(Debug, Clone)]
pub enum SettingHandle {
    Integer(Arc<IntegerSetting>),
    Float(Arc<FloatSetting>),
    Bool(Arc<BoolSetting>),
    OneShot(Arc<OneShotSetting>),
}

impl SettingHandle {
    /// Current value; one-shot settings report the sentinel.
    pub fn value(&self) -> SettingValue {
        match self {
            SettingHandle::Integer(s) => SettingValue::Integer(s.get()),
            SettingHandle::Float(s) => SettingValue::Float(s.get()),
            SettingHandle::Bool(s) => SettingValue::Bool(s.get()),
            SettingHandle::OneShot(_) => SettingValue::OneShot,
        }
    }
}

impl From<Arc<IntegerSetting>> for SettingHandle {
    fn from(s: Arc<IntegerSetting>) -> Self {
        SettingHandle::Integer(s)
    }
}

impl From<Arc<FloatSetting>> for SettingHandle {
    fn from(s: Arc<FloatSetting>) -> Self {
        SettingHandle::Float(s)
    }
}

impl From<Arc<BoolSetting>> for SettingHandle {
    fn from(s: Arc<BoolSetting>) -> Self {
        SettingHandle::Bool(s)
    }
}

impl From<Arc<OneShotSetting>> for SettingHandle {
    fn from(s: Arc<OneShotSetting>) -> Self {
        SettingHandle::OneShot(s)
    }
}

/// Properties of one device, in deterministic (sorted) order.
#[derive(Debug)]
pub struct PropertyTable {
    owner: String,
    logger: Arc<SettingLogger>,
    properties: BTreeMap<String, SettingHandle>,
}

impl PropertyTable {
    pub fn new(owner: impl Into<String>, logger: Arc<SettingLogger>) -> Self {
        Self {
            owner: owner.into(),
            logger,
            properties: BTreeMap::new(),
        }
    }

    /// Expose `setting` under `property`.
    pub fn with(mut self, property: impl Into<String>, setting: impl Into<SettingHandle>) -> Self {
        self.properties.insert(property.into(), setting.into());
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    fn lookup(&self, property: &str) -> DeviceResult<&SettingHandle> {
        self.properties
            .get(property)
            .ok_or_else(|| DeviceError::UnknownProperty {
                device: self.owner.clone(),
                property: property.to_string(),
            })
    }

    pub fn get(&self, property: &str) -> DeviceResult<SettingValue> {
        Ok(self.lookup(property)?.value())
    }

    /// Set a property under one guard, marking the device busy.
    pub fn set(&self, property: &str, value: SettingValue) -> DeviceResult<()> {
        let handle = self.lookup(property)?;
        let mut guard = self.logger.guard();
        guard.mark_busy(&self.owner);
        match handle {
            SettingHandle::Integer(s) => s.set_value_guarded(&mut guard, value),
            SettingHandle::Float(s) => s.set_value_guarded(&mut guard, value),
            SettingHandle::Bool(s) => s.set_value_guarded(&mut guard, value),
            SettingHandle::OneShot(s) => match value {
                SettingValue::OneShot => s.set_guarded(&mut guard),
                _ => Err(DeviceError::TypeMismatch {
                    setting: s.name().to_string(),
                    expected: "one-shot",
                }),
            },
        }
    }
}
